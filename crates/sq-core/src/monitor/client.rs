//! The page side of the message channel.

use crate::error::MessagingError;
use crate::platform::{Clock, StateStorage, TabHost};
use crate::quota::{QuotaStore, Request, Response};
use crate::types::TabId;

/// Transport from a page to the quota store.
#[allow(async_fn_in_trait)]
pub trait QuotaClient {
    /// Send one request and await its reply.
    async fn send(&self, request: Request) -> Result<Response, MessagingError>;

    /// Cheap liveness probe of the extension runtime.
    fn context_alive(&self) -> bool {
        true
    }
}

/// Client wired straight to an in-process store, as if sent from `tab`.
pub struct LocalClient<'a, S, T, C> {
    store: &'a QuotaStore<S, T, C>,
    tab: TabId,
}

impl<'a, S, T, C> LocalClient<'a, S, T, C> {
    pub fn new(store: &'a QuotaStore<S, T, C>, tab: TabId) -> Self {
        Self { store, tab }
    }
}

impl<S: StateStorage, T: TabHost, C: Clock> QuotaClient for LocalClient<'_, S, T, C> {
    async fn send(&self, request: Request) -> Result<Response, MessagingError> {
        match self.store.handle_message(request, Some(self.tab)).await {
            Response::Error(reply) => Err(MessagingError::Remote(reply.error)),
            response => Ok(response),
        }
    }
}
