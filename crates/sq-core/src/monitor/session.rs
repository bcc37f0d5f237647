//! Per-page monitor session.
//!
//! A session lives as long as one page load. It decides when to look at the
//! page ([`PageSession::on_trigger`]), classifies what it sees
//! ([`PageSession::detect`]) and reports new content to the quota store at
//! most once per identifier.
//!
//! Passes never overlap: a pass that finds another one in flight is skipped.
//! After the store reports the limit reached (or a limit check triggers the
//! block page) every pass is skipped until the page navigates. A detached
//! extension context stops the session for good.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::dedup::SeenSet;
use crate::detect::{DetectionStrategy, MutationPolicy, StrategyRegistry};
use crate::error::MessagingError;
use crate::quota::{is_reached, Ack, IncrementReply, Request, Response};
use crate::types::{PageSnapshot, FALLBACK_LIMIT};
use crate::url::{extract_host, logical_page, normalize_host};

use super::client::QuotaClient;
use super::trigger::{MediaEvent, NodeKinds, Trigger};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("No detection strategy for host '{0}'")]
    UntrackedHost(String),
}

/// Why a pass did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass is in flight.
    Busy,
    /// Waiting for the block page to replace this tab.
    RedirectPending,
    /// The session was stopped.
    Halted,
}

/// Result of one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    Skipped(SkipReason),
    /// Content already reported on this page.
    Duplicate(String),
    /// The store counted new content.
    Counted { id: String, reply: IncrementReply },
    /// Nothing countable on screen; the limit was checked instead.
    LimitChecked { redirecting: bool },
    /// The request failed or timed out. The pass may be retried.
    NoAnswer(MessagingError),
    /// The extension context went away during this pass.
    Halted,
}

impl PassOutcome {
    /// Whether the host should show the "one view left" notice.
    pub fn warning(&self) -> bool {
        matches!(self, Self::Counted { reply, .. } if reply.one_left())
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Skipped(reason) => format!("skipped ({reason:?})"),
            Self::Duplicate(id) => format!("duplicate {id}"),
            Self::Counted { id, reply } => {
                let mut line = format!("counted {id} ({}/{})", reply.today_counter, reply.limit);
                if reply.reached {
                    line.push_str(" limit reached");
                } else if reply.one_left() {
                    line.push_str(" one left");
                }
                line
            }
            Self::LimitChecked { redirecting: true } => "limit reached, redirecting".to_string(),
            Self::LimitChecked { redirecting: false } => "not countable".to_string(),
            Self::NoAnswer(err) => format!("no answer: {err}"),
            Self::Halted => "halted".to_string(),
        }
    }
}

/// Holds the in-flight flag for one pass.
struct PassGuard<'a>(&'a Cell<bool>);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct PageSession<'r, Q> {
    strategy: &'r dyn DetectionStrategy,
    client: Q,
    config: MonitorConfig,
    seen: RefCell<SeenSet>,
    checking: Cell<bool>,
    redirect_pending: Cell<bool>,
    last_url: RefCell<String>,
    last_scroll_ms: Cell<Option<u64>>,
    last_probe_ms: Cell<Option<u64>>,
    mutation_due_ms: Cell<Option<u64>>,
    cancel: CancellationToken,
}

impl<'r, Q: QuotaClient> PageSession<'r, Q> {
    /// Start monitoring the page at `url`. Fails when no strategy covers its host.
    pub fn new(
        registry: &'r StrategyRegistry,
        url: &str,
        client: Q,
        config: MonitorConfig,
    ) -> Result<Self, SessionError> {
        let host = normalize_host(extract_host(url).unwrap_or(""));
        let strategy = registry
            .for_host(&host)
            .ok_or_else(|| SessionError::UntrackedHost(host.clone()))?;

        log::debug!(
            "Monitoring {} with the {} strategy",
            host,
            strategy.profile().display_name
        );

        Ok(Self {
            strategy,
            client,
            seen: RefCell::new(SeenSet::new(config.dedup_capacity)),
            config,
            checking: Cell::new(false),
            redirect_pending: Cell::new(false),
            last_url: RefCell::new(url.to_string()),
            last_scroll_ms: Cell::new(None),
            last_probe_ms: Cell::new(None),
            mutation_due_ms: Cell::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn strategy(&self) -> &'r dyn DetectionStrategy {
        self.strategy
    }

    /// Domain reported in increments.
    pub fn domain(&self) -> &'static str {
        self.strategy.profile().domain
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn client(&self) -> &Q {
        &self.client
    }

    /// Token cancelled when the session stops; hosts tear down observers on it.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_halted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn redirect_pending(&self) -> bool {
        self.redirect_pending.get()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.borrow().len()
    }

    /// Stop the session. Idempotent.
    pub fn halt(&self) {
        if !self.cancel.is_cancelled() {
            log::warn!("Extension context invalidated, monitor stopped");
            self.cancel.cancel();
        }
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// React to a page event. Returns the delay after which a detection pass
    /// should run, or `None` when the event does not warrant one.
    pub fn on_trigger(&self, trigger: &Trigger, page: &PageSnapshot, now_ms: u64) -> Option<Duration> {
        if self.is_halted() {
            return None;
        }

        let timing = self.strategy.timing();

        if self.note_url(&page.url) {
            return Some(ms(timing.settle_delay_ms));
        }
        if self.redirect_pending.get() {
            return None;
        }

        match trigger {
            Trigger::PageLoad => Some(ms(timing.initial_delay_ms)),
            Trigger::Mutation { added, attributes } => {
                self.on_mutation(*added | *attributes, page, now_ms)
            }
            Trigger::NavigationTick => None,
            Trigger::Media { event } => match event {
                MediaEvent::Play | MediaEvent::Playing => Some(ms(self.config.playback_delay_ms)),
                MediaEvent::TimeUpdate(position) if *position >= self.config.min_playback_secs => {
                    Some(Duration::ZERO)
                }
                MediaEvent::TimeUpdate(_) => None,
            },
            Trigger::Click { matched: true } => Some(ms(timing.click_delay_ms)),
            Trigger::Click { matched: false } => None,
            Trigger::Scroll => {
                if !timing.scroll_advances {
                    return None;
                }
                if let Some(last) = self.last_scroll_ms.get() {
                    if now_ms.saturating_sub(last) < self.config.scroll_interval_ms {
                        return None;
                    }
                }
                self.last_scroll_ms.set(Some(now_ms));
                Some(ms(self.config.scroll_settle_ms))
            }
            Trigger::Resize => Some(ms(timing.resize_delay_ms)),
            Trigger::FallbackTick => Some(Duration::ZERO),
        }
    }

    fn on_mutation(&self, kinds: NodeKinds, page: &PageSnapshot, now_ms: u64) -> Option<Duration> {
        match self.strategy.mutation_policy() {
            MutationPolicy::UrlGated => {
                if !self.strategy.has_content_url(page) {
                    return None;
                }
            }
            MutationPolicy::MediaNodes => {
                if !kinds.intersects(NodeKinds::RELEVANT) {
                    return None;
                }
            }
        }

        // A pass is already queued for this burst of mutations.
        if matches!(self.mutation_due_ms.get(), Some(due) if due > now_ms) {
            return None;
        }
        let delay = match self.strategy.mutation_policy() {
            MutationPolicy::UrlGated => self.strategy.timing().settle_delay_ms,
            MutationPolicy::MediaNodes => self.config.mutation_debounce_ms,
        };
        self.mutation_due_ms.set(Some(now_ms + delay));
        Some(ms(delay))
    }

    /// Record the current URL. Returns true when it changed, in which case
    /// the redirect flag is lifted and, if the logical page changed, the
    /// dedup cache is emptied.
    fn note_url(&self, url: &str) -> bool {
        let mut last = self.last_url.borrow_mut();
        if last.as_str() == url {
            return false;
        }

        if logical_page(&last) != logical_page(url) {
            self.seen.borrow_mut().clear();
        }
        log::debug!("Navigation: {} -> {}", last, url);
        *last = url.to_string();
        self.redirect_pending.set(false);
        self.mutation_due_ms.set(None);
        true
    }

    /// Probe the extension context at most once per probe interval.
    fn context_alive(&self, now_ms: u64) -> bool {
        if let Some(last) = self.last_probe_ms.get() {
            if now_ms.saturating_sub(last) < self.config.context_probe_ms {
                return true;
            }
        }
        self.last_probe_ms.set(Some(now_ms));
        self.client.context_alive()
    }

    // =========================================================================
    // Detection pass
    // =========================================================================

    /// Run one detection pass over `page`.
    pub async fn detect(&self, page: &PageSnapshot, now_ms: u64) -> PassOutcome {
        if self.is_halted() {
            return PassOutcome::Skipped(SkipReason::Halted);
        }
        if !self.context_alive(now_ms) {
            self.halt();
            return PassOutcome::Halted;
        }

        self.note_url(&page.url);
        if self.redirect_pending.get() {
            return PassOutcome::Skipped(SkipReason::RedirectPending);
        }
        let Some(_guard) = PassGuard::acquire(&self.checking) else {
            return PassOutcome::Skipped(SkipReason::Busy);
        };

        let id = self.strategy.content_id(page, now_ms);
        if self.seen.borrow().contains(&id) {
            return PassOutcome::Duplicate(id);
        }

        if !self.strategy.is_countable(page) {
            return self.check_limit().await;
        }

        let request = Request::IncrementCounter {
            site: self.domain().to_string(),
        };
        match self.request(request).await {
            Ok(Response::Increment(reply)) => {
                if let Some(evicted) = self.seen.borrow_mut().insert(&id) {
                    log::trace!("Evicted {} from seen set", evicted);
                }
                log::info!(
                    "Counted {} ({}/{})",
                    id,
                    reply.today_counter,
                    reply.limit
                );
                if reply.reached {
                    self.redirect_pending.set(true);
                }
                PassOutcome::Counted { id, reply }
            }
            Ok(_) => PassOutcome::NoAnswer(MessagingError::UnexpectedResponse("incrementCounter")),
            Err(err) => self.fail(err),
        }
    }

    /// Nothing countable on screen: redirect anyway if the limit is already
    /// reached, so a page opened after exhaustion cannot be used.
    async fn check_limit(&self) -> PassOutcome {
        let status = match self.request(Request::GetStatus).await {
            Ok(Response::Status(status)) => status,
            Ok(_) => return PassOutcome::NoAnswer(MessagingError::UnexpectedResponse("getStatus")),
            Err(err) => return self.fail(err),
        };

        let site = self.domain();
        let count = status.counter.get(site).copied().unwrap_or(0);
        let limit = status.limits.get(site).copied().unwrap_or(FALLBACK_LIMIT);
        if !is_reached(count, limit) {
            return PassOutcome::LimitChecked { redirecting: false };
        }

        self.redirect_pending.set(true);
        let request = Request::OpenLimitPage {
            site: site.to_string(),
        };
        let err = match self.request(request).await {
            Ok(Response::Ack(Ack { success: true })) => {
                return PassOutcome::LimitChecked { redirecting: true };
            }
            Ok(Response::Error(reply)) => MessagingError::Remote(reply.error),
            Ok(_) => MessagingError::UnexpectedResponse("openLimitPage"),
            Err(err) => err,
        };
        // No block page is coming; let a later pass try again.
        self.redirect_pending.set(false);
        self.fail(err)
    }

    /// Send with the response timeout. Cancelling the session abandons the
    /// request.
    async fn request(&self, request: Request) -> Result<Response, MessagingError> {
        let action = request.action();
        let timeout = self.config.response_timeout();
        tokio::select! {
            _ = self.cancel.cancelled() => Err(MessagingError::ContextInvalidated),
            result = tokio::time::timeout(timeout, self.client.send(request)) => match result {
                Ok(reply) => reply,
                Err(_) => {
                    log::warn!("{} got no response within {:?}", action, timeout);
                    Err(MessagingError::Timeout(self.config.response_timeout_ms))
                }
            },
        }
    }

    fn fail(&self, err: MessagingError) -> PassOutcome {
        match err {
            MessagingError::ContextInvalidated => {
                self.halt();
                PassOutcome::Halted
            }
            err => {
                log::debug!("Pass failed: {}", err);
                PassOutcome::NoAnswer(err)
            }
        }
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
