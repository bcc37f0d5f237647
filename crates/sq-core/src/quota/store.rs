//! The authoritative quota store.
//!
//! One instance per browser session, living in the background context. All
//! read-modify-write cycles are serialized through an async mutex so that
//! concurrent increments from several tabs are never lost, whatever the
//! storage backend guarantees.

use tokio::sync::Mutex;

use crate::blockpage::block_page_path;
use crate::error::{PlatformError, QuotaError};
use crate::platform::{Clock, StateStorage, TabHost};
use crate::types::TabId;

use super::message::{BulkLimitReply, IncrementReply, LimitReply, Request, Response, StatusReply};
use super::state::{Effect, QuotaState, Transition};

/// Response text when a request could not be served.
pub const INTERNAL_ERROR: &str = "internal error";

pub struct QuotaStore<S, T, C> {
    storage: S,
    tabs: T,
    clock: C,
    lock: Mutex<()>,
}

impl<S: StateStorage, T: TabHost, C: Clock> QuotaStore<S, T, C> {
    pub fn new(storage: S, tabs: T, clock: C) -> Self {
        Self {
            storage,
            tabs,
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn tabs(&self) -> &T {
        &self.tabs
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// First-run initialization: default limits, empty counters. A stored
    /// record (an update or reinstall event) is returned untouched.
    pub async fn install(&self) -> Result<QuotaState, QuotaError> {
        let _guard = self.lock.lock().await;
        if let Some(state) = self.storage.load().await? {
            log::info!("Existing state kept, last day {}", state.last_day);
            return Ok(state);
        }
        let state = QuotaState::seeded(self.clock.today());
        self.storage.save(&state).await?;
        log::info!("Installed with default limits {:?}", state.limits);
        Ok(state)
    }

    /// Serve a request, turning failures into an error reply. This is the
    /// message listener's entry point and never fails outward.
    pub async fn handle_message(&self, request: Request, sender: Option<TabId>) -> Response {
        let action = request.action();
        match self.handle(request, sender).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("{} failed: {}", action, e);
                Response::error(INTERNAL_ERROR)
            }
        }
    }

    /// Serve a request from `sender` (a page's tab, or `None` for UI pages).
    pub async fn handle(&self, request: Request, sender: Option<TabId>) -> Result<Response, QuotaError> {
        log::debug!("Request {} from tab {:?}", request.action(), sender);
        let transition = self.transact(&request).await?;

        match transition.effect {
            Some(Effect::SwapToBlockPage { site }) => {
                let swapped = match sender {
                    Some(tab) => self.swap_to_block_page(&site, tab).await,
                    None => {
                        log::debug!("No sender tab for {}, block page not opened", site);
                        Ok(())
                    }
                };
                match (&request, swapped) {
                    (_, Ok(())) => {}
                    // The count already happened; a failed swap must not undo it.
                    (Request::IncrementCounter { .. }, Err(e)) => {
                        log::warn!("Block page for {} not opened: {}", site, e)
                    }
                    (_, Err(e)) => return Err(e.into()),
                }
            }
            Some(Effect::OpenPopup) => self.tabs.open_popup().await?,
            None => {}
        }

        Ok(transition.response)
    }

    pub async fn increment_counter(&self, site: &str, sender: Option<TabId>) -> Result<IncrementReply, QuotaError> {
        let request = Request::IncrementCounter {
            site: site.to_string(),
        };
        match self.handle(request, sender).await? {
            Response::Increment(reply) => Ok(reply),
            other => unreachable_reply("incrementCounter", other),
        }
    }

    pub async fn get_status(&self) -> Result<StatusReply, QuotaError> {
        match self.handle(Request::GetStatus, None).await? {
            Response::Status(reply) => Ok(reply),
            other => unreachable_reply("getStatus", other),
        }
    }

    pub async fn set_limit(&self, site: &str, new_limit: u32) -> Result<LimitReply, QuotaError> {
        let request = Request::SetLimit {
            site: site.to_string(),
            new_limit,
        };
        match self.handle(request, None).await? {
            Response::LimitUpdated(reply) => Ok(reply),
            other => unreachable_reply("setLimit", other),
        }
    }

    pub async fn set_all_limits(&self, sites: &[String], new_limit: u32) -> Result<BulkLimitReply, QuotaError> {
        let request = Request::SetAllLimits {
            sites: sites.to_vec(),
            new_limit,
        };
        match self.handle(request, None).await? {
            Response::LimitsUpdated(reply) => Ok(reply),
            other => unreachable_reply("setAllLimits", other),
        }
    }

    pub async fn reset_counters(&self) -> Result<(), QuotaError> {
        self.handle(Request::ResetCounters, None).await.map(|_| ())
    }

    /// Load, apply, persist: one serialized read-modify-write.
    async fn transact(&self, request: &Request) -> Result<Transition, QuotaError> {
        let _guard = self.lock.lock().await;
        let today = self.clock.today();

        let mut state = match self.storage.load().await? {
            Some(state) => state,
            None => {
                log::warn!("No stored state, falling back to defaults");
                QuotaState::seeded(today)
            }
        };

        let transition = state.apply(request, today);
        if transition.changed {
            self.storage.save(&state).await?;
        }
        Ok(transition)
    }

    /// Open the block page, then close the offending tab. Creating first
    /// never leaves the window without tabs if creation fails.
    async fn swap_to_block_page(&self, site: &str, tab: TabId) -> Result<(), PlatformError> {
        let url = self.tabs.extension_url(&block_page_path(site));
        log::info!("Limit reached for {}, replacing tab {}", site, tab);
        self.tabs.create_tab(&url).await?;
        self.tabs.close_tab(tab).await
    }
}

fn unreachable_reply<R>(action: &'static str, other: Response) -> Result<R, QuotaError> {
    log::error!("{} produced unexpected reply {:?}", action, other);
    Err(QuotaError::UnexpectedReply(action))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::NaiveDate;

    use super::*;
    use crate::platform::{ManualClock, MemoryStorage};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TabOp {
        Create(String),
        Close(TabId),
        Popup,
    }

    #[derive(Default)]
    struct RecordingTabs {
        ops: RefCell<Vec<TabOp>>,
        fail_create: bool,
        gone: Option<TabId>,
    }

    impl TabHost for RecordingTabs {
        fn extension_url(&self, path: &str) -> String {
            format!("chrome-extension://test/{path}")
        }

        async fn create_tab(&self, url: &str) -> Result<TabId, PlatformError> {
            if self.fail_create {
                return Err(PlatformError::TabCreate {
                    url: url.to_string(),
                    reason: "no window".to_string(),
                });
            }
            self.ops.borrow_mut().push(TabOp::Create(url.to_string()));
            Ok(99)
        }

        async fn close_tab(&self, tab: TabId) -> Result<(), PlatformError> {
            if self.gone == Some(tab) {
                return Err(PlatformError::TabNotFound(tab));
            }
            self.ops.borrow_mut().push(TabOp::Close(tab));
            Ok(())
        }

        async fn open_popup(&self) -> Result<(), PlatformError> {
            self.ops.borrow_mut().push(TabOp::Popup);
            Ok(())
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn store() -> QuotaStore<MemoryStorage, RecordingTabs, ManualClock> {
        QuotaStore::new(
            MemoryStorage::new(),
            RecordingTabs::default(),
            ManualClock::new(day(1).and_hms_opt(12, 0, 0).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_fresh_install_status() {
        let store = store();
        store.install().await.unwrap();
        let status = store.get_status().await.unwrap();
        assert!(status.counter.is_empty());
        assert_eq!(status.limits.get("youtube.com"), Some(&10));
        assert_eq!(status.limits.get("instagram.com"), Some(&15));
        assert_eq!(status.limits.get("tiktok.com"), Some(&20));
    }

    #[tokio::test]
    async fn test_install_keeps_existing_state() {
        let store = store();
        store.install().await.unwrap();
        store.set_limit("youtube.com", 3).await.unwrap();
        store.increment_counter("youtube.com", None).await.unwrap();

        let state = store.install().await.unwrap();
        assert_eq!(state.limit_for("youtube.com"), 3);
        assert_eq!(state.count_for("youtube.com"), 1);
        let status = store.get_status().await.unwrap();
        assert_eq!(status.limits.get("youtube.com"), Some(&3));
        assert_eq!(status.counter.get("youtube.com"), Some(&1));
    }

    #[tokio::test]
    async fn test_ten_views_scenario() {
        let store = store();
        store.install().await.unwrap();
        for n in 1..=9 {
            let reply = store.increment_counter("youtube.com", Some(7)).await.unwrap();
            assert!(!reply.reached);
            assert_eq!(reply.today_counter, n);
        }
        assert!(store.tabs().ops.borrow().is_empty());

        let reply = store.increment_counter("youtube.com", Some(7)).await.unwrap();
        assert!(reply.reached);
        assert_eq!(reply.today_counter, 10);
        assert_eq!(
            *store.tabs().ops.borrow(),
            vec![
                TabOp::Create("chrome-extension://test/limit-reached.html?site=youtube.com".to_string()),
                TabOp::Close(7),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_create_keeps_original_tab() {
        let store = QuotaStore::new(
            MemoryStorage::new(),
            RecordingTabs {
                fail_create: true,
                ..RecordingTabs::default()
            },
            ManualClock::at_day(day(1)),
        );
        store.set_limit("tiktok.com", 1).await.unwrap();
        let reply = store.increment_counter("tiktok.com", Some(3)).await.unwrap();
        assert!(reply.reached);
        assert!(store.tabs().ops.borrow().is_empty());

        let response = store
            .handle_message(Request::OpenLimitPage { site: "tiktok.com".to_string() }, Some(3))
            .await;
        assert_eq!(response, Response::error(INTERNAL_ERROR));
    }

    #[tokio::test]
    async fn test_tab_closed_by_user_keeps_count() {
        let store = QuotaStore::new(
            MemoryStorage::new(),
            RecordingTabs {
                gone: Some(4),
                ..RecordingTabs::default()
            },
            ManualClock::at_day(day(1)),
        );
        store.set_limit("youtube.com", 1).await.unwrap();
        let reply = store.increment_counter("youtube.com", Some(4)).await.unwrap();
        assert!(reply.reached);
        assert_eq!(store.storage().snapshot().unwrap().count_for("youtube.com"), 1);
        assert_eq!(
            *store.tabs().ops.borrow(),
            vec![TabOp::Create("chrome-extension://test/limit-reached.html?site=youtube.com".to_string())]
        );
    }

    #[tokio::test]
    async fn test_reset_scenario() {
        let store = store();
        store.install().await.unwrap();
        store.increment_counter("tiktok.com", None).await.unwrap();
        store.reset_counters().await.unwrap();
        let status = store.get_status().await.unwrap();
        assert_eq!(status.counter.get("tiktok.com").copied().unwrap_or(0), 0);
        assert_eq!(status.limits.get("tiktok.com"), Some(&20));
    }

    #[tokio::test]
    async fn test_rollover_on_next_day_status() {
        let store = store();
        store.install().await.unwrap();
        store.increment_counter("youtube.com", None).await.unwrap();

        store.clock().advance_ms(24 * 3600 * 1000);
        let status = store.get_status().await.unwrap();
        assert!(status.counter.is_empty());
        let persisted = store.storage().snapshot().unwrap();
        assert_eq!(persisted.last_day, "2026-03-02");
        assert!(persisted.counter.is_empty());
    }

    #[tokio::test]
    async fn test_set_all_limits_then_status() {
        let store = store();
        store.install().await.unwrap();
        let sites = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        store.set_limit("a", 50).await.unwrap();
        let reply = store.set_all_limits(&sites, 5).await.unwrap();
        assert!(reply.success);
        let status = store.get_status().await.unwrap();
        for site in &sites {
            assert_eq!(status.limits.get(site.as_str()), Some(&5));
        }
    }

    #[tokio::test]
    async fn test_concurrent_increments_not_lost() {
        let store = store();
        store.install().await.unwrap();
        let (a, b, c, d) = tokio::join!(
            store.increment_counter("tiktok.com", None),
            store.increment_counter("tiktok.com", None),
            store.increment_counter("tiktok.com", None),
            store.increment_counter("tiktok.com", None),
        );
        let mut seen: Vec<u32> = [a, b, c, d].into_iter().map(|r| r.unwrap().today_counter).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(store.storage().snapshot().unwrap().count_for("tiktok.com"), 4);
    }

    #[tokio::test]
    async fn test_missing_state_uses_defaults() {
        let store = store();
        let reply = store.increment_counter("instagram.com", None).await.unwrap();
        assert_eq!(reply.limit, 15);
        assert_eq!(reply.today_counter, 1);
    }

    #[tokio::test]
    async fn test_storage_failure_becomes_error_reply() {
        let store = store();
        store.storage().fail_next();
        let response = store.handle_message(Request::GetStatus, None).await;
        assert_eq!(response, Response::error(INTERNAL_ERROR));
    }

    #[tokio::test]
    async fn test_open_popup() {
        let store = store();
        let response = store.handle_message(Request::OpenPopup, None).await;
        assert_eq!(response, Response::ack(true));
        assert_eq!(*store.tabs().ops.borrow(), vec![TabOp::Popup]);
    }
}
