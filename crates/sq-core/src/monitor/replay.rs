//! Deterministic replay of recorded page activity.
//!
//! A trace is the sequence of triggers a page produced, each stamped with
//! its offset in milliseconds and, when the page changed, a fresh snapshot.
//! Replaying drives a [`PageSession`] on a [`ManualClock`]: scheduled passes
//! sit in a due-time queue and fallback ticks are synthesized at the
//! strategy's interval, so the outcome does not depend on wall time.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::platform::{Clock, ManualClock};
use crate::types::{PageSnapshot, TabId};

use super::client::QuotaClient;
use super::session::{PageSession, PassOutcome, SessionError};
use super::trigger::Trigger;

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Invalid trace: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Trace has no events")]
    Empty,
    #[error("Event {index} at {at} ms is earlier than the one before it")]
    OutOfOrder { index: usize, at: u64 },
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    /// URL the page was loaded at.
    pub url: String,
    /// Tab the page lives in.
    #[serde(default = "default_tab")]
    pub tab: TabId,
    pub events: Vec<TraceEvent>,
}

fn default_tab() -> TabId {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    /// Offset from page load, in milliseconds.
    pub at: u64,
    /// Page state from this event on. An empty URL keeps the current one.
    #[serde(default)]
    pub page: Option<PageSnapshot>,
    pub trigger: Trigger,
}

impl Trace {
    pub fn from_json(text: &str) -> Result<Self, TraceError> {
        let trace: Self = serde_json::from_str(text)?;
        trace.validate()?;
        Ok(trace)
    }

    pub fn validate(&self) -> Result<(), TraceError> {
        if self.events.is_empty() {
            return Err(TraceError::Empty);
        }
        for (index, pair) in self.events.windows(2).enumerate() {
            if pair[1].at < pair[0].at {
                return Err(TraceError::OutOfOrder {
                    index: index + 1,
                    at: pair[1].at,
                });
            }
        }
        Ok(())
    }

    /// Offset of the last event.
    pub fn duration(&self) -> u64 {
        self.events.last().map_or(0, |e| e.at)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayStep {
    pub at: u64,
    pub outcome: PassOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub steps: Vec<ReplayStep>,
    pub halted: bool,
}

impl ReplayReport {
    pub fn counted(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, PassOutcome::Counted { .. }))
            .count()
    }

    pub fn warnings(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.warning()).count()
    }

    /// A limit was reached at some point.
    pub fn redirected(&self) -> bool {
        self.steps.iter().any(|s| match &s.outcome {
            PassOutcome::Counted { reply, .. } => reply.reached,
            PassOutcome::LimitChecked { redirecting } => *redirecting,
            _ => false,
        })
    }
}

/// Replay `trace` through `session`, advancing `clock` as it goes.
///
/// At equal times, due passes run before new events and events before
/// fallback ticks. Ticks stop one interval after the last event. Replay ends
/// early once the limit is reached, since the page is gone from then on.
pub async fn replay<Q: QuotaClient>(
    session: &PageSession<'_, Q>,
    trace: &Trace,
    clock: &ManualClock,
) -> ReplayReport {
    let mut report = ReplayReport::default();
    let mut page = PageSnapshot::at(trace.url.as_str());
    let mut due: BTreeSet<u64> = BTreeSet::new();
    let mut events = trace.events.iter().peekable();

    let tick_every = session.strategy().timing().fallback_tick_ms;
    let end = trace.duration() + tick_every;
    let mut next_tick = (tick_every > 0).then_some(tick_every);
    let mut elapsed = 0u64;

    loop {
        if session.is_halted() {
            report.halted = true;
            break;
        }

        let next_pass = due.first().copied();
        let next_event = events.peek().map(|e| e.at);
        let tick = next_tick.filter(|t| *t <= end);
        let Some(t) = [next_pass, next_event, tick].into_iter().flatten().min() else {
            break;
        };

        clock.advance_ms(t - elapsed);
        elapsed = t;
        let now_ms = clock.now_ms();

        if next_pass == Some(t) {
            due.remove(&t);
            let outcome = session.detect(&page, now_ms).await;
            log::debug!("{:>7} ms  {}", t, outcome.summary());
            report.steps.push(ReplayStep { at: t, outcome });
            if session.redirect_pending() {
                // The store has replaced the tab with the block page.
                break;
            }
            continue;
        }

        let trigger = match events.next_if(|e| e.at == t) {
            Some(event) => {
                if let Some(next) = &event.page {
                    let url = std::mem::take(&mut page.url);
                    page = next.clone();
                    if page.url.is_empty() {
                        page.url = url;
                    }
                }
                &event.trigger
            }
            None => {
                next_tick = Some(t + tick_every);
                &Trigger::FallbackTick
            }
        };

        if let Some(delay) = session.on_trigger(trigger, &page, now_ms) {
            let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            due.insert(t.saturating_add(millis));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::config::MonitorConfig;
    use crate::detect::StrategyRegistry;
    use crate::error::PlatformError;
    use crate::monitor::client::LocalClient;
    use crate::platform::{MemoryStorage, TabHost};
    use crate::quota::QuotaStore;

    #[derive(Default)]
    struct NullTabs;

    impl TabHost for NullTabs {
        fn extension_url(&self, path: &str) -> String {
            format!("chrome-extension://replay/{path}")
        }

        async fn create_tab(&self, _url: &str) -> Result<TabId, PlatformError> {
            Ok(99)
        }

        async fn close_tab(&self, _tab: TabId) -> Result<(), PlatformError> {
            Ok(())
        }

        async fn open_popup(&self) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    fn clock() -> ManualClock {
        ManualClock::new(
            NaiveDate::from_ymd_opt(2026, 5, 4)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        )
    }

    const SHORTS_TRACE: &str = r#"{
        "url": "https://www.youtube.com/shorts/aaa",
        "events": [
            { "at": 0, "trigger": { "type": "pageLoad" } },
            { "at": 2000, "trigger": { "type": "media", "event": "playing" } },
            { "at": 4000, "page": { "url": "https://www.youtube.com/shorts/bbb" },
              "trigger": { "type": "navigationTick" } },
            { "at": 4500, "trigger": { "type": "click", "matched": true } },
            { "at": 9000, "page": { "url": "https://www.youtube.com/shorts/aaa" },
              "trigger": { "type": "navigationTick" } }
        ]
    }"#;

    #[test]
    fn test_trace_validation() {
        assert!(matches!(
            Trace::from_json(r#"{"url":"https://www.tiktok.com/","events":[]}"#),
            Err(TraceError::Empty)
        ));
        let out_of_order = r#"{"url":"https://www.tiktok.com/","events":[
            {"at":10,"trigger":{"type":"scroll"}},
            {"at":5,"trigger":{"type":"scroll"}}
        ]}"#;
        assert!(matches!(
            Trace::from_json(out_of_order),
            Err(TraceError::OutOfOrder { index: 1, at: 5 })
        ));
        let trace = Trace::from_json(SHORTS_TRACE).unwrap();
        assert_eq!(trace.tab, 1);
        assert_eq!(trace.duration(), 9000);
    }

    #[tokio::test]
    async fn test_replay_counts_each_short_per_visit() {
        let clock = clock();
        let store = QuotaStore::new(MemoryStorage::new(), NullTabs, &clock);
        let registry = StrategyRegistry::with_defaults();
        let trace = Trace::from_json(SHORTS_TRACE).unwrap();
        let session = PageSession::new(
            &registry,
            &trace.url,
            LocalClient::new(&store, trace.tab),
            MonitorConfig::default(),
        )
        .unwrap();

        let report = replay(&session, &trace, &clock).await;

        // aaa, bbb, then aaa again after the seen set was cleared by navigation.
        assert_eq!(report.counted(), 3);
        assert!(!report.halted);
        assert!(!report.redirected());
        let state = store.storage().snapshot().unwrap();
        assert_eq!(state.count_for("youtube.com"), 3);
        assert_eq!(state.last_day, "2026-05-04");

        let first = report
            .steps
            .iter()
            .find(|s| matches!(s.outcome, PassOutcome::Counted { .. }))
            .unwrap();
        assert_eq!(first.at, 1500);
    }

    #[tokio::test]
    async fn test_replay_stops_at_limit() {
        let clock = clock();
        let store = QuotaStore::new(MemoryStorage::new(), NullTabs, &clock);
        store.install().await.unwrap();
        store
            .handle_message(
                crate::quota::Request::SetLimit {
                    site: "tiktok.com".to_string(),
                    new_limit: 2,
                },
                None,
            )
            .await;

        let events = (0..5)
            .map(|i| TraceEvent {
                at: i * 2000,
                page: Some(PageSnapshot::at(format!(
                    "https://www.tiktok.com/@someone/video/{}",
                    7000 + i
                ))),
                trigger: Trigger::Scroll,
            })
            .collect();
        let trace = Trace {
            url: "https://www.tiktok.com/@someone/video/7000".to_string(),
            tab: 4,
            events,
        };

        let registry = StrategyRegistry::with_defaults();
        let session = PageSession::new(
            &registry,
            &trace.url,
            LocalClient::new(&store, trace.tab),
            MonitorConfig::default(),
        )
        .unwrap();
        let report = replay(&session, &trace, &clock).await;

        assert!(report.redirected());
        assert_eq!(report.warnings(), 1);
        assert_eq!(store.storage().snapshot().unwrap().count_for("tiktok.com"), 2);
    }

    #[tokio::test]
    async fn test_replay_halts_on_dead_context() {
        struct DeadClient;

        impl QuotaClient for DeadClient {
            async fn send(
                &self,
                _request: crate::quota::Request,
            ) -> Result<crate::quota::Response, crate::error::MessagingError> {
                Err(crate::error::MessagingError::from_platform_message(
                    "Extension context invalidated.",
                ))
            }
        }

        let clock = clock();
        let registry = StrategyRegistry::with_defaults();
        let trace = Trace::from_json(SHORTS_TRACE).unwrap();
        let session =
            PageSession::new(&registry, &trace.url, DeadClient, MonitorConfig::default()).unwrap();

        let report = replay(&session, &trace, &clock).await;
        assert!(report.halted);
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].outcome, PassOutcome::Halted);
    }
}
