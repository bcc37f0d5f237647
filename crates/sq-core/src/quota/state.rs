//! Persisted quota state and its pure transitions.
//!
//! Every transition starts with [`QuotaState::roll_over`]: if the stored day
//! differs from today the counters are stale and are dropped before the
//! request is served. Rollover is therefore lazy (no midnight timer) and the
//! first request of a new day always sees a clean slate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{FALLBACK_LIMIT, KNOWN_SITES};

use super::message::{
    Ack, BulkLimitReply, DomainMap, IncrementReply, LimitReply, Request, Response, StatusReply,
};

/// Calendar-day key stored in `lastDay`.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Limit policy: the view that brings the counter up to the limit is the
/// one that blocks.
#[inline]
pub fn is_reached(count: u32, limit: u32) -> bool {
    count >= limit
}

/// Side effect a transition asks its driver to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open the block page for `site` in place of the requesting tab.
    SwapToBlockPage { site: String },
    OpenPopup,
}

/// Outcome of applying one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub response: Response,
    pub effect: Option<Effect>,
    /// State differs from what was loaded and must be persisted.
    pub changed: bool,
}

/// The single persisted record.
///
/// Field aliases accept records written by the first, Spanish-keyed release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaState {
    #[serde(default, alias = "limites")]
    pub limits: DomainMap,
    #[serde(default, alias = "contador")]
    pub counter: DomainMap,
    #[serde(default, alias = "ultimoDia")]
    pub last_day: String,
}

impl QuotaState {
    /// Fresh-install state: default limits, no counts.
    pub fn seeded(today: NaiveDate) -> Self {
        Self {
            limits: default_limits(),
            counter: DomainMap::new(),
            last_day: day_key(today),
        }
    }

    /// Drop stale counters. Returns whether a reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        let key = day_key(today);
        if self.last_day == key {
            return false;
        }
        log::info!("New day {} (was '{}'), resetting counters", key, self.last_day);
        self.counter.clear();
        self.last_day = key;
        true
    }

    pub fn limit_for(&self, domain: &str) -> u32 {
        self.limits.get(domain).copied().unwrap_or(FALLBACK_LIMIT)
    }

    pub fn count_for(&self, domain: &str) -> u32 {
        self.counter.get(domain).copied().unwrap_or(0)
    }

    pub fn is_limit_reached(&self, domain: &str) -> bool {
        is_reached(self.count_for(domain), self.limit_for(domain))
    }

    /// Count one view. Missing entries start at zero.
    pub fn increment(&mut self, domain: &str) -> IncrementReply {
        let count = self.counter.entry(domain.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        let today_counter = *count;
        let limit = self.limit_for(domain);
        IncrementReply {
            reached: is_reached(today_counter, limit),
            today_counter,
            limit,
        }
    }

    /// Upsert a limit. Not re-validated here; the configuration UI rejects
    /// non-positive input before sending.
    pub fn set_limit(&mut self, domain: &str, limit: u32) {
        self.limits.insert(domain.to_string(), limit);
    }

    /// Zero all counters and stamp today. Limits are kept.
    pub fn reset(&mut self, today: NaiveDate) {
        self.counter.clear();
        self.last_day = day_key(today);
    }

    pub fn status(&self) -> StatusReply {
        StatusReply {
            counter: self.counter.clone(),
            limits: self.limits.clone(),
        }
    }

    /// Apply one request as of `today`.
    pub fn apply(&mut self, request: &Request, today: NaiveDate) -> Transition {
        let rolled = self.roll_over(today);

        let (response, effect, changed) = match request {
            Request::IncrementCounter { site } => {
                let reply = self.increment(site);
                log::info!("Counter {}: {}/{}", site, reply.today_counter, reply.limit);
                let effect = reply.reached.then(|| Effect::SwapToBlockPage { site: site.clone() });
                (Response::Increment(reply), effect, true)
            }
            Request::GetStatus => (Response::Status(self.status()), None, rolled),
            Request::SetLimit { site, new_limit } => {
                self.set_limit(site, *new_limit);
                log::info!("Limit {} set to {}", site, new_limit);
                let reply = LimitReply {
                    success: true,
                    updated_site: site.clone(),
                    new_limit: *new_limit,
                    all_limits: self.limits.clone(),
                };
                (Response::LimitUpdated(reply), None, true)
            }
            Request::SetAllLimits { sites, new_limit } => {
                for site in sites {
                    self.set_limit(site, *new_limit);
                }
                log::info!("Limit for {} site(s) set to {}", sites.len(), new_limit);
                let reply = BulkLimitReply {
                    success: true,
                    updated_sites: sites.clone(),
                    new_limit: *new_limit,
                    all_limits: self.limits.clone(),
                };
                (Response::LimitsUpdated(reply), None, true)
            }
            Request::ResetCounters => {
                self.reset(today);
                log::info!("Counters reset manually");
                (Response::Ack(Ack { success: true }), None, true)
            }
            Request::OpenLimitPage { site } => (
                Response::ack(true),
                Some(Effect::SwapToBlockPage { site: site.clone() }),
                rolled,
            ),
            Request::OpenPopup => (Response::ack(true), Some(Effect::OpenPopup), rolled),
        };

        Transition {
            response,
            effect,
            changed,
        }
    }
}

/// Limits seeded on install.
pub fn default_limits() -> DomainMap {
    KNOWN_SITES
        .iter()
        .map(|s| (s.domain.to_string(), s.default_limit))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn increment(state: &mut QuotaState, site: &str, today: NaiveDate) -> IncrementReply {
        let request = Request::IncrementCounter {
            site: site.to_string(),
        };
        match state.apply(&request, today).response {
            Response::Increment(reply) => reply,
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn test_seeded_defaults() {
        let state = QuotaState::seeded(day(1));
        assert_eq!(state.limits.get("youtube.com"), Some(&10));
        assert_eq!(state.limits.get("instagram.com"), Some(&15));
        assert_eq!(state.limits.get("tiktok.com"), Some(&20));
        assert!(state.counter.is_empty());
        assert_eq!(state.last_day, "2026-03-01");
    }

    #[test]
    fn test_sequential_increments_reach_limit_at_boundary() {
        let mut state = QuotaState::seeded(day(1));
        for n in 1..=9 {
            let reply = increment(&mut state, "youtube.com", day(1));
            assert!(!reply.reached);
            assert_eq!(reply.today_counter, n);
        }
        let reply = increment(&mut state, "youtube.com", day(1));
        assert!(reply.reached);
        assert_eq!(reply.today_counter, 10);
        assert_eq!(reply.limit, 10);
    }

    #[test]
    fn test_reached_requests_tab_swap() {
        let mut state = QuotaState::seeded(day(1));
        state.set_limit("tiktok.com", 1);
        let t = state.apply(
            &Request::IncrementCounter {
                site: "tiktok.com".to_string(),
            },
            day(1),
        );
        assert_eq!(
            t.effect,
            Some(Effect::SwapToBlockPage {
                site: "tiktok.com".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_domain_uses_fallback_limit() {
        let mut state = QuotaState::seeded(day(1));
        let reply = increment(&mut state, "example.com", day(1));
        assert_eq!(reply.limit, FALLBACK_LIMIT);
        assert_eq!(reply.today_counter, 1);
    }

    #[test]
    fn test_status_rolls_over_stale_day() {
        let mut state = QuotaState::seeded(day(1));
        increment(&mut state, "tiktok.com", day(1));

        let t = state.apply(&Request::GetStatus, day(2));
        assert!(t.changed);
        match t.response {
            Response::Status(status) => {
                assert!(status.counter.is_empty());
                assert_eq!(status.limits.get("tiktok.com"), Some(&20));
            }
            other => panic!("unexpected response {other:?}"),
        }
        assert_eq!(state.last_day, "2026-03-02");

        let t = state.apply(&Request::GetStatus, day(2));
        assert!(!t.changed);
    }

    #[test]
    fn test_increment_rolls_over_stale_day() {
        let mut state = QuotaState::seeded(day(1));
        for _ in 0..5 {
            increment(&mut state, "youtube.com", day(1));
        }
        let reply = increment(&mut state, "youtube.com", day(2));
        assert_eq!(reply.today_counter, 1);
        assert_eq!(state.last_day, "2026-03-02");
    }

    #[test]
    fn test_set_all_limits_overrides_prior() {
        let mut state = QuotaState::seeded(day(1));
        state.set_limit("a", 99);
        let request = Request::SetAllLimits {
            sites: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            new_limit: 5,
        };
        state.apply(&request, day(1));
        let status = state.status();
        assert_eq!(status.limits.get("a"), Some(&5));
        assert_eq!(status.limits.get("b"), Some(&5));
        assert_eq!(status.limits.get("c"), Some(&5));
    }

    #[test]
    fn test_reset_keeps_limits() {
        let mut state = QuotaState::seeded(day(1));
        increment(&mut state, "tiktok.com", day(1));
        state.apply(&Request::ResetCounters, day(1));
        assert_eq!(state.count_for("tiktok.com"), 0);
        assert_eq!(state.limit_for("tiktok.com"), 20);
    }

    #[test]
    fn test_legacy_record_parses() {
        let json = r#"{"limites":{"youtube.com":3},"contador":{"youtube.com":2},"ultimoDia":"3/1/2026"}"#;
        let mut state: QuotaState = serde_json::from_str(json).unwrap();
        assert_eq!(state.limit_for("youtube.com"), 3);
        // A locale-formatted day never equals the ISO key, so it rolls over.
        assert!(state.roll_over(day(1)));
        assert_eq!(state.count_for("youtube.com"), 0);
    }

    #[test]
    fn test_persisted_wire_shape() {
        let state = QuotaState::seeded(day(1));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["lastDay"], "2026-03-01");
        assert_eq!(json["limits"]["youtube.com"], 10);
        assert!(json["counter"].as_object().unwrap().is_empty());
    }
}
