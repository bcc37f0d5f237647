//! Monitor tunables.
//!
//! Site-specific timings live on each [`crate::detect::DetectionStrategy`];
//! this struct holds what is shared by every page.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dedup::DEFAULT_CAPACITY;

/// Page monitor configuration. Every field has a default, so a partial JSON
/// object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Identifiers remembered per page before the oldest is evicted.
    pub dedup_capacity: usize,
    /// Delay after a relevant mutation batch.
    pub mutation_debounce_ms: u64,
    /// Period of the navigation (URL) poll.
    pub navigation_poll_ms: u64,
    /// Minimum spacing between scroll-triggered passes.
    pub scroll_interval_ms: u64,
    /// Delay after an accepted scroll.
    pub scroll_settle_ms: u64,
    /// Minimum spacing between proactive context probes.
    pub context_probe_ms: u64,
    /// Delay after a `play`/`playing` media event.
    pub playback_delay_ms: u64,
    /// `timeupdate` only triggers once playback passed this many seconds.
    pub min_playback_secs: f64,
    /// Upper bound on any single request to the quota store.
    pub response_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: DEFAULT_CAPACITY,
            mutation_debounce_ms: 300,
            navigation_poll_ms: 500,
            scroll_interval_ms: 1000,
            scroll_settle_ms: 500,
            context_probe_ms: 2000,
            playback_delay_ms: 500,
            min_playback_secs: 1.5,
            response_timeout_ms: 5000,
        }
    }
}

impl MonitorConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Parse a JSON config document.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Per-site delays, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteTiming {
    /// First pass after page load.
    pub initial_delay_ms: u64,
    /// Wait after a URL change before the page UI has settled.
    pub settle_delay_ms: u64,
    /// Wait after a navigation-control click.
    pub click_delay_ms: u64,
    /// Wait after a window resize.
    pub resize_delay_ms: u64,
    /// Fallback tick period.
    pub fallback_tick_ms: u64,
    /// Whether scrolling advances content (infinite feeds).
    pub scroll_advances: bool,
}

impl Default for SiteTiming {
    fn default() -> Self {
        Self {
            initial_delay_ms: 800,
            settle_delay_ms: 300,
            click_delay_ms: 800,
            resize_delay_ms: 500,
            fallback_tick_ms: 6000,
            scroll_advances: false,
        }
    }
}
