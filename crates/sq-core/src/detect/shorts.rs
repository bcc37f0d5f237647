//! YouTube Shorts: countable purely by URL shape.

use crate::config::SiteTiming;
use crate::types::{PageSnapshot, SiteProfile, YOUTUBE};
use crate::url::path_segments;

use super::{fallback_id, DetectionStrategy, MutationPolicy};

const NAV_SELECTORS: &[&str] = &[
    "button[aria-label*=\"Next\"]",
    "button[aria-label*=\"Previous\"]",
    "ytd-shorts-compact-video-renderer",
    "ytd-reel-video-renderer",
    "a[href*=\"/shorts/\"]",
    "ytd-shorts-video-renderer",
];

/// Short-form-by-URL detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortsStrategy;

/// Extract `{id}` from a path of exactly the shape `/shorts/{id}`.
pub fn short_id(path: &str) -> Option<&str> {
    let mut segments = path_segments(path);
    if segments.next()? != "shorts" {
        return None;
    }
    let id = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    Some(id)
}

impl DetectionStrategy for ShortsStrategy {
    fn profile(&self) -> &'static SiteProfile {
        &YOUTUBE
    }

    fn is_countable(&self, page: &PageSnapshot) -> bool {
        short_id(page.path()).is_some()
    }

    fn content_id(&self, page: &PageSnapshot, now_ms: u64) -> String {
        match short_id(page.path()) {
            Some(id) => format!("youtube-short-{id}"),
            None => fallback_id(page, now_ms),
        }
    }

    fn has_content_url(&self, page: &PageSnapshot) -> bool {
        self.is_countable(page)
    }

    fn timing(&self) -> SiteTiming {
        SiteTiming {
            initial_delay_ms: 1500,
            settle_delay_ms: 1000,
            click_delay_ms: 800,
            resize_delay_ms: 1000,
            fallback_tick_ms: 3000,
            scroll_advances: false,
        }
    }

    fn mutation_policy(&self) -> MutationPolicy {
        MutationPolicy::UrlGated
    }

    fn nav_selectors(&self) -> &'static [&'static str] {
        NAV_SELECTORS
    }
}
