//! Instagram: reels, stories, posts, the reels section, and media shown in
//! dialogs or the feed.
//!
//! Stories and scrolling surfaces have no stable per-item URL, so their
//! identifiers are time-bucketed. Windows are wide enough that slides of one
//! story, or a scroll through the reels tab, count once per window.

use crate::config::SiteTiming;
use crate::types::{MediaElement, PageSnapshot, SiteProfile, INSTAGRAM};
use crate::url::{last_segment, path_segments};

use super::{fallback_id, is_visible, time_bucket, DetectionStrategy, MIN_FEATURED_PX};

const STORY_WINDOW_SECS: u64 = 30;
const REELS_SECTION_WINDOW_SECS: u64 = 60;
const FEED_VIDEO_WINDOW_SECS: u64 = 120;

const NAV_SELECTORS: &[&str] = &[
    "[role=\"button\"]",
    "a[href*=\"/reel/\"]",
    "a[href*=\"/p/\"]",
    "svg",
    "[aria-label*=\"Next\"]",
    "[aria-label*=\"Previous\"]",
];

/// Content kinds recognizable from an Instagram path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstagramUrl<'a> {
    Reel(&'a str),
    Story(&'a str),
    Post(&'a str),
    ReelsSection,
}

impl<'a> InstagramUrl<'a> {
    /// Classify a path. Item URLs win over the section URL.
    pub fn parse(path: &'a str) -> Option<Self> {
        let segments: Vec<&str> = path_segments(path).collect();
        for pair in segments.windows(2) {
            match pair {
                ["reel", id] => return Some(Self::Reel(*id)),
                ["stories", user] => return Some(Self::Story(*user)),
                ["p", id] => return Some(Self::Post(*id)),
                _ => {}
            }
        }
        if segments.contains(&"reels") {
            return Some(Self::ReelsSection);
        }
        None
    }
}

/// Multimedia-by-URL-or-DOM detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultimediaStrategy;

fn in_visible_dialog(page: &PageSnapshot, media: &MediaElement) -> bool {
    media.in_dialog
        || page
            .dialogs
            .iter()
            .any(|d| is_visible(d, &page.viewport) && d.contains(&media.bounds))
}

fn dialog_media_src(page: &PageSnapshot) -> Option<Option<&str>> {
    page.media
        .iter()
        .find(|m| is_visible(&m.bounds, &page.viewport) && in_visible_dialog(page, m))
        .map(|m| m.src.as_deref())
}

fn has_visible_controls(page: &PageSnapshot) -> bool {
    page.controls
        .iter()
        .any(|c| is_visible(&c.bounds, &page.viewport))
}

fn has_feed_video(page: &PageSnapshot) -> bool {
    page.videos()
        .any(|v| is_visible(&v.bounds, &page.viewport) && v.bounds.width > MIN_FEATURED_PX)
}

fn has_playing_video(page: &PageSnapshot) -> bool {
    page.videos()
        .any(|v| !v.paused && is_visible(&v.bounds, &page.viewport))
}

impl DetectionStrategy for MultimediaStrategy {
    fn profile(&self) -> &'static SiteProfile {
        &INSTAGRAM
    }

    fn is_countable(&self, page: &PageSnapshot) -> bool {
        InstagramUrl::parse(page.path()).is_some()
            || dialog_media_src(page).is_some()
            || has_visible_controls(page)
            || has_playing_video(page)
    }

    fn content_id(&self, page: &PageSnapshot, now_ms: u64) -> String {
        match InstagramUrl::parse(page.path()) {
            Some(InstagramUrl::Reel(id)) => return format!("instagram-reel-{id}"),
            Some(InstagramUrl::Story(user)) => {
                return format!(
                    "instagram-story-{user}-{}",
                    time_bucket(now_ms, STORY_WINDOW_SECS)
                )
            }
            Some(InstagramUrl::Post(id)) => return format!("instagram-post-{id}"),
            Some(InstagramUrl::ReelsSection) => {
                return format!(
                    "instagram-reels-section-{}",
                    time_bucket(now_ms, REELS_SECTION_WINDOW_SECS)
                )
            }
            None => {}
        }

        if let Some(src) = dialog_media_src(page) {
            if let Some(fragment) = src.and_then(last_segment) {
                return format!("instagram-dialog-{fragment}");
            }
        }

        if has_feed_video(page) {
            return format!(
                "instagram-feed-video-{}-{}",
                page.path(),
                time_bucket(now_ms, FEED_VIDEO_WINDOW_SECS)
            );
        }

        fallback_id(page, now_ms)
    }

    fn has_content_url(&self, page: &PageSnapshot) -> bool {
        InstagramUrl::parse(page.path()).is_some()
    }

    fn timing(&self) -> SiteTiming {
        SiteTiming {
            initial_delay_ms: 1500,
            settle_delay_ms: 300,
            click_delay_ms: 1500,
            resize_delay_ms: 1000,
            fallback_tick_ms: 1000,
            scroll_advances: false,
        }
    }

    fn nav_selectors(&self) -> &'static [&'static str] {
        NAV_SELECTORS
    }
}
