//! TikTok: video URLs, or a playing feed video when the URL does not change.

use crate::config::SiteTiming;
use crate::types::{MediaElement, PageSnapshot, SiteProfile, TIKTOK};
use crate::url::{last_segment, path_segments};

use super::{fallback_id, is_featured_playback, time_bucket, DetectionStrategy};

/// Window for feed identifiers that carry no stable id.
const FEED_WINDOW_SECS: u64 = 15;

const NAV_SELECTORS: &[&str] = &[
    "[data-e2e=\"arrow-right\"]",
    "[data-e2e=\"arrow-left\"]",
    ".video-card",
    ".video-feed-item",
    "button",
    "a[href*=\"video\"]",
];

/// Video-by-URL-or-playback detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoFeedStrategy;

/// Numeric id from `/video/{id}` or `/@user/video/{id}`.
pub fn video_id(path: &str) -> Option<&str> {
    let segments: Vec<&str> = path_segments(path).collect();
    let id = match segments.as_slice() {
        ["video", id] => *id,
        [user, "video", id] if user.starts_with('@') && user.len() > 1 => *id,
        _ => return None,
    };
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        Some(id)
    } else {
        None
    }
}

fn playing_video(page: &PageSnapshot) -> Option<&MediaElement> {
    page.videos()
        .find(|v| is_featured_playback(v, &page.viewport))
}

/// Identifier for a feed video, most specific source first.
fn feed_id(video: &MediaElement, now_ms: u64) -> String {
    if let Some(fragment) = video.src.as_deref().and_then(last_segment) {
        return format!("tiktok-src-{fragment}");
    }
    let bucket = time_bucket(now_ms, FEED_WINDOW_SECS);
    if let Some(handle) = video.nearby_handle.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        return format!("tiktok-{}-{bucket}", handle.trim_start_matches('@'));
    }
    let bounds = &video.bounds;
    if bounds.width > 0.0 {
        return format!(
            "tiktok-pos-{}x{}-{bucket}",
            bounds.left.round() as i64,
            bounds.top.round() as i64
        );
    }
    format!("tiktok-feed-{bucket}")
}

impl DetectionStrategy for VideoFeedStrategy {
    fn profile(&self) -> &'static SiteProfile {
        &TIKTOK
    }

    fn is_countable(&self, page: &PageSnapshot) -> bool {
        video_id(page.path()).is_some() || playing_video(page).is_some()
    }

    fn content_id(&self, page: &PageSnapshot, now_ms: u64) -> String {
        if let Some(id) = video_id(page.path()) {
            return format!("tiktok-video-{id}");
        }
        match playing_video(page) {
            Some(video) => feed_id(video, now_ms),
            None => fallback_id(page, now_ms),
        }
    }

    fn has_content_url(&self, page: &PageSnapshot) -> bool {
        video_id(page.path()).is_some()
    }

    fn timing(&self) -> SiteTiming {
        SiteTiming {
            initial_delay_ms: 1500,
            settle_delay_ms: 1000,
            click_delay_ms: 1000,
            resize_delay_ms: 1000,
            fallback_tick_ms: 1000,
            scroll_advances: true,
        }
    }

    fn nav_selectors(&self) -> &'static [&'static str] {
        NAV_SELECTORS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElementBox;

    fn playing(src: Option<&str>, handle: Option<&str>) -> MediaElement {
        MediaElement {
            bounds: ElementBox::new(40.0, 300.0, 360.0, 640.0),
            paused: false,
            current_time: 3.2,
            src: src.map(String::from),
            nearby_handle: handle.map(String::from),
            ..MediaElement::default()
        }
    }

    #[test]
    fn test_video_id_shapes() {
        assert_eq!(video_id("/video/7234567890123"), Some("7234567890123"));
        assert_eq!(video_id("/@someone/video/7234567890123"), Some("7234567890123"));
        assert_eq!(video_id("/@someone/video/abc"), None);
        assert_eq!(video_id("/@someone"), None);
        assert_eq!(video_id("/foryou"), None);
        assert_eq!(video_id("/@/video/1"), None);
    }

    #[test]
    fn test_url_video_countable_without_playback() {
        let page = PageSnapshot::at("https://www.tiktok.com/@someone/video/7234567890123?is_from_webapp=1");
        assert!(VideoFeedStrategy.is_countable(&page));
        assert_eq!(VideoFeedStrategy.content_id(&page, 0), "tiktok-video-7234567890123");
    }

    #[test]
    fn test_feed_playback_countable() {
        let page = PageSnapshot::at("https://www.tiktok.com/foryou")
            .with_media(playing(Some("blob:https://www.tiktok.com/8d1e-44f0"), None));
        assert!(VideoFeedStrategy.is_countable(&page));
        assert!(!VideoFeedStrategy.has_content_url(&page));
        assert_eq!(VideoFeedStrategy.content_id(&page, 0), "tiktok-src-8d1e-44f0");
    }

    #[test]
    fn test_feed_paused_video_not_countable() {
        let mut video = playing(None, None);
        video.paused = true;
        let page = PageSnapshot::at("https://www.tiktok.com/foryou").with_media(video);
        assert!(!VideoFeedStrategy.is_countable(&page));
    }

    #[test]
    fn test_feed_id_fallback_chain() {
        let page = PageSnapshot::at("https://www.tiktok.com/foryou")
            .with_media(playing(None, Some("@dancer")));
        assert_eq!(VideoFeedStrategy.content_id(&page, 16_000), "tiktok-dancer-1");

        let page = PageSnapshot::at("https://www.tiktok.com/foryou").with_media(playing(None, None));
        assert_eq!(VideoFeedStrategy.content_id(&page, 16_000), "tiktok-pos-300x40-1");
    }
}
