//! Per-site content detection
//!
//! Each tracked site gets one [`DetectionStrategy`]. A strategy answers two
//! questions about a [`PageSnapshot`]: is the user looking at one countable
//! unit of short-form content, and what identifier names that unit. New sites
//! are added by registering another strategy with the [`StrategyRegistry`].

mod multimedia;
mod shorts;
mod video_feed;

pub use multimedia::{InstagramUrl, MultimediaStrategy};
pub use shorts::ShortsStrategy;
pub use video_feed::VideoFeedStrategy;

use crate::config::SiteTiming;
use crate::types::{ElementBox, MediaElement, PageSnapshot, SiteProfile, Viewport};
use crate::url::domain_matches;

// =============================================================================
// Shared primitives
// =============================================================================

/// Elements at or below this size in either dimension are placeholders.
pub const MIN_VISIBLE_PX: f64 = 10.0;

/// Minimum rendered width/height of a video that counts as "being watched".
pub const MIN_FEATURED_PX: f64 = 100.0;

/// Visibility predicate shared by every strategy.
///
/// Visible iff attached, at least partially inside the viewport, larger than
/// [`MIN_VISIBLE_PX`] in both dimensions, and not hidden by computed style.
#[inline]
pub fn is_visible(el: &ElementBox, viewport: &Viewport) -> bool {
    if !el.attached || el.display_none || el.visibility_hidden {
        return false;
    }
    if !(el.width > MIN_VISIBLE_PX && el.height > MIN_VISIBLE_PX) {
        return false;
    }
    el.bottom() > 0.0 && el.right() > 0.0 && el.top < viewport.height && el.left < viewport.width
}

/// A visible, unpaused video that has advanced and is rendered large.
#[inline]
pub fn is_featured_playback(media: &MediaElement, viewport: &Viewport) -> bool {
    media.is_video()
        && !media.paused
        && media.current_time > 0.0
        && media.bounds.width > MIN_FEATURED_PX
        && media.bounds.height > MIN_FEATURED_PX
        && is_visible(&media.bounds, viewport)
}

/// Coarse time window index. Two calls within the same window agree.
#[inline]
pub fn time_bucket(now_ms: u64, window_secs: u64) -> u64 {
    now_ms / (window_secs.max(1) * 1000)
}

/// Identifier used when nothing stable can be extracted from the page.
pub fn fallback_id(page: &PageSnapshot, now_ms: u64) -> String {
    format!("content-{}-{}", page.path(), time_bucket(now_ms, 60))
}

// =============================================================================
// Strategy trait
// =============================================================================

/// Which DOM mutations are worth a detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPolicy {
    /// Only when the current URL already has a content shape. Used by sites
    /// that re-render constantly and would otherwise over-trigger.
    UrlGated,
    /// Whenever media or dialog nodes are added or change `src/style/class`.
    MediaNodes,
}

/// Site-specific detection capability.
pub trait DetectionStrategy: Send + Sync {
    /// The site this strategy handles.
    fn profile(&self) -> &'static SiteProfile;

    /// Whether the page currently shows one countable content unit.
    fn is_countable(&self, page: &PageSnapshot) -> bool;

    /// Best-effort identifier for the content on screen. `now_ms` feeds the
    /// time-bucketed fallbacks.
    fn content_id(&self, page: &PageSnapshot, now_ms: u64) -> String;

    /// Whether the URL alone has the shape of a content page.
    fn has_content_url(&self, page: &PageSnapshot) -> bool;

    fn timing(&self) -> SiteTiming {
        SiteTiming::default()
    }

    fn mutation_policy(&self) -> MutationPolicy {
        MutationPolicy::MediaNodes
    }

    /// CSS selectors whose clicks move to other content. The host evaluates
    /// `closest()` against each and reports the matches.
    fn nav_selectors(&self) -> &'static [&'static str] {
        &[]
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Strategy table keyed by domain.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn DetectionStrategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl StrategyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Registry with YouTube, TikTok and Instagram strategies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ShortsStrategy));
        registry.register(Box::new(VideoFeedStrategy));
        registry.register(Box::new(MultimediaStrategy));
        registry
    }

    /// Add a strategy. A later registration for the same domain wins.
    pub fn register(&mut self, strategy: Box<dyn DetectionStrategy>) {
        let domain = strategy.profile().domain;
        self.strategies.retain(|s| s.profile().domain != domain);
        self.strategies.push(strategy);
    }

    /// Strategy for a page hostname, matched by domain suffix.
    pub fn for_host(&self, host: &str) -> Option<&dyn DetectionStrategy> {
        self.strategies
            .iter()
            .find(|s| domain_matches(host, s.profile().domain))
            .map(|s| s.as_ref())
    }

    pub fn domains(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.iter().map(|s| s.profile().domain)
    }
}
