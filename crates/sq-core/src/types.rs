//! Core type definitions for ShortQuota
//!
//! A [`PageSnapshot`] is what the content script captures from the live DOM
//! before each detection pass. Detection is a pure function of the snapshot,
//! which keeps every heuristic testable without a browser.

use serde::{Deserialize, Serialize};

use crate::url::{extract_host, extract_path, normalize_host};

/// Browser tab identifier.
pub type TabId = i32;

// =============================================================================
// Site Profiles
// =============================================================================

/// Static configuration for a tracked domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteProfile {
    /// Registrable domain, matched by suffix against the page hostname.
    pub domain: &'static str,
    /// Name shown on the block page and in the configuration UI.
    pub display_name: &'static str,
    /// Limit seeded on install.
    pub default_limit: u32,
}

pub const YOUTUBE: SiteProfile = SiteProfile {
    domain: "youtube.com",
    display_name: "YouTube",
    default_limit: 10,
};

pub const INSTAGRAM: SiteProfile = SiteProfile {
    domain: "instagram.com",
    display_name: "Instagram",
    default_limit: 15,
};

pub const TIKTOK: SiteProfile = SiteProfile {
    domain: "tiktok.com",
    display_name: "TikTok",
    default_limit: 20,
};

/// Every site the extension tracks out of the box.
pub const KNOWN_SITES: [SiteProfile; 3] = [YOUTUBE, INSTAGRAM, TIKTOK];

/// Limit applied to a domain that has no stored limit.
pub const FALLBACK_LIMIT: u32 = 10;

/// Look up a known site by exact domain.
pub fn known_site(domain: &str) -> Option<&'static SiteProfile> {
    KNOWN_SITES.iter().find(|s| s.domain == domain)
}

// =============================================================================
// Geometry / Visibility inputs
// =============================================================================

/// Viewport size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

/// Layout facts about one DOM element, captured at snapshot time.
///
/// `attached == false` covers elements removed between query and use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElementBox {
    pub attached: bool,
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
    /// Computed `display: none`
    pub display_none: bool,
    /// Computed `visibility: hidden`
    pub visibility_hidden: bool,
}

impl Default for ElementBox {
    fn default() -> Self {
        Self {
            attached: true,
            top: 0.0,
            left: 0.0,
            width: 0.0,
            height: 0.0,
            display_none: false,
            visibility_hidden: false,
        }
    }
}

impl ElementBox {
    /// Box at the given position and size, attached and styled visible.
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
            ..Self::default()
        }
    }

    #[inline]
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    /// True when `inner` lies entirely within this box.
    pub fn contains(&self, inner: &ElementBox) -> bool {
        inner.top >= self.top
            && inner.left >= self.left
            && inner.bottom() <= self.bottom()
            && inner.right() <= self.right()
    }
}

// =============================================================================
// Media / Controls
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    #[default]
    Video,
    Image,
}

/// A `<video>` or `<img>` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MediaElement {
    pub kind: MediaKind,
    #[serde(rename = "box")]
    pub bounds: ElementBox,
    pub paused: bool,
    /// Playback position in seconds.
    pub current_time: f64,
    /// `src` or `currentSrc`.
    pub src: Option<String>,
    /// Inside a `[role="dialog"]` ancestor.
    pub in_dialog: bool,
    /// Account handle text found near the element (`@name`).
    pub nearby_handle: Option<String>,
}

impl Default for MediaElement {
    fn default() -> Self {
        Self {
            kind: MediaKind::Video,
            bounds: ElementBox::default(),
            paused: true,
            current_time: 0.0,
            src: None,
            in_dialog: false,
            nearby_handle: None,
        }
    }
}

impl MediaElement {
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

/// Interactive controls that only appear around a content viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlRole {
    Like,
    Pause,
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlElement {
    pub role: ControlRole,
    #[serde(rename = "box")]
    pub bounds: ElementBox,
}

// =============================================================================
// Page Snapshot
// =============================================================================

/// Everything detection needs to know about the page at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageSnapshot {
    /// `location.href`
    pub url: String,
    pub viewport: Viewport,
    pub media: Vec<MediaElement>,
    /// `[role="dialog"]` elements. Media laid out inside a visible one is
    /// treated as dialog media even when `in_dialog` was not reported.
    pub dialogs: Vec<ElementBox>,
    pub controls: Vec<ControlElement>,
}

impl PageSnapshot {
    /// Snapshot with a URL and an empty DOM.
    pub fn at(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Builder-style media append.
    pub fn with_media(mut self, media: MediaElement) -> Self {
        self.media.push(media);
        self
    }

    pub fn with_dialog(mut self, bounds: ElementBox) -> Self {
        self.dialogs.push(bounds);
        self
    }

    pub fn with_control(mut self, role: ControlRole, bounds: ElementBox) -> Self {
        self.controls.push(ControlElement { role, bounds });
        self
    }

    /// Normalized hostname (lowercase, no `www.`).
    pub fn host(&self) -> String {
        normalize_host(extract_host(&self.url).unwrap_or(""))
    }

    pub fn path(&self) -> &str {
        extract_path(&self.url)
    }

    pub fn videos(&self) -> impl Iterator<Item = &MediaElement> {
        self.media.iter().filter(|m| m.is_video())
    }
}
