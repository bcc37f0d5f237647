//! Events that may warrant a detection pass.
//!
//! Detection is event-driven. The host forwards observer callbacks, media
//! events, clicks, scrolls and timer ticks as [`Trigger`]s; the session
//! answers with a delay after which a pass should run, or nothing.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Kinds of DOM nodes touched by a mutation batch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct NodeKinds: u8 {
        const VIDEO = 1 << 0;
        const IMAGE = 1 << 1;
        /// `[role="dialog"]`
        const DIALOG = 1 << 2;
        const OTHER = 1 << 3;

        /// Nodes whose arrival or `src/style/class` change can mean new content.
        const RELEVANT = Self::VIDEO.bits() | Self::IMAGE.bits() | Self::DIALOG.bits();
    }
}

/// Media element events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaEvent {
    Play,
    Playing,
    /// `timeupdate`, with the element's playback position in seconds.
    TimeUpdate(f64),
}

/// Something happened on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Trigger {
    /// Script attached to a freshly loaded page.
    PageLoad,
    /// A debounced mutation observer batch.
    Mutation {
        #[serde(default)]
        added: NodeKinds,
        #[serde(default)]
        attributes: NodeKinds,
    },
    /// The URL poll fired.
    NavigationTick,
    Media { event: MediaEvent },
    /// A click; `matched` is whether the target is inside one of the
    /// strategy's navigation selectors.
    Click { matched: bool },
    Scroll,
    Resize,
    /// Periodic safety net in case other triggers were missed.
    FallbackTick,
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PageLoad => "pageLoad",
            Self::Mutation { .. } => "mutation",
            Self::NavigationTick => "navigationTick",
            Self::Media { .. } => "media",
            Self::Click { .. } => "click",
            Self::Scroll => "scroll",
            Self::Resize => "resize",
            Self::FallbackTick => "fallbackTick",
        }
    }
}
