//! ShortQuota Core Library
//!
//! This crate provides the content-identification and quota-enforcement engine
//! for the ShortQuota browser extension. It limits how many short-form videos
//! (YouTube Shorts, TikTok videos, Instagram Reels/Stories) a user views per day.
//!
//! # Architecture
//!
//! Two cooperating halves talk only through the request/response messages in
//! [`quota::message`]:
//!
//! - The page monitor ([`monitor::PageSession`]) runs once per page load. It
//!   classifies page snapshots with a per-site [`detect::DetectionStrategy`],
//!   remembers what it already reported in a bounded [`dedup::SeenSet`], and
//!   asks the quota store to count new content.
//! - The quota store ([`quota::QuotaStore`]) owns the persisted counters and
//!   limits, rolls them over lazily at the first access of a new day, and
//!   swaps a tab for the block page once a limit is reached.
//!
//! Storage, tabs, clocks and message transport are injected through the traits
//! in [`platform`] and [`monitor::QuotaClient`].
//!
//! # Modules
//!
//! - `url`: Allocation-free URL slicing and domain matching
//! - `types`: Page snapshots, element boxes, site profiles
//! - `detect`: Visibility predicate and per-site detection strategies
//! - `dedup`: Insertion-ordered bounded set of content identifiers
//! - `quota`: Persisted state, day rollover, message codec, quota store
//! - `monitor`: Per-page session, trigger scheduling, trace replay
//! - `blockpage`: Block page and configuration page helpers
//! - `platform`: Storage, tab and clock boundaries
//! - `config`: Monitor tunables
//! - `error`: Error types

pub mod blockpage;
pub mod config;
pub mod dedup;
pub mod detect;
pub mod error;
pub mod monitor;
pub mod platform;
pub mod quota;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use config::MonitorConfig;
pub use dedup::SeenSet;
pub use detect::{DetectionStrategy, StrategyRegistry};
pub use error::{MessagingError, PlatformError, QuotaError, StorageError};
pub use monitor::{PageSession, PassOutcome, QuotaClient, Trigger};
pub use quota::{QuotaState, QuotaStore, Request, Response};
pub use types::{ElementBox, MediaElement, PageSnapshot, TabId, Viewport};
