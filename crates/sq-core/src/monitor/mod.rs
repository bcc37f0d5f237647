//! Page Monitor: decides when to look at a page and reports new content.

mod client;
pub mod replay;
mod session;
mod trigger;

pub use client::{LocalClient, QuotaClient};
pub use replay::{replay, ReplayReport, ReplayStep, Trace, TraceError, TraceEvent};
pub use session::{PageSession, PassOutcome, SessionError, SkipReason};
pub use trigger::{MediaEvent, NodeKinds, Trigger};
