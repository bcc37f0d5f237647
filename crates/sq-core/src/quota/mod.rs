//! Quota Store: persisted counters and limits, day rollover, message codec.

pub mod message;
mod state;
mod store;

pub use message::{
    Ack, BulkLimitReply, DomainMap, ErrorReply, IncrementReply, LimitReply, Request, Response,
    StatusReply,
};
pub use state::{day_key, default_limits, is_reached, Effect, QuotaState, Transition};
pub use store::{QuotaStore, INTERNAL_ERROR};
