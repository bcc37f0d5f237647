//! Request/response messages between pages, UI surfaces and the quota store.
//!
//! The JSON shape is the wire contract with the extension scripts: requests
//! carry an `action` tag, field names are camelCase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Domain → value map, ordered for stable output.
pub type DomainMap = BTreeMap<String, u32>;

/// A request to the quota store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    IncrementCounter {
        site: String,
    },
    GetStatus,
    #[serde(alias = "updateLimit", rename_all = "camelCase")]
    SetLimit {
        site: String,
        new_limit: u32,
    },
    #[serde(rename_all = "camelCase")]
    SetAllLimits {
        sites: Vec<String>,
        new_limit: u32,
    },
    ResetCounters,
    OpenLimitPage {
        site: String,
    },
    OpenPopup,
}

impl Request {
    /// The `action` tag, for logging.
    pub fn action(&self) -> &'static str {
        match self {
            Self::IncrementCounter { .. } => "incrementCounter",
            Self::GetStatus => "getStatus",
            Self::SetLimit { .. } => "setLimit",
            Self::SetAllLimits { .. } => "setAllLimits",
            Self::ResetCounters => "resetCounters",
            Self::OpenLimitPage { .. } => "openLimitPage",
            Self::OpenPopup => "openPopup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementReply {
    pub reached: bool,
    pub today_counter: u32,
    pub limit: u32,
}

impl IncrementReply {
    /// Exactly one more view is allowed today.
    pub fn one_left(&self) -> bool {
        !self.reached && self.today_counter.saturating_add(1) == self.limit
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub counter: DomainMap,
    pub limits: DomainMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitReply {
    pub success: bool,
    pub updated_site: String,
    pub new_limit: u32,
    pub all_limits: DomainMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkLimitReply {
    pub success: bool,
    pub updated_sites: Vec<String>,
    pub new_limit: u32,
    pub all_limits: DomainMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

/// A reply from the quota store. Variants are distinguished by their fields,
/// so declaration order matters for deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Increment(IncrementReply),
    Status(StatusReply),
    LimitUpdated(LimitReply),
    LimitsUpdated(BulkLimitReply),
    Ack(Ack),
    Error(ErrorReply),
}

impl Response {
    pub fn ack(success: bool) -> Self {
        Self::Ack(Ack { success })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorReply {
            error: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let req: Request =
            serde_json::from_str(r#"{"action":"incrementCounter","site":"youtube.com"}"#).unwrap();
        assert_eq!(
            req,
            Request::IncrementCounter {
                site: "youtube.com".to_string()
            }
        );

        let req: Request =
            serde_json::from_str(r#"{"action":"setAllLimits","sites":["a","b"],"newLimit":5}"#)
                .unwrap();
        assert_eq!(req.action(), "setAllLimits");

        let json = serde_json::to_value(Request::GetStatus).unwrap();
        assert_eq!(json, serde_json::json!({ "action": "getStatus" }));
    }

    #[test]
    fn test_legacy_update_limit_alias() {
        let req: Request =
            serde_json::from_str(r#"{"action":"updateLimit","site":"tiktok.com","newLimit":3}"#)
                .unwrap();
        assert_eq!(
            req,
            Request::SetLimit {
                site: "tiktok.com".to_string(),
                new_limit: 3
            }
        );
    }

    #[test]
    fn test_response_wire_shape() {
        let resp = Response::Increment(IncrementReply {
            reached: false,
            today_counter: 9,
            limit: 10,
        });
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            serde_json::json!({ "reached": false, "todayCounter": 9, "limit": 10 })
        );

        let parsed: Response = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert_eq!(parsed, Response::ack(true));

        let parsed: Response = serde_json::from_str(r#"{"error":"internal error"}"#).unwrap();
        assert_eq!(parsed, Response::error("internal error"));
    }

    #[test]
    fn test_one_left() {
        let reply = IncrementReply {
            reached: false,
            today_counter: 9,
            limit: 10,
        };
        assert!(reply.one_left());
        let reply = IncrementReply {
            reached: true,
            today_counter: 10,
            limit: 10,
        };
        assert!(!reply.one_left());
    }
}
