//! Block page and configuration page helpers.
//!
//! The block page shows which site hit its limit, today's count, and how long
//! until the counters reset at local midnight. The configuration page edits
//! limits; its input validation lives here so a bad value is never sent to
//! the quota store.

use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::quota::StatusReply;
use crate::types::{known_site, FALLBACK_LIMIT};
use crate::url::query_param;

pub const BLOCK_PAGE: &str = "limit-reached.html";
pub const CONFIG_PAGE: &str = "popup.html";

/// Where "Go to Google" leads.
pub const NEUTRAL_DESTINATION: &str = "https://google.com";

/// Site preselected on the configuration page when none is given.
pub const DEFAULT_CONFIG_SITE: &str = "youtube.com";

/// Path (relative to the extension root) of the block page for `site`.
pub fn block_page_path(site: &str) -> String {
    format!("{BLOCK_PAGE}?site={site}")
}

/// Path of the configuration page preselecting `site`.
pub fn config_page_path(site: &str) -> String {
    format!("{CONFIG_PAGE}?site={site}")
}

/// Site named by a block page URL. Accepts the legacy `sitio` parameter.
pub fn site_from_block_url(url: &str) -> &str {
    query_param(url, "site")
        .or_else(|| query_param(url, "sitio"))
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
}

/// Site preselected by a configuration page URL.
pub fn site_from_config_url(url: &str) -> &str {
    query_param(url, "site")
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CONFIG_SITE)
}

/// Human name for a domain ("YouTube"), or the domain itself.
pub fn display_name(site: &str) -> &str {
    known_site(site).map_or(site, |s| s.display_name)
}

// =============================================================================
// Countdown
// =============================================================================

/// Time left until the next local midnight.
pub fn time_until_midnight(now: NaiveDateTime) -> Duration {
    let next_midnight = match now.date().succ_opt() {
        Some(date) => date.and_time(NaiveTime::MIN),
        None => return Duration::ZERO,
    };
    (next_midnight - now).to_std().unwrap_or(Duration::ZERO)
}

/// "3 h 12 min", "5 min 3 s" or "42 seconds".
pub fn format_remaining(remaining: Duration) -> String {
    let seconds = remaining.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{} h {} min", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{} min {} s", minutes, seconds % 60)
    } else {
        format!("{} seconds", seconds)
    }
}

/// Everything the block page renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPageInfo {
    pub site: String,
    pub display_name: String,
    pub today_counter: u32,
    pub limit: u32,
    pub time_remaining: String,
    /// "Return to <site>" target.
    pub return_url: String,
    pub neutral_url: String,
    pub config_path: String,
}

impl BlockPageInfo {
    pub fn new(site: &str, status: &StatusReply, now: NaiveDateTime) -> Self {
        Self {
            site: site.to_string(),
            display_name: display_name(site).to_string(),
            today_counter: status.counter.get(site).copied().unwrap_or(0),
            limit: status.limits.get(site).copied().unwrap_or(FALLBACK_LIMIT),
            time_remaining: format_remaining(time_until_midnight(now)),
            return_url: format!("https://{site}"),
            neutral_url: NEUTRAL_DESTINATION.to_string(),
            config_path: config_page_path(site),
        }
    }
}

// =============================================================================
// Configuration input
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitInputError {
    #[error("Limit must be a number greater than 0")]
    NotANumber,
    #[error("Limit must be a number greater than 0")]
    NotPositive,
}

/// Validate a limit typed by the user.
pub fn parse_limit_input(input: &str) -> Result<u32, LimitInputError> {
    let trimmed = input.trim();
    let value: i64 = trimmed.parse().map_err(|_| LimitInputError::NotANumber)?;
    if value < 1 {
        return Err(LimitInputError::NotPositive);
    }
    u32::try_from(value).map_err(|_| LimitInputError::NotANumber)
}

/// How close a site is to its limit, for colouring the site cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UsageLevel {
    Ok,
    /// At or above 80% of the limit.
    Near,
    Exceeded,
}

pub fn usage_level(counter: u32, limit: u32) -> UsageLevel {
    if counter >= limit {
        UsageLevel::Exceeded
    } else if u64::from(counter) * 5 >= u64::from(limit) * 4 {
        UsageLevel::Near
    } else {
        UsageLevel::Ok
    }
}
