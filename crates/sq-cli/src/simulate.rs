use std::fs;
use std::path::Path;

use sq_core::monitor::{replay, LocalClient, ReplayReport, Trace};
use sq_core::platform::ManualClock;
use sq_core::{MonitorConfig, PageSession, PageSnapshot, QuotaStore, StrategyRegistry};

use crate::store::{ConsoleTabs, FileStorage};

pub fn cmd_content_id(page: Option<&Path>, url: Option<&str>, now_ms: Option<u64>) -> Result<(), String> {
    let page = match (page, url) {
        (Some(path), _) => read_page(path)?,
        (None, Some(url)) => PageSnapshot::at(url),
        (None, None) => return Err("Either --page or --url is required".to_string()),
    };
    let now_ms = now_ms.unwrap_or_else(|| {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    });

    let registry = StrategyRegistry::with_defaults();
    let host = page.host();
    let strategy = registry
        .for_host(&host)
        .ok_or_else(|| format!("No detection strategy for host '{}'", host))?;

    println!("Site:        {}", strategy.profile().display_name);
    println!("Countable:   {}", strategy.is_countable(&page));
    println!("Content URL: {}", strategy.has_content_url(&page));
    println!("Content id:  {}", strategy.content_id(&page, now_ms));

    Ok(())
}

pub async fn cmd_simulate(state: &Path, trace_path: &Path, config: MonitorConfig) -> Result<(), String> {
    let text = fs::read_to_string(trace_path)
        .map_err(|e| format!("Failed to read '{}': {}", trace_path.display(), e))?;
    let trace = Trace::from_json(&text).map_err(|e| format!("{}: {}", trace_path.display(), e))?;

    let clock = ManualClock::new(chrono::Local::now().naive_local());
    let report = simulate(state, &trace, config, &clock).await?;

    for step in &report.steps {
        println!("{:>8} ms  {}", step.at, step.outcome.summary());
        if step.outcome.warning() {
            println!("{:>11}  one view left today", "!");
        }
    }
    println!();
    println!("Counted:     {}", report.counted());
    println!("Warnings:    {}", report.warnings());
    if report.redirected() {
        println!("Ended on the block page");
    }
    if report.halted {
        println!("Monitor stopped: extension context invalidated");
    }

    Ok(())
}

async fn simulate(
    state: &Path,
    trace: &Trace,
    config: MonitorConfig,
    clock: &ManualClock,
) -> Result<ReplayReport, String> {
    let store = QuotaStore::new(FileStorage::new(state), ConsoleTabs::default(), clock);
    let registry = StrategyRegistry::with_defaults();
    let session = PageSession::new(&registry, &trace.url, LocalClient::new(&store, trace.tab), config)
        .map_err(|e| e.to_string())?;

    Ok(replay(&session, trace, clock).await)
}

fn read_page(path: &Path) -> Result<PageSnapshot, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid page snapshot '{}': {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use sq_core::platform::StateStorage;
    use tempfile::TempDir;

    use super::*;

    const REELS_TRACE: &str = r#"{
        "url": "https://www.instagram.com/reel/C1a/",
        "tab": 3,
        "events": [
            { "at": 0, "trigger": { "type": "pageLoad" } },
            { "at": 3000, "page": { "url": "https://www.instagram.com/reel/C2b/" },
              "trigger": { "type": "click", "matched": true } },
            { "at": 6000, "page": { "url": "https://www.instagram.com/reel/C3c/" },
              "trigger": { "type": "navigationTick" } }
        ]
    }"#;

    fn clock() -> ManualClock {
        ManualClock::new(
            NaiveDate::from_ymd_opt(2026, 9, 1)
                .unwrap()
                .and_hms_opt(21, 0, 0)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_simulate_counts_into_state_file() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state.json");
        let trace = Trace::from_json(REELS_TRACE).unwrap();

        let report = simulate(&state, &trace, MonitorConfig::default(), &clock())
            .await
            .unwrap();

        assert_eq!(report.counted(), 3);
        let saved = FileStorage::new(&state).load().await.unwrap().unwrap();
        assert_eq!(saved.count_for("instagram.com"), 3);
    }

    #[tokio::test]
    async fn test_simulate_untracked_site() {
        let dir = TempDir::new().unwrap();
        let trace = Trace::from_json(
            r#"{"url":"https://example.com/","events":[{"at":0,"trigger":{"type":"pageLoad"}}]}"#,
        )
        .unwrap();

        let err = simulate(&dir.path().join("state.json"), &trace, MonitorConfig::default(), &clock())
            .await
            .unwrap_err();
        assert!(err.contains("example.com"));
    }

    #[test]
    fn test_content_id_needs_input() {
        assert!(cmd_content_id(None, None, None).is_err());
        assert!(cmd_content_id(None, Some("https://www.tiktok.com/@a/video/123"), Some(0)).is_ok());
        assert!(cmd_content_id(None, Some("https://example.com/"), Some(0)).is_err());
    }
}
