//! WebAssembly bindings for ShortQuota
//!
//! The extension scripts own the browser APIs (storage, tabs, observers) and
//! call into these functions for every decision: which strategy covers a
//! page, what content is on screen, how a request changes the stored state.

use std::sync::OnceLock;

use chrono::NaiveDate;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use sq_core::{
    blockpage::{
        block_page_path, parse_limit_input, site_from_block_url, site_from_config_url,
        usage_level, BlockPageInfo, UsageLevel,
    },
    quota::{Effect, StatusReply},
    MonitorConfig, PageSnapshot, QuotaState, Request, SeenSet, StrategyRegistry,
};

struct Engine {
    registry: StrategyRegistry,
    config: MonitorConfig,
}

static ENGINE: OnceLock<Engine> = OnceLock::new();

fn engine() -> &'static Engine {
    ENGINE.get_or_init(|| Engine {
        registry: StrategyRegistry::with_defaults(),
        config: MonitorConfig::default(),
    })
}

/// Install monitor settings. Without a call, defaults apply.
#[wasm_bindgen]
pub fn init(config_json: Option<String>) -> Result<(), JsValue> {
    if ENGINE.get().is_some() {
        return Err(JsValue::from_str("Already initialized. Reload the page to reinitialize."));
    }

    let config = match config_json {
        Some(text) => MonitorConfig::from_json(&text)
            .map_err(|e| JsValue::from_str(&format!("Invalid monitor config: {}", e)))?,
        None => MonitorConfig::default(),
    };

    ENGINE
        .set(Engine {
            registry: StrategyRegistry::with_defaults(),
            config,
        })
        .map_err(|_| JsValue::from_str("Failed to set engine state"))?;

    Ok(())
}

#[wasm_bindgen]
pub fn is_tracked(url: &str) -> bool {
    engine().registry.for_host(&PageSnapshot::at(url).host()).is_some()
}

/// Timers, selectors and thresholds the content script schedules with.
#[wasm_bindgen]
pub fn monitor_settings(url: &str) -> JsValue {
    let engine = engine();
    let result = js_sys::Object::new();

    let Some(strategy) = engine.registry.for_host(&PageSnapshot::at(url).host()) else {
        let _ = js_sys::Reflect::set(&result, &"tracked".into(), &JsValue::from(false));
        return result.into();
    };

    let timing = strategy.timing();
    let config = &engine.config;
    let _ = js_sys::Reflect::set(&result, &"tracked".into(), &JsValue::from(true));
    let _ = js_sys::Reflect::set(&result, &"domain".into(), &JsValue::from_str(strategy.profile().domain));
    let _ = js_sys::Reflect::set(&result, &"initialDelay".into(), &JsValue::from(timing.initial_delay_ms as f64));
    let _ = js_sys::Reflect::set(&result, &"settleDelay".into(), &JsValue::from(timing.settle_delay_ms as f64));
    let _ = js_sys::Reflect::set(&result, &"clickDelay".into(), &JsValue::from(timing.click_delay_ms as f64));
    let _ = js_sys::Reflect::set(&result, &"resizeDelay".into(), &JsValue::from(timing.resize_delay_ms as f64));
    let _ = js_sys::Reflect::set(&result, &"fallbackTick".into(), &JsValue::from(timing.fallback_tick_ms as f64));
    let _ = js_sys::Reflect::set(&result, &"scrollAdvances".into(), &JsValue::from(timing.scroll_advances));
    let _ = js_sys::Reflect::set(&result, &"mutationDebounce".into(), &JsValue::from(config.mutation_debounce_ms as f64));
    let _ = js_sys::Reflect::set(&result, &"navigationPoll".into(), &JsValue::from(config.navigation_poll_ms as f64));
    let _ = js_sys::Reflect::set(&result, &"contextProbe".into(), &JsValue::from(config.context_probe_ms as f64));
    let _ = js_sys::Reflect::set(&result, &"responseTimeout".into(), &JsValue::from(config.response_timeout_ms as f64));
    let _ = js_sys::Reflect::set(&result, &"minPlayback".into(), &JsValue::from(config.min_playback_secs));
    let _ = js_sys::Reflect::set(&result, &"dedupCapacity".into(), &JsValue::from(config.dedup_capacity as u32));

    let selectors = js_sys::Array::new();
    for selector in strategy.nav_selectors() {
        selectors.push(&JsValue::from_str(selector));
    }
    let _ = js_sys::Reflect::set(&result, &"navSelectors".into(), &selectors);

    result.into()
}

/// Classify a page snapshot: is it countable, and under what identifier.
#[wasm_bindgen]
pub fn classify_page(page_json: &str, now_ms: f64) -> Result<JsValue, JsValue> {
    let page: PageSnapshot = serde_json::from_str(page_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid page snapshot: {}", e)))?;

    let result = js_sys::Object::new();
    let Some(strategy) = engine().registry.for_host(&page.host()) else {
        let _ = js_sys::Reflect::set(&result, &"tracked".into(), &JsValue::from(false));
        return Ok(result.into());
    };

    let now_ms = if now_ms.is_finite() && now_ms > 0.0 { now_ms as u64 } else { 0 };
    let _ = js_sys::Reflect::set(&result, &"tracked".into(), &JsValue::from(true));
    let _ = js_sys::Reflect::set(&result, &"domain".into(), &JsValue::from_str(strategy.profile().domain));
    let _ = js_sys::Reflect::set(&result, &"countable".into(), &JsValue::from(strategy.is_countable(&page)));
    let _ = js_sys::Reflect::set(&result, &"hasContentUrl".into(), &JsValue::from(strategy.has_content_url(&page)));
    let _ = js_sys::Reflect::set(
        &result,
        &"contentId".into(),
        &JsValue::from_str(&strategy.content_id(&page, now_ms)),
    );

    Ok(result.into())
}

/// Serve one quota request against the stored record.
///
/// `state_json` is the record as read from storage (absent on a fresh
/// profile); `today` is an ISO date and defaults to the local date. The
/// caller persists `state` when `changed` is set and performs `effect`.
#[wasm_bindgen]
pub fn apply_request(
    state_json: Option<String>,
    request_json: &str,
    today: Option<String>,
) -> Result<JsValue, JsValue> {
    let today = parse_today(today)?;
    let request: Request = serde_json::from_str(request_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid request: {}", e)))?;

    let (mut state, recovered) = match state_json.as_deref().map(serde_json::from_str::<QuotaState>) {
        Some(Ok(state)) => (state, false),
        Some(Err(e)) => {
            web_sys::console::warn_1(&format!("Stored quota state unreadable, reseeding: {}", e).into());
            (QuotaState::seeded(today), true)
        }
        None => (QuotaState::seeded(today), true),
    };

    let transition = state.apply(&request, today);

    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"response".into(), &to_js(&transition.response)?);
    let _ = js_sys::Reflect::set(&result, &"changed".into(), &JsValue::from(transition.changed || recovered));
    let state_text = serde_json::to_string(&state)
        .map_err(|e| JsValue::from_str(&format!("Failed to encode state: {}", e)))?;
    let _ = js_sys::Reflect::set(&result, &"state".into(), &JsValue::from_str(&state_text));

    let effect = match transition.effect {
        Some(Effect::SwapToBlockPage { site }) => {
            let effect = js_sys::Object::new();
            let _ = js_sys::Reflect::set(&effect, &"type".into(), &JsValue::from_str("swapToBlockPage"));
            let _ = js_sys::Reflect::set(&effect, &"path".into(), &JsValue::from_str(&block_page_path(&site)));
            let _ = js_sys::Reflect::set(&effect, &"site".into(), &JsValue::from_str(&site));
            effect.into()
        }
        Some(Effect::OpenPopup) => {
            let effect = js_sys::Object::new();
            let _ = js_sys::Reflect::set(&effect, &"type".into(), &JsValue::from_str("openPopup"));
            effect.into()
        }
        None => JsValue::NULL,
    };
    let _ = js_sys::Reflect::set(&result, &"effect".into(), &effect);

    Ok(result.into())
}

/// Everything the block page renders, from its own URL and a status reply.
#[wasm_bindgen]
pub fn block_page_info(block_url: &str, status_json: &str) -> Result<JsValue, JsValue> {
    let status: StatusReply = serde_json::from_str(status_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid status: {}", e)))?;
    let site = site_from_block_url(block_url);
    let now = chrono::Local::now().naive_local();
    to_js(&BlockPageInfo::new(site, &status, now))
}

#[wasm_bindgen]
pub fn config_page_site(url: &str) -> String {
    site_from_config_url(url).to_string()
}

/// `{ valid, value }` or `{ valid, error }` for a typed limit.
#[wasm_bindgen]
pub fn validate_limit_input(input: &str) -> JsValue {
    let result = js_sys::Object::new();
    match parse_limit_input(input) {
        Ok(value) => {
            let _ = js_sys::Reflect::set(&result, &"valid".into(), &JsValue::from(true));
            let _ = js_sys::Reflect::set(&result, &"value".into(), &JsValue::from(value));
        }
        Err(e) => {
            let _ = js_sys::Reflect::set(&result, &"valid".into(), &JsValue::from(false));
            let _ = js_sys::Reflect::set(&result, &"error".into(), &JsValue::from_str(&e.to_string()));
        }
    }
    result.into()
}

#[wasm_bindgen]
pub fn usage_level_js(counter: u32, limit: u32) -> String {
    match usage_level(counter, limit) {
        UsageLevel::Ok => "ok",
        UsageLevel::Near => "near",
        UsageLevel::Exceeded => "exceeded",
    }
    .to_string()
}

/// Per-page record of identifiers already reported.
#[wasm_bindgen]
pub struct SeenIds {
    inner: SeenSet,
}

#[wasm_bindgen]
impl SeenIds {
    #[wasm_bindgen(constructor)]
    pub fn new(capacity: Option<u32>) -> SeenIds {
        let capacity = capacity.map_or(engine().config.dedup_capacity, |c| c as usize);
        SeenIds {
            inner: SeenSet::new(capacity),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains(id)
    }

    /// Returns the identifier evicted to make room, if any.
    pub fn insert(&mut self, id: &str) -> Option<String> {
        self.inner.insert(id)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    #[wasm_bindgen(getter)]
    pub fn size(&self) -> u32 {
        self.inner.len() as u32
    }
}

fn parse_today(today: Option<String>) -> Result<NaiveDate, JsValue> {
    match today {
        Some(text) => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .map_err(|e| JsValue::from_str(&format!("Invalid date '{}': {}", text, e))),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let text = serde_json::to_string(value)
        .map_err(|e| JsValue::from_str(&format!("Failed to encode: {}", e)))?;
    js_sys::JSON::parse(&text)
}
