//! Platform boundary: persistent storage, tabs, and time.
//!
//! The engine never touches browser APIs directly. Hosts implement these
//! traits over `chrome.storage`, `chrome.tabs` and `Date`; tests and the CLI
//! use the in-memory and manual implementations below.

use std::cell::{Cell, RefCell};

use chrono::{Local, NaiveDate, NaiveDateTime};

use crate::error::{PlatformError, StorageError};
use crate::quota::QuotaState;
use crate::types::TabId;

// =============================================================================
// Storage
// =============================================================================

/// Key-value backend holding the single quota record.
#[allow(async_fn_in_trait)]
pub trait StateStorage {
    /// `Ok(None)` when nothing was ever stored.
    async fn load(&self) -> Result<Option<QuotaState>, StorageError>;
    async fn save(&self, state: &QuotaState) -> Result<(), StorageError>;
}

/// Storage kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    record: RefCell<Option<QuotaState>>,
    saves: Cell<usize>,
    fail_next: Cell<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: QuotaState) -> Self {
        Self {
            record: RefCell::new(Some(state)),
            ..Self::default()
        }
    }

    /// Current record, bypassing the async interface.
    pub fn snapshot(&self) -> Option<QuotaState> {
        self.record.borrow().clone()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }

    /// Make the next load or save fail.
    pub fn fail_next(&self) {
        self.fail_next.set(true);
    }

    fn take_failure(&self) -> Result<(), StorageError> {
        if self.fail_next.replace(false) {
            return Err(StorageError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

impl StateStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<QuotaState>, StorageError> {
        self.take_failure()?;
        let state = self.record.borrow().clone();
        // Behave like a real backend: completion is asynchronous.
        tokio::task::yield_now().await;
        Ok(state)
    }

    async fn save(&self, state: &QuotaState) -> Result<(), StorageError> {
        self.take_failure()?;
        tokio::task::yield_now().await;
        *self.record.borrow_mut() = Some(state.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

// =============================================================================
// Tabs
// =============================================================================

/// Windowing operations only the background context may perform.
#[allow(async_fn_in_trait)]
pub trait TabHost {
    /// Absolute URL of a page bundled with the extension.
    fn extension_url(&self, path: &str) -> String;
    async fn create_tab(&self, url: &str) -> Result<TabId, PlatformError>;
    async fn close_tab(&self, tab: TabId) -> Result<(), PlatformError>;
    async fn open_popup(&self) -> Result<(), PlatformError>;
}

// =============================================================================
// Clock
// =============================================================================

/// Source of the user-local wall clock.
pub trait Clock {
    /// Local date and time.
    fn local_now(&self) -> NaiveDateTime;

    /// Milliseconds since the epoch, for time-bucketed identifiers.
    fn now_ms(&self) -> u64;

    fn today(&self) -> NaiveDate {
        self.local_now().date()
    }
}

/// The machine's clock and time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(Local::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Clock that only moves when told to. Local time is treated as UTC.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Start at local midnight of `date`.
    pub fn at_day(date: NaiveDate) -> Self {
        Self::new(date.and_time(chrono::NaiveTime::MIN))
    }

    pub fn advance_ms(&self, ms: u64) {
        let delta = chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX));
        self.now.set(self.now.get() + delta);
    }

    pub fn set(&self, now: NaiveDateTime) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn local_now(&self) -> NaiveDateTime {
        self.now.get()
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.now.get().and_utc().timestamp_millis()).unwrap_or(0)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn local_now(&self) -> NaiveDateTime {
        (**self).local_now()
    }

    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
