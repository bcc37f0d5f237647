use std::cell::{Cell, RefCell};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sq_core::error::{PlatformError, StorageError};
use sq_core::platform::{StateStorage, TabHost};
use sq_core::{QuotaState, TabId};

/// Quota record kept as a JSON file.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStorage for FileStorage {
    async fn load(&self) -> Result<Option<QuotaState>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| StorageError::Corrupt(format!("{}: {}", self.path.display(), e)))
    }

    async fn save(&self, state: &QuotaState) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(state)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

/// Tab host that prints what the browser would do. There is no toolbar, so
/// the popup cannot be opened.
pub struct ConsoleTabs {
    next_tab: Cell<TabId>,
    closed: RefCell<Vec<TabId>>,
    actions: RefCell<Vec<String>>,
}

impl Default for ConsoleTabs {
    fn default() -> Self {
        Self {
            next_tab: Cell::new(1000),
            closed: RefCell::new(Vec::new()),
            actions: RefCell::new(Vec::new()),
        }
    }
}

impl ConsoleTabs {
    pub fn actions(&self) -> Vec<String> {
        self.actions.borrow().clone()
    }

    fn record(&self, action: String) {
        println!("  [tabs] {}", action);
        self.actions.borrow_mut().push(action);
    }
}

impl TabHost for ConsoleTabs {
    fn extension_url(&self, path: &str) -> String {
        format!("chrome-extension://shortquota/{path}")
    }

    async fn create_tab(&self, url: &str) -> Result<TabId, PlatformError> {
        let tab = self.next_tab.get();
        self.next_tab.set(tab + 1);
        self.record(format!("open tab {} at {}", tab, url));
        Ok(tab)
    }

    async fn close_tab(&self, tab: TabId) -> Result<(), PlatformError> {
        if self.closed.borrow().contains(&tab) {
            return Err(PlatformError::TabNotFound(tab));
        }
        self.closed.borrow_mut().push(tab);
        self.record(format!("close tab {}", tab));
        Ok(())
    }

    async fn open_popup(&self) -> Result<(), PlatformError> {
        Err(PlatformError::PopupUnavailable("no browser toolbar in the console".to_string()))
    }
}
