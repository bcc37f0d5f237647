//! Error types shared by the quota store and the page monitor.

/// Failure of the persistent key-value backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt state record: {0}")]
    Corrupt(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a windowing/tab operation.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Tab {0} not found")]
    TabNotFound(crate::types::TabId),
    #[error("Failed to create tab for {url}: {reason}")]
    TabCreate { url: String, reason: String },
    #[error("Popup unavailable: {0}")]
    PopupUnavailable(String),
}

/// Error raised while the quota store services a request.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("Unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

/// Failure of a request sent from a page to the quota store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessagingError {
    /// The extension runtime was reloaded while the page stayed attached.
    /// Irrecoverable until the page reloads.
    #[error("Extension context invalidated")]
    ContextInvalidated,
    #[error("No response within {0} ms")]
    Timeout(u64),
    #[error("Channel error: {0}")]
    Channel(String),
    #[error("Quota store error: {0}")]
    Remote(String),
    #[error("Unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

impl MessagingError {
    /// Classify a raw platform error message the way the browser reports a
    /// detached extension context.
    pub fn from_platform_message(message: &str) -> Self {
        if message.contains("Extension context invalidated")
            || message.contains("Invalid extension")
            || message.contains("Extension context")
        {
            Self::ContextInvalidated
        } else {
            Self::Channel(message.to_string())
        }
    }
}
