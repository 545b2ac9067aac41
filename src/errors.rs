use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebClawError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scan error: {0}")]
    Scan(String),

    #[error("Stale element reference: [{element_id}] is not in the current observation")]
    StaleReference { element_id: u32 },

    #[error("Oracle parse error: {0}")]
    OracleParse(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Marker error: {0}")]
    Marker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Task cancelled: {0}")]
    Cancelled(String),
}

/// Typed failure returned by `BrowserSession` action operations.
///
/// `PageCrashed` is the only fatal sub-kind; the rest are recorded as failed
/// steps and the loop recovers through a fresh scan.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("element [{0}] not found on page")]
    ElementNotFound(u32),

    #[error("navigation timeout: {0}")]
    NavigationTimeout(String),

    #[error("page crashed: {0}")]
    PageCrashed(String),

    #[error("{0}")]
    Generic(String),
}

impl DispatchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DispatchError::PageCrashed(_))
    }
}

pub type WebClawResult<T> = Result<T, WebClawError>;
