//! Error taxonomy for the resolution pipeline

use std::path::PathBuf;
use std::time::Duration;

/// Result type for resolution operations
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Errors raised while resolving titles, episodes and player URLs
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    /// The browser worker has not finished starting up
    #[error("backend is still initializing")]
    NotReady,

    #[error("challenge page never cleared: {url}")]
    ChallengePageTimeout { url: String },

    #[error("page not found")]
    PageNotFound { url: String },

    /// Every extraction strategy ran and none produced a player URL
    #[error("no iframe found")]
    ExtractionExhausted,

    #[error("malformed cache file {}: {source}", path.display())]
    MalformedCacheFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write cache file {}: {source}", path.display())]
    StorageWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("worker did not answer within {0:?}")]
    WorkerTimeout(Duration),

    #[error("worker is no longer running")]
    WorkerUnavailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ResolveError {
    /// Errors that surface to the caller instead of being recorded as a
    /// failed resolution.
    pub fn is_boundary(&self) -> bool {
        matches!(
            self,
            ResolveError::NotReady | ResolveError::WorkerTimeout(_) | ResolveError::WorkerUnavailable
        )
    }

    /// Wrap a browser runtime failure raised during navigation
    pub fn navigation(err: anyhow::Error) -> Self {
        ResolveError::Navigation(format!("{:#}", err))
    }

    /// Wrap any other browser runtime failure
    pub fn browser(err: anyhow::Error) -> Self {
        ResolveError::Browser(format!("{:#}", err))
    }
}
