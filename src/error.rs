use thiserror::Error;

use crate::http::FetchError;

/// Errors raised by the catalog, hashing and remote layers
#[derive(Debug, Error)]
pub enum Error {
    /// Remote request failed after classification/retry
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// Existing sidecar belongs to a different remote version
    #[error("New metadata id ({new_id}) does not match old metadata id ({old_id})")]
    VersionMismatch { new_id: String, old_id: String },

    /// Hashing has been switched off for this deployment
    #[error("Hashing is disabled. This feature requires hashing; enable `hashing.enabled` to use it.")]
    HashingDisabled,

    /// Malformed model file or remote payload
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unknown model type: {0}")]
    UnknownModelType(String),

    /// A required argument was empty or unusable
    #[error("{0}")]
    MissingInput(String),
}

impl Error {
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Error::VersionMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
