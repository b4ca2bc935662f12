//! Error types for the versioning layer

use std::sync::Arc;
use strata_common::KeyError;
use strata_common::types::PointerError;
use strata_log::LogError;
use thiserror::Error;

/// Result type for handle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Handle error
#[derive(Debug, Error)]
pub enum Error {
    /// Key absent or tombstoned at the resolved point in time
    #[error("Key not found in database [{key}]")]
    NotFound { key: String },

    /// Backend failure, passed through unchanged
    #[error(transparent)]
    Storage(#[from] LogError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The one-shot open failed; every waiter sees the same cause. Backend
    /// failures stay reachable through [`Error::storage_error`].
    #[error("open failed: {0}")]
    Open(Arc<Error>),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The other end of a stream went away
    #[error("stream closed: {0}")]
    Closed(String),
}

impl Error {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Open(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    /// Check if this is an invalid argument error
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            Self::InvalidArgument(_) => true,
            Self::Open(inner) => inner.is_invalid_argument(),
            _ => false,
        }
    }

    /// Backend error behind this error, if any
    #[must_use]
    pub fn storage_error(&self) -> Option<&LogError> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Open(inner) => inner.storage_error(),
            _ => None,
        }
    }

    /// Check if this is a backend error
    #[must_use]
    pub fn is_storage(&self) -> bool {
        self.storage_error().is_some()
    }
}

impl From<KeyError> for Error {
    fn from(e: KeyError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<PointerError> for Error {
    fn from(e: PointerError) -> Self {
        Self::Storage(LogError::Corrupt(e.to_string()))
    }
}
