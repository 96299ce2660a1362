//! Unified error type for the crate's public surface
//!
//! Internal components use their own narrow error enums; this type wraps
//! them at the engine boundary so binary and library callers handle one
//! error with a stable category classification.

use crate::utils::error::{EngineError, FetchError, ReassembleError};
use thiserror::Error;

/// Crate-level result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error for the engine's public API
#[derive(Error, Debug)]
pub enum Error {
    /// Per-request retrieval failure
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Run-level failure aborting a book acquisition
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Text blob reassembly failure
    #[error(transparent)]
    Reassemble(#[from] ReassembleError),

    /// Filesystem failure outside the checkpoint store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or unloadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything the other variants cannot express
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used for logging and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport-level trouble; another run may succeed
    Network,

    /// The remote answered with something the engine cannot use
    Protocol,

    /// Local persistence trouble
    Storage,

    /// Caller-side misconfiguration
    Config,

    /// Deliberate cancellation
    Cancelled,

    /// Everything else
    Internal,
}

impl Error {
    /// Classify this error for logging and exit-code mapping
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => match e {
                FetchError::Http(_)
                | FetchError::Timeout
                | FetchError::Transient(_)
                | FetchError::RateLimited
                | FetchError::MaxRetriesExceeded => ErrorCategory::Network,
                FetchError::NodeIncapable(_) | FetchError::InvalidShape(_) => {
                    ErrorCategory::Protocol
                }
                FetchError::Cancelled => ErrorCategory::Cancelled,
            },
            Self::Engine(e) => match e {
                EngineError::NoNodeAvailable => ErrorCategory::Network,
                EngineError::CatalogUnavailable(_)
                | EngineError::EmptyCatalog(_)
                | EngineError::InvalidCatalog(_) => ErrorCategory::Protocol,
                EngineError::Checkpoint(_) => ErrorCategory::Storage,
                EngineError::Cancelled => ErrorCategory::Cancelled,
            },
            Self::Reassemble(_) => ErrorCategory::Protocol,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Protocol,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a fresh run against the same configuration could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        let err: Error = FetchError::RateLimited.into();
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.is_recoverable());

        let err: Error = EngineError::EmptyCatalog("b1".into()).into();
        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert!(!err.is_recoverable());

        let err: Error = EngineError::Cancelled.into();
        assert_eq!(err.category(), ErrorCategory::Cancelled);
        assert!(err.is_recoverable());

        let err = Error::Config("bad rate".into());
        assert_eq!(err.category(), ErrorCategory::Config);
    }
}
