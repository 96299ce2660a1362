//! Error types for the chaekbo acquisition engine
//!
//! This module defines the typed errors used throughout the fetch pipeline.
//! Per-request failures are classified into a `FetchError` variant right at
//! the transport boundary so downstream code branches on variants instead of
//! inspecting strings or status codes.

use thiserror::Error;

/// Errors that can occur during a single HTTP retrieval attempt
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP client error (connection setup, protocol failure)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Transient network failure (connection reset, 5xx response)
    #[error("Transient network failure: {0}")]
    Transient(String),

    /// Explicit "too many requests" signal from the node
    #[error("Rate limit exceeded")]
    RateLimited,

    /// 400-class rejection: the node does not support this retrieval mode
    #[error("Node rejected request mode: HTTP {0}")]
    NodeIncapable(u16),

    /// Unparseable or implausibly short response body
    #[error("Invalid response shape: {0}")]
    InvalidShape(String),

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded")]
    MaxRetriesExceeded,

    /// The run was cancelled while this fetch was pending
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt against the same node/mode is worthwhile
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transient(_) | Self::RateLimited => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::NodeIncapable(_)
            | Self::InvalidShape(_)
            | Self::MaxRetriesExceeded
            | Self::Cancelled => false,
        }
    }
}

/// Run-level errors that abort an entire book acquisition
#[derive(Error, Debug)]
pub enum EngineError {
    /// No candidate node passed its health probe
    #[error("No content node available")]
    NoNodeAvailable,

    /// The chapter catalog could not be fetched
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The catalog was fetched but contains no chapters
    #[error("Catalog for book '{0}' is empty")]
    EmptyCatalog(String),

    /// Catalog indices are not unique and contiguous from zero
    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Checkpoint persistence failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// The run was cancelled before producing a result
    #[error("Run cancelled")]
    Cancelled,
}

/// Errors from splitting an undivided text blob into chapters
#[derive(Error, Debug)]
pub enum ReassembleError {
    /// Text blob was empty or whitespace-only
    #[error("Empty text blob")]
    EmptyBlob,

    /// Too few catalog titles were located in the blob
    #[error("Matched {matched} of {expected} catalog titles, below threshold")]
    InsufficientMatches { matched: usize, expected: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::RateLimited.is_retryable());
        assert!(FetchError::Transient("reset".into()).is_retryable());

        assert!(!FetchError::NodeIncapable(400).is_retryable());
        assert!(!FetchError::InvalidShape("html interstitial".into()).is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = FetchError::NodeIncapable(404);
        assert!(err.to_string().contains("404"));

        let err = EngineError::EmptyCatalog("b42".into());
        assert!(err.to_string().contains("b42"));
    }
}
