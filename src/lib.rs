//! chaekbo - Content Acquisition & Reassembly Engine
//!
//! Downloads complete books from a pool of interchangeable content nodes,
//! preferring one bulk retrieval over hundreds of chapter requests and
//! repairing whatever the bulk path missed.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`node`] - Node discovery, probing and ranked selection
//! - [`limit`] - Token-bucket rate limiting and the concurrency gate
//! - [`client`] - Pooled HTTP client and response classification
//! - [`catalog`] - Chapter catalog retrieval
//! - [`pipeline`] - The bulk-first, chapter-fallback fetch state machine
//! - [`reassemble`] - Splitting undivided text blobs into chapters
//! - [`analyze`] - Completeness analysis and order validation
//! - [`storage`] - Resumable per-book checkpoints
//! - [`engine`] - Component assembly and run lifecycle
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use chaekbo::engine::Engine;
//! use chaekbo::config::Config;
//! use chaekbo::models::FetchOptions;
//!
//! #[tokio::main]
//! async fn main() -> chaekbo::error::Result<()> {
//!     let config = Config::from_env().map_err(chaekbo::error::Error::Other)?;
//!     let engine = Engine::new(config)?;
//!     let result = engine.run("book-42", FetchOptions::default()).await?;
//!     println!("{:.1}% complete", result.completeness_percent);
//!     engine.close();
//!     Ok(())
//! }
//! ```

pub mod analyze;
pub mod catalog;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod limit;
pub mod models;
pub mod node;
pub mod pipeline;
pub mod reassemble;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::Engine;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{BookCatalog, BookResult, Chapter, CompletenessReport, FetchOptions};
    pub use crate::storage::CheckpointStore;
}

// Direct re-exports for convenience
pub use models::{BookCatalog, BookResult, Chapter, CompletenessReport, FetchOptions};
