//! Fetching the authoritative chapter catalog
//!
//! The pipeline depends on [`CatalogProvider`] rather than on HTTP
//! directly, so tests can substitute a canned catalog and exercise the
//! fetch machinery without a real catalog endpoint.

use crate::client::{ContentClient, CATALOG_PATH};
use crate::client::response::ApiEnvelope;
use crate::limit::TokenBucket;
use crate::models::{BookCatalog, Chapter};
use crate::node::NodeSelector;
use crate::utils::error::{EngineError, FetchError};
use crate::utils::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Source of the expected chapter list for a book
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Fetch and validate the catalog for one book
    async fn fetch_catalog(&self, book_id: &str) -> Result<BookCatalog, EngineError>;
}

/// HTTP-backed provider using the currently selected node
pub struct ApiCatalogProvider {
    client: Arc<ContentClient>,
    selector: Arc<NodeSelector>,
    bucket: Arc<TokenBucket>,
    retry: RetryConfig,
}

impl ApiCatalogProvider {
    /// Create a provider sharing the engine's client, selector and limiter
    pub fn new(
        client: Arc<ContentClient>,
        selector: Arc<NodeSelector>,
        bucket: Arc<TokenBucket>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client,
            selector,
            bucket,
            retry,
        }
    }

    async fn fetch_once(&self, book_id: &str) -> anyhow::Result<Value> {
        let node = self
            .selector
            .current(false)
            .await
            .ok_or(EngineError::NoNodeAvailable)
            .map_err(anyhow::Error::from)?;

        self.bucket.acquire().await;

        let result = self
            .client
            .get_json(&node.base_url, CATALOG_PATH, &[("book", book_id)])
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                // A live failure voids the cached selection so the retry
                // re-probes and can fail over to another node.
                if e.is_retryable() {
                    self.selector.invalidate().await;
                }
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl CatalogProvider for ApiCatalogProvider {
    async fn fetch_catalog(&self, book_id: &str) -> Result<BookCatalog, EngineError> {
        let value = with_retry_if(
            &self.retry,
            || self.fetch_once(book_id),
            |e| match e.downcast_ref::<FetchError>() {
                Some(fetch) => fetch.is_retryable(),
                // NoNodeAvailable is final within one run
                None => false,
            },
        )
        .await
        .map_err(|e| match e.downcast::<EngineError>() {
            Ok(engine) => engine,
            Err(other) => EngineError::CatalogUnavailable(other.to_string()),
        })?;

        let catalog = parse_catalog(book_id, &value)?;

        if catalog.is_empty() {
            return Err(EngineError::EmptyCatalog(book_id.to_string()));
        }
        catalog
            .validate()
            .map_err(EngineError::InvalidCatalog)?;

        info!(book_id, chapters = catalog.len(), "Catalog fetched");
        Ok(catalog)
    }
}

/// Decode the catalog envelope into chapter stubs
///
/// Entries are read defensively: an id may arrive as a string or a number,
/// and a missing `index` falls back to the entry's array position.
fn parse_catalog(book_id: &str, value: &Value) -> Result<BookCatalog, EngineError> {
    let envelope = ApiEnvelope::from_value(value);
    if !envelope.is_ok() {
        return Err(EngineError::CatalogUnavailable(format!(
            "application code {}",
            envelope.code
        )));
    }

    let entries = envelope
        .data
        .as_array()
        .ok_or_else(|| EngineError::InvalidCatalog("catalog data is not an array".into()))?;

    let mut chapters = Vec::with_capacity(entries.len());
    for (position, entry) in entries.iter().enumerate() {
        let id = match entry.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                debug!(book_id, position, "Skipping catalog entry without id");
                continue;
            }
        };

        let title = entry
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        let index = entry
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(position);

        chapters.push(Chapter::stub(id, title, index));
    }

    Ok(BookCatalog::new(book_id, chapters))
}
