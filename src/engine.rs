//! Engine assembly and lifecycle
//!
//! The [`Engine`] owns every shared component (HTTP client, node selector,
//! limiters, checkpoint store) and hands them to a pipeline per run. It is
//! constructed explicitly and shut down explicitly; there is no global
//! state, so two engines with different configurations can coexist in one
//! process.

use crate::catalog::{ApiCatalogProvider, CatalogProvider};
use crate::client::ContentClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::limit::{ConcurrencyGate, TokenBucket};
use crate::models::{BookResult, FetchOptions, FetchState};
use crate::node::{NodeCandidate, NodeCatalog, NodeProber, NodeSelector};
use crate::pipeline::FetchPipeline;
use crate::storage::CheckpointStore;
use crate::utils::error::EngineError;
use crate::utils::retry::RetryConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The content acquisition engine
pub struct Engine {
    config: Config,
    client: Arc<ContentClient>,
    selector: Arc<NodeSelector>,
    bucket: Arc<TokenBucket>,
    gate: ConcurrencyGate,
    store: Arc<CheckpointStore>,
    provider: Arc<dyn CatalogProvider>,
    shutdown: CancellationToken,
}

impl Engine {
    /// Build an engine from validated configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate().map_err(|e| Error::Config(e.to_string()))?;

        let client = Arc::new(ContentClient::new(&config.network)?);
        let node_catalog = Arc::new(NodeCatalog::new(&config.nodes.endpoints));
        let prober = NodeProber::new(Arc::clone(&client));
        let selector = Arc::new(NodeSelector::new(node_catalog, prober));
        let bucket = Arc::new(TokenBucket::new(
            config.limits.burst_capacity,
            config.limits.rate_limit,
        ));
        let gate = ConcurrencyGate::new(config.limits.max_concurrent_requests);
        let store = Arc::new(CheckpointStore::new(config.checkpoint.dir.clone()));

        let provider = Arc::new(ApiCatalogProvider::new(
            Arc::clone(&client),
            Arc::clone(&selector),
            Arc::clone(&bucket),
            RetryConfig::new(config.limits.max_retries),
        ));

        Ok(Self {
            config,
            client,
            selector,
            bucket,
            gate,
            store,
            provider,
            shutdown: CancellationToken::new(),
        })
    }

    /// Build an engine with a substitute catalog source (test seam)
    pub fn with_provider(config: Config, provider: Arc<dyn CatalogProvider>) -> Result<Self> {
        let mut engine = Self::new(config)?;
        engine.provider = provider;
        Ok(engine)
    }

    /// Acquire one book end to end
    ///
    /// Resumes from an existing checkpoint when one exists. The checkpoint
    /// is removed only after an unrestricted run acquires every expected
    /// chapter; a partial or cancelled run keeps it for the next resume.
    pub async fn run(&self, book_id: &str, options: FetchOptions) -> Result<BookResult> {
        let mut options = options;
        if options.cancel.is_none() {
            options.cancel = Some(self.shutdown.child_token());
        }

        let catalog = self.provider.fetch_catalog(book_id).await?;

        let state = self
            .store
            .load_state(book_id, &catalog)
            .await
            .map_err(|e| EngineError::Checkpoint(e.to_string()))?
            .unwrap_or_else(FetchState::new);

        let pipeline = FetchPipeline::new(
            Arc::clone(&self.client),
            Arc::clone(&self.selector),
            Arc::clone(&self.bucket),
            self.gate.clone(),
            Arc::clone(&self.store),
            self.config.limits.clone(),
        );

        let (result, _state) = pipeline.run(&catalog, &options, state).await?;

        if result.missing_indices.is_empty() && !options.is_restricted() {
            self.store
                .delete(book_id)
                .await
                .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        }

        info!(
            book_id,
            chapters = result.chapters.len(),
            percent = result.completeness_percent,
            "Run finished"
        );

        Ok(result)
    }

    /// Probe all configured nodes and return their fresh snapshots
    pub async fn probe_nodes(&self) -> Vec<NodeCandidate> {
        self.selector.reselect(false).await;
        self.selector.candidates().await
    }

    /// Pin one node as the active endpoint for subsequent runs
    pub async fn pin_node(&self, base_url: &str) {
        self.selector.pin(base_url).await;
    }

    /// List book ids with a checkpoint on disk
    pub async fn list_checkpoints(&self) -> Result<Vec<String>> {
        self.store
            .list()
            .await
            .map_err(|e| Error::Engine(EngineError::Checkpoint(e.to_string())))
    }

    /// Discard a book's checkpoint, forcing the next run to start fresh
    pub async fn clear_checkpoint(&self, book_id: &str) -> Result<()> {
        self.store
            .delete(book_id)
            .await
            .map_err(|e| Error::Engine(EngineError::Checkpoint(e.to_string())))
    }

    /// Signal every in-flight run to stop at the next safe point
    pub fn close(&self) {
        info!("Engine shutting down");
        self.shutdown.cancel();
    }
}
