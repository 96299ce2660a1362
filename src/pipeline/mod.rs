//! The acquisition pipeline
//!
//! One run moves through an explicit state machine: bulk retrieval is tried
//! first when the whole book was requested, remaining chapters are fetched
//! concurrently, completeness is analyzed, gaps are repaired in bounded
//! passes and the final artifact is order-checked. Every state transition
//! is logged so an interrupted run can be diagnosed from its trail.

use crate::analyze;
use crate::client::response::{classify_bulk, ApiEnvelope, BulkResponse};
use crate::client::{ContentClient, CHAPTER_PATH, CHAPTER_RAW_PATH, FULL_PATH};
use crate::config::LimitsConfig;
use crate::limit::{ConcurrencyGate, TokenBucket};
use crate::models::{BookCatalog, BookResult, Chapter, FetchOptions, FetchState};
use crate::node::NodeSelector;
use crate::reassemble;
use crate::storage::CheckpointStore;
use crate::utils::error::{EngineError, FetchError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fixed delay before retrying a generic transient failure
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Base delay after an explicit rate-limit signal, doubled per attempt
const RATE_LIMIT_BASE: Duration = Duration::from_secs(2);

/// Ceiling for all retry backoff
const BACKOFF_MAX: Duration = Duration::from_secs(15);

/// Bulk retrieval modes, tried in order of decreasing structure
const BULK_MODES: &[&str] = &["map", "txt"];

/// Phases of one acquisition run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    NodeReady,
    BulkAttempt,
    BulkSuccess,
    BulkFallback,
    ChapterFetch,
    Analyze,
    Repair(u32),
    OrderCheck,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::NodeReady => write!(f, "node_ready"),
            Self::BulkAttempt => write!(f, "bulk_attempt"),
            Self::BulkSuccess => write!(f, "bulk_success"),
            Self::BulkFallback => write!(f, "bulk_fallback"),
            Self::ChapterFetch => write!(f, "chapter_fetch"),
            Self::Analyze => write!(f, "analyze"),
            Self::Repair(pass) => write!(f, "repair_{pass}"),
            Self::OrderCheck => write!(f, "order_check"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Drives one book through bulk retrieval, chapter fetching and repair
pub struct FetchPipeline {
    client: Arc<ContentClient>,
    selector: Arc<NodeSelector>,
    bucket: Arc<TokenBucket>,
    gate: ConcurrencyGate,
    store: Arc<CheckpointStore>,
    limits: LimitsConfig,
}

impl FetchPipeline {
    /// Assemble a pipeline from the engine's shared components
    pub fn new(
        client: Arc<ContentClient>,
        selector: Arc<NodeSelector>,
        bucket: Arc<TokenBucket>,
        gate: ConcurrencyGate,
        store: Arc<CheckpointStore>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            client,
            selector,
            bucket,
            gate,
            store,
            limits,
        }
    }

    /// Run the full acquisition for one book
    ///
    /// `state` carries resumed progress; chapters whose ids are already in
    /// the downloaded set are never fetched again. Returns the final
    /// artifact together with the end-of-run state so the caller can decide
    /// checkpoint retention.
    pub async fn run(
        &self,
        catalog: &BookCatalog,
        options: &FetchOptions,
        mut state: FetchState,
    ) -> Result<(BookResult, FetchState), EngineError> {
        let cancel = options.cancel.clone().unwrap_or_default();
        let mut phase = PipelineState::Init;

        self.transition(&mut phase, PipelineState::NodeReady);
        if self.selector.current(false).await.is_none() {
            return Err(EngineError::NoNodeAvailable);
        }

        // Bulk covers the whole book, so a restricted or resumed run goes
        // straight to per-chapter fetching.
        if !options.is_restricted() && state.is_empty() {
            self.transition(&mut phase, PipelineState::BulkAttempt);
            match self.bulk_attempt(catalog, &cancel).await {
                Some(chapters) => {
                    for chapter in chapters {
                        state.record(chapter);
                    }
                    self.save(catalog, &state).await?;
                    self.transition(&mut phase, PipelineState::BulkSuccess);
                }
                None => self.transition(&mut phase, PipelineState::BulkFallback),
            }
        }

        self.transition(&mut phase, PipelineState::ChapterFetch);
        let targets = self.remaining_targets(catalog, options, &state);
        self.fetch_chapters(catalog, targets, &cancel, &mut state)
            .await?;

        self.transition(&mut phase, PipelineState::Analyze);
        let mut report = analyze::analyze(catalog, &state, |i| options.includes(i));

        let mut pass = 0;
        while !report.is_complete() && pass < self.limits.repair_passes {
            pass += 1;
            self.transition(&mut phase, PipelineState::Repair(pass));

            let targets: Vec<Chapter> = report
                .missing_indices
                .iter()
                .filter_map(|i| catalog.by_index(*i).cloned())
                .collect();
            self.fetch_chapters(catalog, targets, &cancel, &mut state)
                .await?;

            report = analyze::analyze(catalog, &state, |i| options.includes(i));
        }

        self.transition(&mut phase, PipelineState::OrderCheck);
        if !report.order_defects.is_empty() {
            warn!(
                defects = report.order_defects.len(),
                "Gaps remain in the final chapter sequence"
            );
        }
        let result = analyze::into_result(&state, &report);

        self.transition(&mut phase, PipelineState::Done);
        Ok((result, state))
    }

    fn transition(&self, phase: &mut PipelineState, next: PipelineState) {
        info!(from = %phase, to = %next, "Pipeline transition");
        *phase = next;
    }

    /// Catalog stubs still needing content, within the requested scope
    fn remaining_targets(
        &self,
        catalog: &BookCatalog,
        options: &FetchOptions,
        state: &FetchState,
    ) -> Vec<Chapter> {
        catalog
            .chapters
            .iter()
            .filter(|stub| options.includes(stub.index))
            .filter(|stub| !state.is_downloaded(&stub.id))
            .filter(|stub| !state.chapters.get(&stub.index).is_some_and(|c| c.has_content()))
            .cloned()
            .collect()
    }

    // ========================================================================
    // Bulk retrieval
    // ========================================================================

    /// Try whole-book retrieval; `None` means fall back to chapter fetching
    async fn bulk_attempt(
        &self,
        catalog: &BookCatalog,
        cancel: &CancellationToken,
    ) -> Option<Vec<Chapter>> {
        let node = match self.selector.current(true).await {
            Some(node) => node,
            None => return None,
        };

        if !node.bulk_verified() {
            debug!(node = %node.base_url, "Selected node lacks verified bulk capability");
            return None;
        }

        for &mode in BULK_MODES {
            if cancel.is_cancelled() {
                return None;
            }

            match self.bulk_mode(&node.base_url, catalog, mode).await {
                Ok(chapters) => {
                    info!(mode, chapters = chapters.len(), "Bulk retrieval succeeded");
                    return Some(chapters);
                }
                Err(e) => {
                    debug!(mode, error = %e, "Bulk mode failed, trying next");
                }
            }
        }

        None
    }

    /// One bulk mode with bounded retries on transient failures
    async fn bulk_mode(
        &self,
        base_url: &str,
        catalog: &BookCatalog,
        mode: &str,
    ) -> Result<Vec<Chapter>, FetchError> {
        let mut attempt = 0;
        loop {
            let _permit = self.gate.admit().await;
            self.bucket.acquire().await;

            let params = [("id", catalog.book_id.as_str()), ("format", mode)];
            let result = self
                .client
                .get_text(base_url, FULL_PATH, &params)
                .await
                .and_then(|body| classify_bulk(&body));

            match result {
                Ok(BulkResponse::Map(map)) => return Ok(assemble_from_map(catalog, &map)?),
                Ok(BulkResponse::Text(blob)) => {
                    return reassemble::reassemble(&blob, catalog)
                        .map_err(|e| FetchError::InvalidShape(e.to_string()))
                }
                Err(e) if e.is_retryable() && attempt < self.limits.max_retries => {
                    attempt += 1;
                    let delay = exponential_delay(attempt);
                    warn!(mode, attempt, error = %e, "Bulk attempt failed, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ========================================================================
    // Per-chapter fetching
    // ========================================================================

    /// Fetch the target chapters concurrently, collecting results over a
    /// channel into the single mutable state
    async fn fetch_chapters(
        &self,
        catalog: &BookCatalog,
        targets: Vec<Chapter>,
        cancel: &CancellationToken,
        state: &mut FetchState,
    ) -> Result<(), EngineError> {
        if targets.is_empty() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            self.save(catalog, state).await?;
            return Err(EngineError::Cancelled);
        }

        info!(chapters = targets.len(), "Fetching chapters");

        let (tx, mut rx) = mpsc::channel::<Result<Chapter, (usize, FetchError)>>(targets.len());

        for stub in targets {
            let tx = tx.clone();
            let fetcher = ChapterFetcher {
                client: Arc::clone(&self.client),
                selector: Arc::clone(&self.selector),
                bucket: Arc::clone(&self.bucket),
                gate: self.gate.clone(),
                max_retries: self.limits.max_retries,
                cancel: cancel.clone(),
            };
            let book_id = catalog.book_id.clone();

            tokio::spawn(async move {
                let index = stub.index;
                let result = fetcher.fetch(&book_id, stub).await;
                // The run outliving the receiver only happens on abort
                let _ = tx.send(result.map_err(|e| (index, e))).await;
            });
        }
        drop(tx);

        let mut since_flush = 0usize;
        while let Some(outcome) = rx.recv().await {
            match outcome {
                Ok(chapter) => {
                    debug!(index = chapter.index, id = %chapter.id, "Chapter acquired");
                    state.record(chapter);
                    since_flush += 1;
                    if since_flush >= self.limits.flush_interval {
                        self.save(catalog, state).await?;
                        since_flush = 0;
                    }
                }
                Err((index, FetchError::Cancelled)) => {
                    debug!(index, "Chapter fetch cancelled");
                }
                Err((index, e)) => {
                    warn!(index, error = %e, "Chapter fetch failed");
                }
            }
        }

        self.save(catalog, state).await?;

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    async fn save(&self, catalog: &BookCatalog, state: &FetchState) -> Result<(), EngineError> {
        self.store
            .save_state(&catalog.book_id, state)
            .await
            .map_err(|e| EngineError::Checkpoint(e.to_string()))
    }
}

/// Everything one spawned chapter task needs, cheap to clone per task
struct ChapterFetcher {
    client: Arc<ContentClient>,
    selector: Arc<NodeSelector>,
    bucket: Arc<TokenBucket>,
    gate: ConcurrencyGate,
    max_retries: u32,
    cancel: CancellationToken,
}

impl ChapterFetcher {
    /// Fetch one chapter with retries, re-resolving the node each attempt
    async fn fetch(&self, book_id: &str, stub: Chapter) -> Result<Chapter, FetchError> {
        let mut attempt = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let node = self
                .selector
                .current(false)
                .await
                .ok_or_else(|| FetchError::Transient("no node available".into()))?;

            let result = {
                let _permit = self.gate.admit().await;
                self.bucket.acquire().await;
                self.attempt_once(&node.base_url, book_id, &stub).await
            };

            match result {
                Ok(chapter) => return Ok(chapter),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    if matches!(e, FetchError::Timeout | FetchError::Transient(_)) {
                        self.selector.invalidate().await;
                    }
                    let delay = chapter_retry_delay(attempt, matches!(e, FetchError::RateLimited));
                    debug!(
                        index = stub.index,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Chapter attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => return Err(FetchError::MaxRetriesExceeded),
                Err(e) => return Err(e),
            }
        }
    }

    /// One attempt: enveloped endpoint first, raw-text endpoint second
    async fn attempt_once(
        &self,
        base_url: &str,
        book_id: &str,
        stub: &Chapter,
    ) -> Result<Chapter, FetchError> {
        let params = [("book", book_id), ("id", stub.id.as_str())];

        match self.client.get_json(base_url, CHAPTER_PATH, &params).await {
            Ok(value) => {
                let envelope = ApiEnvelope::from_value(&value);
                if envelope.is_rate_limited() {
                    return Err(FetchError::RateLimited);
                }
                if envelope.is_ok() {
                    if let Some(content) = envelope.chapter_content() {
                        return Ok(filled(stub, content));
                    }
                }
                // Unusable envelope; the raw endpoint may still serve it
            }
            Err(FetchError::NodeIncapable(_)) | Err(FetchError::InvalidShape(_)) => {}
            Err(e) => return Err(e),
        }

        let body = self
            .client
            .get_text(base_url, CHAPTER_RAW_PATH, &params)
            .await?;
        let content = body.trim();
        if content.is_empty() {
            return Err(FetchError::InvalidShape("empty chapter body".into()));
        }

        Ok(filled(stub, content.to_string()))
    }
}

fn filled(stub: &Chapter, content: String) -> Chapter {
    Chapter {
        id: stub.id.clone(),
        title: stub.title.clone(),
        index: stub.index,
        content,
    }
}

/// Chapter retry policy: a short fixed delay for generic transients,
/// capped exponential backoff when the node explicitly throttled us
fn chapter_retry_delay(attempt: u32, rate_limited: bool) -> Duration {
    if rate_limited {
        RATE_LIMIT_BASE
            .saturating_mul(1 << attempt.saturating_sub(1).min(4))
            .min(BACKOFF_MAX)
    } else {
        TRANSIENT_RETRY_DELAY
    }
}

/// Doubling backoff for bulk retries, capped at [`BACKOFF_MAX`]
fn exponential_delay(attempt: u32) -> Duration {
    TRANSIENT_RETRY_DELAY
        .saturating_mul(1 << attempt.min(10))
        .min(BACKOFF_MAX)
}

/// Build chapters from a bulk id-to-content map
///
/// A map that matches no catalog id is an invalid shape; partial matches
/// are fine, the repair loop fills what bulk missed.
fn assemble_from_map(
    catalog: &BookCatalog,
    map: &std::collections::HashMap<String, String>,
) -> Result<Vec<Chapter>, FetchError> {
    let chapters: Vec<Chapter> = catalog
        .chapters
        .iter()
        .filter_map(|stub| {
            map.get(&stub.id)
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(|c| filled(stub, c.to_string()))
        })
        .collect();

    if chapters.is_empty() {
        return Err(FetchError::InvalidShape(
            "bulk map matched no catalog id".into(),
        ));
    }

    Ok(chapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn catalog_of(n: usize) -> BookCatalog {
        let chapters = (0..n)
            .map(|i| Chapter::stub(format!("c{i}"), format!("Chapter {}", i + 1), i))
            .collect();
        BookCatalog::new("book-1", chapters)
    }

    #[test]
    fn test_assemble_from_map_partial_match() {
        let catalog = catalog_of(3);
        let mut map = HashMap::new();
        map.insert("c0".to_string(), "alpha".to_string());
        map.insert("c2".to_string(), "gamma".to_string());
        map.insert("unrelated".to_string(), "noise".to_string());

        let chapters = assemble_from_map(&catalog, &map).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].index, 0);
        assert_eq!(chapters[1].index, 2);
        assert_eq!(chapters[1].content, "gamma");
    }

    #[test]
    fn test_assemble_from_map_no_match_is_invalid() {
        let catalog = catalog_of(2);
        let mut map = HashMap::new();
        map.insert("x".to_string(), "noise".to_string());

        assert!(matches!(
            assemble_from_map(&catalog, &map),
            Err(FetchError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_assemble_from_map_skips_empty_content() {
        let catalog = catalog_of(2);
        let mut map = HashMap::new();
        map.insert("c0".to_string(), "  ".to_string());
        map.insert("c1".to_string(), "text".to_string());

        let chapters = assemble_from_map(&catalog, &map).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].index, 1);
    }

    #[test]
    fn test_retry_delays() {
        // Transients wait a short fixed interval
        assert_eq!(chapter_retry_delay(1, false), TRANSIENT_RETRY_DELAY);
        assert_eq!(chapter_retry_delay(5, false), TRANSIENT_RETRY_DELAY);

        // Rate-limit backoff doubles and caps
        assert_eq!(chapter_retry_delay(1, true), Duration::from_secs(2));
        assert_eq!(chapter_retry_delay(2, true), Duration::from_secs(4));
        assert_eq!(chapter_retry_delay(10, true), BACKOFF_MAX);

        assert_eq!(exponential_delay(1), Duration::from_secs(1));
        assert_eq!(exponential_delay(10), BACKOFF_MAX);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::BulkFallback.to_string(), "bulk_fallback");
        assert_eq!(PipelineState::Repair(2).to_string(), "repair_2");
    }
}
