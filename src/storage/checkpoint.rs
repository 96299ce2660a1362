//! Resumable per-book checkpoints
//!
//! Two artifacts are kept per book id: the downloaded-id list (the resume
//! contract: an id present here is never fetched again) and the acquired
//! chapter map keyed by catalog index. Both are JSON and written atomically
//! via a temp file plus rename, so a crash mid-write leaves the previous
//! checkpoint intact.

use crate::models::{BookCatalog, Chapter, FetchState};
use crate::utils::sanitize_id;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persisted form of one acquired chapter
///
/// The remote id is deliberately not stored here; on resume it is
/// re-derived from the catalog by index, so stale ids from a prior catalog
/// revision cannot leak into a new run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub title: String,
    pub content: String,
}

/// File-backed checkpoint storage, one pair of artifacts per book id
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Create a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist the current acquisition state for a book
    pub async fn save_state(&self, book_id: &str, state: &FetchState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create checkpoint dir: {}", self.dir.display()))?;

        let mut ids: Vec<&String> = state.downloaded_ids.iter().collect();
        ids.sort();
        write_atomic(&self.downloaded_path(book_id), &ids).await?;

        let records: BTreeMap<usize, ChapterRecord> = state
            .chapters
            .iter()
            .map(|(index, chapter)| {
                (
                    *index,
                    ChapterRecord {
                        title: chapter.title.clone(),
                        content: chapter.content.clone(),
                    },
                )
            })
            .collect();
        write_atomic(&self.chapters_path(book_id), &records).await?;

        debug!(
            book_id,
            downloaded = state.downloaded_ids.len(),
            chapters = state.chapters.len(),
            "Checkpoint saved"
        );

        Ok(())
    }

    /// Load a previous run's state, rebuilding chapter ids from the catalog
    ///
    /// Returns `None` when no checkpoint exists for the book. A chapter
    /// record whose index no longer appears in the catalog is dropped with
    /// a warning.
    pub async fn load_state(&self, book_id: &str, catalog: &BookCatalog) -> Result<Option<FetchState>> {
        let downloaded_path = self.downloaded_path(book_id);
        let chapters_path = self.chapters_path(book_id);

        if !downloaded_path.exists() && !chapters_path.exists() {
            return Ok(None);
        }

        let mut state = FetchState::new();

        if downloaded_path.exists() {
            let raw = tokio::fs::read_to_string(&downloaded_path)
                .await
                .with_context(|| format!("Failed to read {}", downloaded_path.display()))?;
            let ids: Vec<String> = serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt checkpoint: {}", downloaded_path.display()))?;
            state.downloaded_ids = ids.into_iter().collect();
        }

        if chapters_path.exists() {
            let raw = tokio::fs::read_to_string(&chapters_path)
                .await
                .with_context(|| format!("Failed to read {}", chapters_path.display()))?;
            let records: BTreeMap<usize, ChapterRecord> = serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt checkpoint: {}", chapters_path.display()))?;

            for (index, record) in records {
                match catalog.by_index(index) {
                    Some(stub) => {
                        state.chapters.insert(
                            index,
                            Chapter {
                                id: stub.id.clone(),
                                title: record.title,
                                index,
                                content: record.content,
                            },
                        );
                    }
                    None => {
                        warn!(book_id, index, "Dropping checkpointed chapter absent from catalog")
                    }
                }
            }
        }

        info!(
            book_id,
            downloaded = state.downloaded_ids.len(),
            chapters = state.chapters.len(),
            "Resumed from checkpoint"
        );

        Ok(Some(state))
    }

    /// Whether any checkpoint artifact exists for a book
    pub fn exists(&self, book_id: &str) -> bool {
        self.downloaded_path(book_id).exists() || self.chapters_path(book_id).exists()
    }

    /// Remove both checkpoint artifacts for a book
    ///
    /// Called only after a fully reconciled run; a partial run keeps its
    /// checkpoint for the next resume.
    pub async fn delete(&self, book_id: &str) -> Result<()> {
        for path in [self.downloaded_path(book_id), self.chapters_path(book_id)] {
            if path.exists() {
                tokio::fs::remove_file(&path)
                    .await
                    .with_context(|| format!("Failed to delete {}", path.display()))?;
            }
        }
        debug!(book_id, "Checkpoint deleted");
        Ok(())
    }

    /// List book ids that have a checkpoint on disk
    pub async fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read {}", self.dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(book_id) = name.strip_suffix(".downloaded.json") {
                ids.push(book_id.to_string());
            }
        }

        ids.sort();
        Ok(ids)
    }

    fn downloaded_path(&self, book_id: &str) -> PathBuf {
        self.dir.join(format!("{}.downloaded.json", sanitize_id(book_id)))
    }

    fn chapters_path(&self, book_id: &str) -> PathBuf {
        self.dir.join(format!("{}.chapters.json", sanitize_id(book_id)))
    }
}

/// Serialize to a temp file in the same directory, then rename over the
/// target so readers never observe a torn write
async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize checkpoint for {}", path.display()))?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to rename {} into place", tmp.display()))?;

    Ok(())
}
