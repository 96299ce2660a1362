// Core data structures for the chaekbo acquisition engine

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tokio_util::sync::CancellationToken;

/// One chapter of a book
///
/// Created as a stub (empty content) when the catalog is fetched; content is
/// filled in exactly once when a fetch for its `id` succeeds. `index` is the
/// book-relative zero-based position and the invariant ordering key for the
/// whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Chapter {
    /// Opaque remote identifier
    pub id: String,

    /// Display title from the catalog
    pub title: String,

    /// Zero-based position within the book
    pub index: usize,

    /// Chapter text; empty until successfully retrieved
    pub content: String,
}

impl Chapter {
    /// Create a content-less stub as produced by a catalog fetch
    pub fn stub(id: impl Into<String>, title: impl Into<String>, index: usize) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            index,
            content: String::new(),
        }
    }

    /// Whether content has been retrieved for this chapter
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// The authoritative ordered list of chapter stubs for a book
///
/// Immutable once fetched for a run. Index values must be unique and
/// contiguous from 0; `validate` enforces this before the pipeline starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookCatalog {
    /// Book identifier the catalog belongs to
    pub book_id: String,

    /// Chapter stubs in catalog order
    pub chapters: Vec<Chapter>,
}

impl BookCatalog {
    /// Create a catalog from chapter stubs
    pub fn new(book_id: impl Into<String>, chapters: Vec<Chapter>) -> Self {
        Self {
            book_id: book_id.into(),
            chapters,
        }
    }

    /// Number of expected chapters
    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    /// Whether the catalog holds no chapters
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Check that indices are unique and contiguous from zero
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = vec![false; self.chapters.len()];
        for chapter in &self.chapters {
            match seen.get_mut(chapter.index) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => return Err(format!("duplicate chapter index {}", chapter.index)),
                None => {
                    return Err(format!(
                        "chapter index {} out of range for {} chapters",
                        chapter.index,
                        self.chapters.len()
                    ))
                }
            }
        }
        Ok(())
    }

    /// Look up a chapter stub by index
    pub fn by_index(&self, index: usize) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.index == index)
    }
}

/// Mutable per-run acquisition state, persisted through the checkpoint store
///
/// Owned exclusively by one pipeline run; concurrent chapter tasks report
/// results over a channel and a single collector mutates this.
#[derive(Debug, Clone, Default)]
pub struct FetchState {
    /// Ids whose content has been successfully retrieved
    pub downloaded_ids: HashSet<String>,

    /// Retrieved chapters keyed by catalog index
    pub chapters: BTreeMap<usize, Chapter>,
}

impl FetchState {
    /// Create an empty state for a fresh run
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a chapter id has already been retrieved (resume contract)
    pub fn is_downloaded(&self, id: &str) -> bool {
        self.downloaded_ids.contains(id)
    }

    /// Record a successfully retrieved chapter
    ///
    /// A later successful fetch of the same id supersedes the earlier entry.
    pub fn record(&mut self, chapter: Chapter) {
        self.downloaded_ids.insert(chapter.id.clone());
        self.chapters.insert(chapter.index, chapter);
    }

    /// Number of chapters with retrieved content
    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    /// Whether nothing has been retrieved yet
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}

/// Result of one completeness analysis pass; recomputed fresh each time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessReport {
    /// Chapters the catalog expects
    pub total_expected: usize,

    /// Chapters actually acquired
    pub total_acquired: usize,

    /// Expected indices with no acquired content, ascending
    pub missing_indices: Vec<usize>,

    /// Non-adjacent steps observed walking acquired indices in order
    pub order_defects: Vec<(usize, usize)>,

    /// Acquired / expected, as a percentage rounded to one decimal
    pub completeness_percent: f64,
}

impl CompletenessReport {
    /// Whether every expected chapter was acquired
    pub fn is_complete(&self) -> bool {
        self.missing_indices.is_empty()
    }
}

/// One chapter in the engine's final ordered artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportChapter {
    pub index: usize,
    pub title: String,
    pub content: String,
}

/// Final artifact of a book run, handed to the exporter
#[derive(Debug, Clone, Serialize)]
pub struct BookResult {
    /// Strictly index-ordered chapter sequence
    pub chapters: Vec<ExportChapter>,

    /// Completeness percentage from the final analysis pass
    pub completeness_percent: f64,

    /// Indices that remained unresolved after all repair passes
    pub missing_indices: Vec<usize>,
}

/// Per-run options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Inclusive index range restriction; disables bulk retrieval
    pub range: Option<(usize, usize)>,

    /// Explicit chapter index subset; disables bulk retrieval
    pub subset: Option<Vec<usize>>,

    /// Run-scoped cancellation signal
    pub cancel: Option<CancellationToken>,
}

impl FetchOptions {
    /// Whether the request covers less than the whole book
    pub fn is_restricted(&self) -> bool {
        self.range.is_some() || self.subset.is_some()
    }

    /// Whether a chapter index is inside the requested scope
    pub fn includes(&self, index: usize) -> bool {
        if let Some((start, end)) = self.range {
            if index < start || index > end {
                return false;
            }
        }
        if let Some(subset) = &self.subset {
            if !subset.contains(&index) {
                return false;
            }
        }
        true
    }
}
