//! Completeness analysis and final order validation
//!
//! Analysis compares acquired chapters against the catalog and produces a
//! fresh [`CompletenessReport`] every pass; nothing is cached between
//! passes, so a repair pass that fills a gap is reflected immediately.

use crate::models::{BookCatalog, BookResult, CompletenessReport, ExportChapter, FetchState};
use tracing::{info, warn};

/// Compare acquired chapters against the expected catalog
///
/// `scope` restricts the expected set, so a deliberately partial run (an
/// index range or explicit subset) is measured against what was actually
/// requested rather than the whole book.
pub fn analyze(
    catalog: &BookCatalog,
    state: &FetchState,
    scope: impl Fn(usize) -> bool,
) -> CompletenessReport {
    let expected: Vec<usize> = catalog
        .chapters
        .iter()
        .map(|c| c.index)
        .filter(|i| scope(*i))
        .collect();

    let mut missing: Vec<usize> = expected
        .iter()
        .copied()
        .filter(|i| !state.chapters.get(i).is_some_and(|c| c.has_content()))
        .collect();
    missing.sort_unstable();

    let acquired: Vec<usize> = expected
        .iter()
        .copied()
        .filter(|i| state.chapters.get(i).is_some_and(|c| c.has_content()))
        .collect();

    // BTreeMap-backed state already yields ascending indices; defects are
    // steps other than +1 between consecutive acquired indices.
    let order_defects: Vec<(usize, usize)> = acquired
        .windows(2)
        .filter(|w| w[1] != w[0] + 1)
        .map(|w| (w[0], w[1]))
        .collect();

    let total_expected = expected.len();
    let total_acquired = acquired.len();
    let completeness_percent = if total_expected == 0 {
        100.0
    } else {
        round1(total_acquired as f64 / total_expected as f64 * 100.0)
    };

    let report = CompletenessReport {
        total_expected,
        total_acquired,
        missing_indices: missing,
        order_defects,
        completeness_percent,
    };

    if report.is_complete() {
        info!(
            acquired = report.total_acquired,
            expected = report.total_expected,
            "Acquisition complete"
        );
    } else {
        warn!(
            acquired = report.total_acquired,
            expected = report.total_expected,
            missing = report.missing_indices.len(),
            percent = report.completeness_percent,
            "Acquisition incomplete"
        );
    }

    report
}

/// Assemble the final ordered artifact from acquisition state
///
/// Chapters are emitted in strictly ascending index order regardless of
/// completion order. A chapter whose catalog title is empty gets a
/// positional fallback title so the artifact never carries a blank heading.
pub fn into_result(state: &FetchState, report: &CompletenessReport) -> BookResult {
    let chapters: Vec<ExportChapter> = state
        .chapters
        .values()
        .filter(|c| c.has_content())
        .map(|c| ExportChapter {
            index: c.index,
            title: if c.title.trim().is_empty() {
                format!("Chapter {}", c.index + 1)
            } else {
                c.title.clone()
            },
            content: c.content.clone(),
        })
        .collect();

    debug_assert!(chapters.windows(2).all(|w| w[0].index < w[1].index));

    BookResult {
        chapters,
        completeness_percent: report.completeness_percent,
        missing_indices: report.missing_indices.clone(),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
