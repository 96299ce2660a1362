//! Splitting an undivided text blob into chapters
//!
//! Some nodes serve a whole book as one text blob with no per-chapter keys.
//! Reassembly locates each catalog title inside the blob (exact
//! line-anchored match first, then a fuzzy pass on the title with its
//! ordinal prefix stripped), slices content between consecutive title
//! positions, and finally re-orders chapters by catalog index so a catalog
//! whose nominal order differs from physical text order still reassembles
//! correctly.

use crate::models::{BookCatalog, Chapter};
use crate::utils::error::ReassembleError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Minimum fraction of catalog titles that must be located in the blob
pub const MATCH_RATIO: f64 = 0.8;

/// Minimum character count of a stripped "core" title worth fuzzy-matching
pub const MIN_CORE_TITLE_LEN: usize = 2;

/// Byte offsets of one located chapter title
#[derive(Debug, Clone, Copy)]
struct TitleMatch {
    catalog_index: usize,
    title_start: usize,
    content_start: usize,
}

/// Split a text blob into chapters using the expected title catalog
///
/// Fails when fewer than [`MATCH_RATIO`] of the catalog titles can be
/// located; the pipeline then falls back to per-chapter fetching for all
/// chapters.
pub fn reassemble(blob: &str, catalog: &BookCatalog) -> Result<Vec<Chapter>, ReassembleError> {
    if blob.trim().is_empty() {
        return Err(ReassembleError::EmptyBlob);
    }

    let lines = index_lines(blob);
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut matches: Vec<TitleMatch> = Vec::new();

    for stub in &catalog.chapters {
        let wanted = stub.title.trim();
        if wanted.is_empty() {
            continue;
        }

        let found = find_exact(&lines, wanted, &claimed)
            .or_else(|| find_fuzzy(&lines, wanted, &claimed));

        match found {
            Some(line_idx) => {
                claimed.insert(line_idx);
                let line = &lines[line_idx];
                matches.push(TitleMatch {
                    catalog_index: stub.index,
                    title_start: line.start,
                    content_start: line.end,
                });
            }
            None => debug!(title = %wanted, index = stub.index, "Title not located in blob"),
        }
    }

    let expected = catalog.len();
    if (matches.len() as f64) < (expected as f64 * MATCH_RATIO) {
        warn!(
            matched = matches.len(),
            expected,
            "Reassembly below match threshold"
        );
        return Err(ReassembleError::InsufficientMatches {
            matched: matches.len(),
            expected,
        });
    }

    // Content spans run between consecutive title positions in the blob
    matches.sort_by_key(|m| m.title_start);

    let mut chapters: Vec<Chapter> = Vec::with_capacity(matches.len());
    for (i, m) in matches.iter().enumerate() {
        let content_end = matches
            .get(i + 1)
            .map(|next| next.title_start)
            .unwrap_or(blob.len());
        let content = blob[m.content_start..content_end].trim();

        let title = catalog
            .by_index(m.catalog_index)
            .map(|s| s.title.clone())
            .unwrap_or_default();

        chapters.push(Chapter {
            id: catalog
                .by_index(m.catalog_index)
                .map(|s| s.id.clone())
                .unwrap_or_default(),
            title,
            index: m.catalog_index,
            content: content.to_string(),
        });
    }

    // Final order follows the catalog, not blob position
    chapters.sort_by_key(|c| c.index);

    Ok(chapters)
}

struct LineSpan<'a> {
    start: usize,
    end: usize,
    trimmed: &'a str,
}

fn index_lines(blob: &str) -> Vec<LineSpan<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0;

    for raw in blob.split_inclusive('\n') {
        let end = offset + raw.len();
        lines.push(LineSpan {
            start: offset,
            end,
            trimmed: raw.trim(),
        });
        offset = end;
    }

    lines
}

fn find_exact(lines: &[LineSpan<'_>], title: &str, claimed: &HashSet<usize>) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .find(|(i, line)| !claimed.contains(i) && line.trimmed == title)
        .map(|(i, _)| i)
}

/// Fuzzy pass: strip the chapter-number/volume prefix from the title and
/// look for the remaining core as a substring, tolerating trailing
/// annotation on the line.
fn find_fuzzy(lines: &[LineSpan<'_>], title: &str, claimed: &HashSet<usize>) -> Option<usize> {
    let core = strip_ordinal_prefix(title);
    if core.chars().count() < MIN_CORE_TITLE_LEN {
        return None;
    }

    lines
        .iter()
        .enumerate()
        .find(|(i, line)| {
            !claimed.contains(i) && !line.trimmed.is_empty() && line.trimmed.contains(core)
        })
        .map(|(i, _)| i)
}

/// Strip a leading ordinal/volume prefix such as "Chapter 12:", "제3화" or
/// "第十二章" from a title
pub fn strip_ordinal_prefix(title: &str) -> &str {
    static PREFIX_RE: OnceLock<Regex> = OnceLock::new();

    let re = PREFIX_RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:chapter|ch\.?|제|第)?\s*[0-9〇零一二两三四五六七八九十百千]+\s*(?:[장화권章节節回話话卷]|[.:：,、-])?\s*",
        )
        .expect("Invalid regex pattern")
    });

    let trimmed = title.trim();
    match re.find(trimmed) {
        Some(m) if m.start() == 0 && m.end() > 0 => trimmed[m.end()..].trim(),
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chapter as Stub;

    fn catalog(titles: &[&str]) -> BookCatalog {
        let chapters = titles
            .iter()
            .enumerate()
            .map(|(i, t)| Stub::stub(format!("c{i}"), *t, i))
            .collect();
        BookCatalog::new("book-1", chapters)
    }

    #[test]
    fn test_strip_ordinal_prefix() {
        assert_eq!(strip_ordinal_prefix("Chapter 12: The Storm"), "The Storm");
        assert_eq!(strip_ordinal_prefix("第十二章 风暴"), "风暴");
        assert_eq!(strip_ordinal_prefix("제3화 폭풍"), "폭풍");
        assert_eq!(strip_ordinal_prefix("12. Storm"), "Storm");
        assert_eq!(strip_ordinal_prefix("Prologue"), "Prologue");
    }

    #[test]
    fn test_round_trip_recovers_content_exactly() {
        let titles = ["Chapter 1: Dawn", "Chapter 2: Noon", "Chapter 3: Dusk"];
        let contents = ["first light", "high sun", "last light"];
        let blob = titles
            .iter()
            .zip(contents.iter())
            .map(|(t, c)| format!("{t}\n{c}\n"))
            .collect::<String>();

        let chapters = reassemble(&blob, &catalog(&titles)).unwrap();

        assert_eq!(chapters.len(), 3);
        for (i, chapter) in chapters.iter().enumerate() {
            assert_eq!(chapter.index, i);
            assert_eq!(chapter.content, contents[i]);
        }
    }

    #[test]
    fn test_fuzzy_match_with_annotated_line() {
        // Blob line has a trailing annotation; exact match fails, the
        // stripped core still matches as a substring.
        let blob = "Chapter 1: Dawn (revised)\nfirst light\nChapter 2: Noon\nhigh sun\n";
        let chapters = reassemble(&blob, &catalog(&["Chapter 1: Dawn", "Chapter 2: Noon"])).unwrap();

        assert_eq!(chapters[0].content, "first light");
        assert_eq!(chapters[1].content, "high sun");
    }

    #[test]
    fn test_catalog_order_overrides_blob_order() {
        // Physical text order is reversed relative to the catalog
        let blob = "Chapter 2: Noon\nhigh sun\nChapter 1: Dawn\nfirst light\n";
        let chapters = reassemble(&blob, &catalog(&["Chapter 1: Dawn", "Chapter 2: Noon"])).unwrap();

        assert_eq!(chapters[0].index, 0);
        assert_eq!(chapters[0].content, "first light");
        assert_eq!(chapters[1].index, 1);
        assert_eq!(chapters[1].content, "high sun");
    }

    #[test]
    fn test_below_threshold_fails() {
        let blob = "Chapter 1: Dawn\nfirst light\nnothing else here\n";
        let result = reassemble(
            &blob,
            &catalog(&[
                "Chapter 1: Dawn",
                "Chapter 2: Noon",
                "Chapter 3: Dusk",
                "Chapter 4: Night",
                "Chapter 5: Midnight",
            ]),
        );

        assert!(matches!(
            result,
            Err(ReassembleError::InsufficientMatches { matched: 1, expected: 5 })
        ));
    }

    #[test]
    fn test_empty_blob_fails() {
        let result = reassemble("   \n  ", &catalog(&["Chapter 1: Dawn"]));
        assert!(matches!(result, Err(ReassembleError::EmptyBlob)));
    }

    #[test]
    fn test_duplicate_titles_claim_distinct_lines() {
        let blob = "Interlude\nfirst\nInterlude\nsecond\n";
        let chapters = reassemble(&blob, &catalog(&["Interlude", "Interlude"])).unwrap();

        assert_eq!(chapters[0].content, "first");
        assert_eq!(chapters[1].content, "second");
    }

    #[test]
    fn test_short_core_title_not_fuzzy_matched() {
        // Core after stripping is a single character; too weak a signal
        let blob = "something with an a inside\ncontent\nChapter 2: Noon\nhigh sun\n";
        let result = reassemble(&blob, &catalog(&["Chapter 1: a", "Chapter 2: Noon"]));

        // Only one of two titles matched (50% < 80%)
        assert!(result.is_err());
    }
}
