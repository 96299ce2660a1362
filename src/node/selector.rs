//! Ranked node selection with TTL caching and failover
//!
//! The selector probes all candidates, ranks the survivors and caches the
//! winner for a short TTL. A live-request failure during fetching must
//! invalidate the cache so the next acquisition re-probes (failover). The
//! cache lock covers pure bookkeeping only; probing happens outside it.

use super::{NodeCandidate, NodeCatalog, NodeProber};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Default time-to-live for a cached selection
const DEFAULT_SELECTION_TTL: Duration = Duration::from_secs(60);

struct CachedSelection {
    candidate: NodeCandidate,
    require_bulk: bool,
    selected_at: Instant,
}

/// Exposes the "current best" node with periodic re-verification
pub struct NodeSelector {
    catalog: Arc<NodeCatalog>,
    prober: NodeProber,
    ttl: Duration,
    cached: Mutex<Option<CachedSelection>>,
}

impl NodeSelector {
    /// Create a selector over a node catalog
    pub fn new(catalog: Arc<NodeCatalog>, prober: NodeProber) -> Self {
        Self::with_ttl(catalog, prober, DEFAULT_SELECTION_TTL)
    }

    /// Create a selector with a custom cache TTL
    pub fn with_ttl(catalog: Arc<NodeCatalog>, prober: NodeProber, ttl: Duration) -> Self {
        Self {
            catalog,
            prober,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Get the current best node, re-probing when the cache is stale
    ///
    /// Returns `None` when no candidate is available; callers must treat
    /// that as a hard stop, never as licence to fetch from an unvalidated
    /// URL.
    pub async fn current(&self, require_bulk: bool) -> Option<NodeCandidate> {
        {
            let cached = self.cached.lock().await;
            if let Some(selection) = cached.as_ref() {
                if selection.require_bulk == require_bulk
                    && selection.selected_at.elapsed() < self.ttl
                {
                    return Some(selection.candidate.clone());
                }
            }
        }

        self.reselect(require_bulk).await
    }

    /// Force a fresh probe-and-rank pass, replacing any cached selection
    pub async fn reselect(&self, require_bulk: bool) -> Option<NodeCandidate> {
        let candidates = self.catalog.list_candidates().await;

        let probes = candidates
            .iter()
            .map(|candidate| self.prober.probe(candidate));
        let results = futures::future::join_all(probes).await;

        let mut probed = Vec::with_capacity(candidates.len());
        for (mut candidate, result) in candidates.into_iter().zip(results) {
            self.catalog
                .record_probe(&candidate.base_url, result.clone())
                .await;
            candidate.last_probe = Some(result);
            probed.push(candidate);
        }

        let best = Self::select_best(&probed, require_bulk);
        match &best {
            Some(candidate) => {
                info!(
                    node = %candidate.base_url,
                    latency_ms = ?candidate.latency_ms(),
                    bulk_verified = candidate.bulk_verified(),
                    "Selected content node"
                );
                *self.cached.lock().await = Some(CachedSelection {
                    candidate: candidate.clone(),
                    require_bulk,
                    selected_at: Instant::now(),
                });
            }
            None => {
                warn!("No available content node among candidates");
                *self.cached.lock().await = None;
            }
        }

        best
    }

    /// Rank probed candidates and pick the best available one
    ///
    /// When `require_bulk` is set the bulk-verified subset is preferred,
    /// but an empty subset falls back to the unfiltered available set: a
    /// run is never blocked merely because capability verification failed,
    /// bulk retrieval is simply skipped downstream.
    pub fn select_best(candidates: &[NodeCandidate], require_bulk: bool) -> Option<NodeCandidate> {
        let available: Vec<&NodeCandidate> =
            candidates.iter().filter(|c| c.is_available()).collect();

        let pool: Vec<&NodeCandidate> = if require_bulk {
            let bulk: Vec<&NodeCandidate> = available
                .iter()
                .copied()
                .filter(|c| c.bulk_verified())
                .collect();
            if bulk.is_empty() {
                available
            } else {
                bulk
            }
        } else {
            available
        };

        pool.into_iter()
            .min_by_key(|c| (!c.bulk_verified(), c.latency_ms().unwrap_or(u64::MAX)))
            .cloned()
    }

    /// Current candidate list with the latest recorded probe snapshots
    pub async fn candidates(&self) -> Vec<NodeCandidate> {
        self.catalog.list_candidates().await
    }

    /// Drop the cached selection so the next acquisition re-probes
    ///
    /// Must be called whenever the pinned node fails a live request.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Manually override the active node and force re-selection
    pub async fn pin(&self, base_url: &str) {
        self.catalog.pin(base_url).await;
        self.invalidate().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ProbeResult;

    fn candidate(url: &str, probe: Option<ProbeResult>) -> NodeCandidate {
        let mut c = NodeCandidate::new(url, false);
        c.last_probe = probe;
        c
    }

    #[test]
    fn test_select_best_skips_unavailable() {
        let candidates = vec![
            candidate("https://down.example", Some(ProbeResult::down("refused"))),
            candidate("https://up.example", Some(ProbeResult::up(50, false))),
        ];

        let best = NodeSelector::select_best(&candidates, false).unwrap();
        assert_eq!(best.base_url, "https://up.example");
    }

    #[test]
    fn test_select_best_never_returns_unavailable() {
        let candidates = vec![
            candidate("https://a.example", Some(ProbeResult::down("x"))),
            candidate("https://b.example", None),
        ];
        assert!(NodeSelector::select_best(&candidates, false).is_none());
        assert!(NodeSelector::select_best(&candidates, true).is_none());
        assert!(NodeSelector::select_best(&[], false).is_none());
    }

    #[test]
    fn test_select_best_prefers_lower_latency() {
        let candidates = vec![
            candidate("https://slow.example", Some(ProbeResult::up(300, false))),
            candidate("https://fast.example", Some(ProbeResult::up(20, false))),
        ];

        let best = NodeSelector::select_best(&candidates, false).unwrap();
        assert_eq!(best.base_url, "https://fast.example");
    }

    #[test]
    fn test_select_best_bulk_verified_sorts_first() {
        let candidates = vec![
            candidate("https://fast.example", Some(ProbeResult::up(20, false))),
            candidate("https://bulk.example", Some(ProbeResult::up(300, true))),
        ];

        // Verified capability outranks raw latency
        let best = NodeSelector::select_best(&candidates, false).unwrap();
        assert_eq!(best.base_url, "https://bulk.example");
    }

    #[test]
    fn test_require_bulk_falls_back_when_unverified() {
        let candidates = vec![
            candidate("https://a.example", Some(ProbeResult::up(80, false))),
            candidate("https://b.example", Some(ProbeResult::up(40, false))),
        ];

        // No bulk-verified node exists; the run must not be blocked
        let best = NodeSelector::select_best(&candidates, true).unwrap();
        assert_eq!(best.base_url, "https://b.example");
    }

    #[test]
    fn test_require_bulk_filters_when_verified_exists() {
        let candidates = vec![
            candidate("https://fast.example", Some(ProbeResult::up(10, false))),
            candidate("https://bulk.example", Some(ProbeResult::up(500, true))),
        ];

        let best = NodeSelector::select_best(&candidates, true).unwrap();
        assert_eq!(best.base_url, "https://bulk.example");
    }
}
