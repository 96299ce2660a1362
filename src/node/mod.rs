//! Content node discovery and selection
//!
//! Several interchangeable endpoint hosts serve the same logical content
//! API with varying availability and capability. This module owns the
//! candidate list ([`NodeCatalog`]), health-checks candidates
//! ([`NodeProber`]) and exposes a ranked "current best" with failover
//! ([`NodeSelector`]).

pub mod prober;
pub mod selector;

pub use prober::NodeProber;
pub use selector::NodeSelector;

use crate::config::NodeEndpoint;
use crate::utils::normalize_base_url;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Immutable snapshot of one probe; a new probe replaces the old snapshot
/// atomically on the candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Whether the node answered the health probe successfully
    pub available: bool,

    /// Round-trip latency of the probe, when available
    pub latency_ms: Option<u64>,

    /// Whether the capability-specific probe confirmed bulk support
    pub verified_supports_bulk: bool,

    /// Failure description for unavailable nodes
    pub error: Option<String>,

    /// When the probe was taken
    pub observed_at: DateTime<Utc>,
}

impl ProbeResult {
    /// Snapshot for a node that answered its health probe
    pub fn up(latency_ms: u64, verified_supports_bulk: bool) -> Self {
        Self {
            available: true,
            latency_ms: Some(latency_ms),
            verified_supports_bulk,
            error: None,
            observed_at: Utc::now(),
        }
    }

    /// Snapshot for a node that failed its health probe
    pub fn down(error: impl Into<String>) -> Self {
        Self {
            available: false,
            latency_ms: None,
            verified_supports_bulk: false,
            error: Some(error.into()),
            observed_at: Utc::now(),
        }
    }
}

/// One candidate endpoint host
///
/// Owned exclusively by [`NodeCatalog`]; other components receive cloned
/// read-only views through the selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCandidate {
    /// Normalized base URL
    pub base_url: String,

    /// Declared capability flag; a hint until verified by probing
    pub declared_supports_bulk: bool,

    /// Most recent probe snapshot
    pub last_probe: Option<ProbeResult>,
}

impl NodeCandidate {
    /// Create a candidate from a configured endpoint
    pub fn new(base_url: &str, declared_supports_bulk: bool) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            declared_supports_bulk,
            last_probe: None,
        }
    }

    /// Whether the last probe found the node available
    pub fn is_available(&self) -> bool {
        self.last_probe.as_ref().is_some_and(|p| p.available)
    }

    /// Whether bulk capability has been verified by a probe
    pub fn bulk_verified(&self) -> bool {
        self.last_probe
            .as_ref()
            .is_some_and(|p| p.verified_supports_bulk)
    }

    /// Latency of the last probe, when available
    pub fn latency_ms(&self) -> Option<u64> {
        self.last_probe.as_ref().and_then(|p| p.latency_ms)
    }
}

/// Static + dynamic list of candidate endpoint hosts
pub struct NodeCatalog {
    candidates: Mutex<Vec<NodeCandidate>>,
    pinned: Mutex<Option<String>>,
}

impl NodeCatalog {
    /// Build the catalog from configured endpoints, de-duplicated by
    /// normalized base URL
    pub fn new(endpoints: &[NodeEndpoint]) -> Self {
        let mut candidates: Vec<NodeCandidate> = Vec::new();
        for endpoint in endpoints {
            let candidate = NodeCandidate::new(&endpoint.base_url, endpoint.supports_bulk);
            if !candidates.iter().any(|c| c.base_url == candidate.base_url) {
                candidates.push(candidate);
            }
        }

        Self {
            candidates: Mutex::new(candidates),
            pinned: Mutex::new(None),
        }
    }

    /// Merge the static list with the pinned active node, if set
    pub async fn list_candidates(&self) -> Vec<NodeCandidate> {
        let mut list = self.candidates.lock().await.clone();

        if let Some(pinned) = self.pinned.lock().await.as_ref() {
            let normalized = normalize_base_url(pinned);
            if !list.iter().any(|c| c.base_url == normalized) {
                list.push(NodeCandidate::new(&normalized, false));
            }
        }

        list
    }

    /// Pin a node as the manually chosen active endpoint
    pub async fn pin(&self, base_url: &str) {
        let normalized = normalize_base_url(base_url);
        tracing::info!(node = %normalized, "Pinning active node");
        *self.pinned.lock().await = Some(normalized);
    }

    /// Clear the manual pin
    pub async fn unpin(&self) {
        *self.pinned.lock().await = None;
    }

    /// Replace a candidate's probe snapshot
    ///
    /// Pinned nodes absent from the static list are added on first probe so
    /// their snapshots are retained too.
    pub async fn record_probe(&self, base_url: &str, result: ProbeResult) {
        let normalized = normalize_base_url(base_url);
        let mut candidates = self.candidates.lock().await;

        match candidates.iter_mut().find(|c| c.base_url == normalized) {
            Some(candidate) => candidate.last_probe = Some(result),
            None => {
                let mut candidate = NodeCandidate::new(&normalized, false);
                candidate.last_probe = Some(result);
                candidates.push(candidate);
            }
        }
    }
}
