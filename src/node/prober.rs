//! Lightweight node health and capability probing
//!
//! A node may be online at the transport level yet return an HTML
//! interstitial or an application error, so a probe only counts as success
//! when three independent layers agree: HTTP 200, a parseable JSON body,
//! and the application-level success code. Bulk capability is never
//! inferred from the health probe; it requires a second, capability-
//! specific request.

use super::{NodeCandidate, ProbeResult};
use crate::client::response::ApiEnvelope;
use crate::client::{ContentClient, FULL_PATH, SEARCH_PATH};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default per-probe timeout
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Performs health checks against candidate nodes
pub struct NodeProber {
    client: Arc<ContentClient>,
    timeout: Duration,
}

impl NodeProber {
    /// Create a prober sharing the engine's HTTP client
    pub fn new(client: Arc<ContentClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Create a prober with a custom per-probe timeout
    pub fn with_timeout(client: Arc<ContentClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Probe one candidate, producing a fresh snapshot
    pub async fn probe(&self, candidate: &NodeCandidate) -> ProbeResult {
        let start = Instant::now();

        let health = tokio::time::timeout(
            self.timeout,
            self.client
                .get_json(&candidate.base_url, SEARCH_PATH, &[("q", "ping")]),
        )
        .await;

        let value = match health {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                debug!(node = %candidate.base_url, error = %e, "Health probe failed");
                return ProbeResult::down(e.to_string());
            }
            Err(_) => {
                debug!(node = %candidate.base_url, "Health probe timed out");
                return ProbeResult::down("probe timeout");
            }
        };

        let envelope = ApiEnvelope::from_value(&value);
        if !envelope.is_ok() {
            debug!(
                node = %candidate.base_url,
                code = envelope.code,
                "Health probe returned application error"
            );
            return ProbeResult::down(format!("application code {}", envelope.code));
        }

        let latency_ms = start.elapsed().as_millis() as u64;

        // Capability probe only for nodes that declare bulk support;
        // without verification the declared flag stays a hint.
        let verified = if candidate.declared_supports_bulk {
            self.probe_bulk(&candidate.base_url).await
        } else {
            false
        };

        debug!(
            node = %candidate.base_url,
            latency_ms,
            bulk_verified = verified,
            "Node probe succeeded"
        );

        ProbeResult::up(latency_ms, verified)
    }

    /// Capability-specific probe: a bulk-capable node answers the bulk
    /// endpoint with a JSON envelope even for an unknown book id
    async fn probe_bulk(&self, base_url: &str) -> bool {
        let result = tokio::time::timeout(
            self.timeout,
            self.client
                .get_json(base_url, FULL_PATH, &[("id", "0"), ("format", "map")]),
        )
        .await;

        match result {
            Ok(Ok(value)) => value.get("code").is_some(),
            _ => false,
        }
    }
}
