//! Configuration management for the chaekbo engine
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP transport configuration
    pub network: NetworkConfig,

    /// Rate, concurrency and retry limits
    pub limits: LimitsConfig,

    /// Candidate content nodes
    pub nodes: NodesConfig,

    /// Checkpoint persistence configuration
    pub checkpoint: CheckpointConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Connection establishment timeout in seconds; must be shorter than
    /// the total request timeout
    pub connect_timeout_secs: u64,

    /// Total request timeout in seconds
    pub request_timeout_secs: u64,

    /// Fixed User-Agent override; when absent a rotating pool is used
    pub user_agent: Option<String>,
}

/// Rate, concurrency and retry limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Token bucket refill rate (requests per second)
    pub rate_limit: f64,

    /// Token bucket burst capacity
    pub burst_capacity: f64,

    /// Maximum simultaneous in-flight requests
    pub max_concurrent_requests: usize,

    /// Maximum retry attempts per chapter fetch
    pub max_retries: u32,

    /// Maximum gap-repair passes after the main fetch
    pub repair_passes: u32,

    /// Chapters completed between checkpoint flushes
    pub flush_interval: usize,
}

/// One configured candidate node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEndpoint {
    /// Base URL of the node
    pub base_url: String,

    /// Declared (unverified) bulk retrieval capability
    #[serde(default)]
    pub supports_bulk: bool,
}

/// Candidate content nodes
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodesConfig {
    /// Statically configured candidates
    pub endpoints: Vec<NodeEndpoint>,
}

/// Checkpoint persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory for per-book checkpoint artifacts
    pub dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<u64>("CHAEKBO_CONNECT_TIMEOUT") {
            config.network.connect_timeout_secs = v;
        }
        if let Some(v) = env_parse::<u64>("CHAEKBO_REQUEST_TIMEOUT") {
            config.network.request_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("CHAEKBO_USER_AGENT") {
            config.network.user_agent = Some(v);
        }

        if let Some(v) = env_parse::<f64>("CHAEKBO_RATE_LIMIT") {
            config.limits.rate_limit = v;
        }
        if let Some(v) = env_parse::<f64>("CHAEKBO_BURST_CAPACITY") {
            config.limits.burst_capacity = v;
        }
        if let Some(v) = env_parse::<usize>("CHAEKBO_MAX_CONCURRENT_REQUESTS") {
            config.limits.max_concurrent_requests = v;
        }
        if let Some(v) = env_parse::<u32>("CHAEKBO_MAX_RETRIES") {
            config.limits.max_retries = v;
        }
        if let Some(v) = env_parse::<u32>("CHAEKBO_REPAIR_PASSES") {
            config.limits.repair_passes = v;
        }

        if let Ok(v) = std::env::var("CHAEKBO_NODES") {
            config.nodes.endpoints = parse_node_list(&v);
        }

        if let Ok(v) = std::env::var("CHAEKBO_CHECKPOINT_DIR") {
            config.checkpoint.dir = PathBuf::from(v);
        }

        if let Ok(v) = std::env::var("CHAEKBO_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("CHAEKBO_LOG_FORMAT") {
            config.logging.format = v;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_concurrent_requests == 0 {
            anyhow::bail!("max_concurrent_requests must be greater than 0");
        }

        if self.limits.rate_limit <= 0.0 {
            anyhow::bail!("rate_limit must be positive");
        }

        if self.limits.burst_capacity < 1.0 {
            anyhow::bail!("burst_capacity must be at least 1");
        }

        if self.network.connect_timeout_secs >= self.network.request_timeout_secs {
            anyhow::bail!("connect timeout must be shorter than request timeout");
        }

        Ok(())
    }

    /// Get connect timeout as Duration
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.network.connect_timeout_secs)
    }

    /// Get total request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                connect_timeout_secs: 10,
                request_timeout_secs: 30,
                user_agent: None,
            },
            limits: LimitsConfig {
                rate_limit: 2.0,
                burst_capacity: 4.0,
                max_concurrent_requests: 8,
                max_retries: 3,
                repair_passes: 3,
                flush_interval: 20,
            },
            nodes: NodesConfig::default(),
            checkpoint: CheckpointConfig {
                dir: PathBuf::from("data/checkpoints"),
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

/// Parse a comma-separated node list; entries suffixed with `#bulk` declare
/// bulk capability (e.g. `https://a.example#bulk,https://b.example`).
fn parse_node_list(raw: &str) -> Vec<NodeEndpoint> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.strip_suffix("#bulk") {
            Some(base) => NodeEndpoint {
                base_url: base.trim().to_string(),
                supports_bulk: true,
            },
            None => NodeEndpoint {
                base_url: entry.to_string(),
                supports_bulk: false,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_concurrent_requests() {
        let mut config = Config::default();
        config.limits.max_concurrent_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connect_timeout_must_be_shorter() {
        let mut config = Config::default();
        config.network.connect_timeout_secs = 30;
        config.network.request_timeout_secs = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_node_list() {
        let nodes = parse_node_list("https://a.example#bulk, https://b.example ,");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].base_url, "https://a.example");
        assert!(nodes[0].supports_bulk);
        assert_eq!(nodes[1].base_url, "https://b.example");
        assert!(!nodes[1].supports_bulk);
    }

    #[test]
    fn test_timeout_conversion() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }
}
