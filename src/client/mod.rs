//! Pooled HTTP client for the content API
//!
//! One `ContentClient` is owned by the engine and passed explicitly to every
//! component that issues requests, preserving connection reuse without
//! hidden per-task sessions. Transport failures and status codes are
//! classified into typed `FetchError` variants at this boundary.

pub mod response;

use crate::config::NetworkConfig;
use crate::utils::error::FetchError;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

/// Cheap health-probe endpoint
pub const SEARCH_PATH: &str = "/api/search";

/// Whole-book bulk retrieval endpoint
pub const FULL_PATH: &str = "/api/book/full";

/// Chapter catalog endpoint
pub const CATALOG_PATH: &str = "/api/book/catalog";

/// Primary per-chapter endpoint
pub const CHAPTER_PATH: &str = "/api/chapter";

/// Secondary per-chapter endpoint serving the raw text body
pub const CHAPTER_RAW_PATH: &str = "/api/chapter/raw";

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// HTTP client shared by probing, catalog and content fetching
pub struct ContentClient {
    client: Client,
    user_agent_override: Option<String>,
}

impl ContentClient {
    /// Create a client from network configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the underlying client cannot be built.
    pub fn new(config: &NetworkConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            user_agent_override: config.user_agent.clone(),
        })
    }

    /// GET a JSON document, classifying failures into typed errors
    pub async fn get_json(
        &self,
        base_url: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, FetchError> {
        let body = self.get_text(base_url, path, params).await?;
        serde_json::from_str(&body)
            .map_err(|e| FetchError::InvalidShape(format!("not JSON: {e}")))
    }

    /// GET a raw body, classifying failures into typed errors
    pub async fn get_text(
        &self,
        base_url: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<String, FetchError> {
        let response = self.send(base_url, path, params).await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to read body: {e}")))
    }

    async fn send(
        &self,
        base_url: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Response, FetchError> {
        let url = format!("{}{path}", base_url.trim_end_matches('/'));

        let result = self
            .client
            .get(&url)
            .headers(self.build_headers())
            .query(params)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                match classify_status(status) {
                    None => Ok(response),
                    Some(err) => Err(err),
                }
            }
            Err(e) if e.is_timeout() => Err(FetchError::Timeout),
            Err(e) if e.is_connect() => {
                Err(FetchError::Transient(format!("connection failed: {e}")))
            }
            Err(e) => Err(FetchError::Http(e)),
        }
    }

    /// Build browser-like headers with a rotating User-Agent
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        match &self.user_agent_override {
            Some(ua) => {
                if let Ok(value) = HeaderValue::from_str(ua) {
                    headers.insert(USER_AGENT, value);
                }
            }
            None => {
                headers.insert(USER_AGENT, HeaderValue::from_static(random_user_agent()));
            }
        }

        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain;q=0.9, */*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9,ko-KR;q=0.8,zh-CN;q=0.7"),
        );
        headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );

        headers
    }
}

/// Map an HTTP status to a typed error; `None` means the response is usable
fn classify_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(FetchError::RateLimited)
    } else if status.is_client_error() {
        Some(FetchError::NodeIncapable(status.as_u16()))
    } else {
        Some(FetchError::Transient(format!("HTTP {}", status.as_u16())))
    }
}

fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK).is_none());
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Some(FetchError::RateLimited)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST),
            Some(FetchError::NodeIncapable(400))
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND),
            Some(FetchError::NodeIncapable(404))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Some(FetchError::Transient(_))
        ));
    }

    #[test]
    fn test_user_agent_rotation() {
        let mut agents = std::collections::HashSet::new();
        for _ in 0..100 {
            let agent = random_user_agent();
            assert!(USER_AGENTS.contains(&agent));
            agents.insert(agent);
        }
        assert!(agents.len() > 1, "User agents should rotate");
    }

    #[test]
    fn test_client_creation() {
        let config = Config::default();
        assert!(ContentClient::new(&config.network).is_ok());
    }

    #[test]
    fn test_override_user_agent_header() {
        let mut config = Config::default();
        config.network.user_agent = Some("chaekbo-test/1.0".into());
        let client = ContentClient::new(&config.network).unwrap();

        let headers = client.build_headers();
        assert_eq!(
            headers.get(USER_AGENT).unwrap().to_str().unwrap(),
            "chaekbo-test/1.0"
        );
        assert!(headers.contains_key(ACCEPT));
    }
}
