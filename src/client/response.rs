//! Response shape classification
//!
//! The content API is undocumented and occasionally inconsistent, so every
//! decoded body is re-validated here and mapped to a tagged variant
//! immediately after parsing. Downstream code never re-inspects raw JSON.

use crate::utils::error::FetchError;
use serde_json::Value;
use std::collections::HashMap;

/// Application-level success code carried in the `code` field
pub const CODE_OK: i64 = 0;

/// Application-level "too many requests" code
pub const CODE_RATE_LIMITED: i64 = 429;

/// Bodies shorter than this cannot contain a multi-chapter book and are
/// discarded without parsing.
pub const MIN_BULK_BYTES: usize = 1024;

/// Lenient view of the `{code, data}` envelope the API wraps payloads in
///
/// Missing or null fields are treated as absence, never as a crash.
#[derive(Debug, Clone)]
pub struct ApiEnvelope {
    pub code: i64,
    pub data: Value,
}

impl ApiEnvelope {
    /// Parse an envelope from a decoded JSON value
    pub fn from_value(value: &Value) -> Self {
        Self {
            code: value.get("code").and_then(Value::as_i64).unwrap_or(-1),
            data: value.get("data").cloned().unwrap_or(Value::Null),
        }
    }

    /// Parse an envelope from a raw body
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| FetchError::InvalidShape(format!("not JSON: {e}")))?;
        Ok(Self::from_value(&value))
    }

    /// Whether the application-level code signals success
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    /// Whether the application-level code signals throttling
    pub fn is_rate_limited(&self) -> bool {
        self.code == CODE_RATE_LIMITED
    }

    /// Extract `data.content` as a non-empty string
    pub fn chapter_content(&self) -> Option<String> {
        self.data
            .get("content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// The two bulk response shapes the engine recognizes
#[derive(Debug, Clone)]
pub enum BulkResponse {
    /// Per-chapter-id content mapping; the strongest signal
    Map(HashMap<String, String>),

    /// One undivided text blob, routed to the reassembler
    Text(String),
}

/// Classify a bulk retrieval body into one of the recognized shapes
///
/// Anything else is an `InvalidShape` failure and the pipeline falls
/// through to per-chapter fetching.
pub fn classify_bulk(body: &str) -> Result<BulkResponse, FetchError> {
    if body.len() < MIN_BULK_BYTES {
        return Err(FetchError::InvalidShape(format!(
            "body of {} bytes is below the bulk minimum",
            body.len()
        )));
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        // Nodes serving the plain-text mode respond with the raw blob
        Err(_) => return Ok(BulkResponse::Text(body.to_string())),
    };

    let envelope = ApiEnvelope::from_value(&value);
    if envelope.is_rate_limited() {
        return Err(FetchError::RateLimited);
    }

    // Enveloped: classify the data payload
    let payload = if value.get("code").is_some() {
        if !envelope.is_ok() {
            return Err(FetchError::InvalidShape(format!(
                "application code {}",
                envelope.code
            )));
        }
        envelope.data
    } else {
        value
    };

    match payload {
        Value::Object(map) => {
            let chapters: HashMap<String, String> = map
                .into_iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                .collect();

            if chapters.is_empty() {
                Err(FetchError::InvalidShape(
                    "bulk map holds no string-valued chapters".into(),
                ))
            } else {
                Ok(BulkResponse::Map(chapters))
            }
        }
        Value::String(text) if !text.trim().is_empty() => Ok(BulkResponse::Text(text)),
        other => Err(FetchError::InvalidShape(format!(
            "unrecognized bulk payload: {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
