//! Shared helpers for integration tests: mock content nodes and fixtures

#![allow(dead_code)]

use chaekbo::config::{Config, NodeEndpoint};
use serde_json::json;
use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SEARCH_PATH: &str = "/api/search";
pub const FULL_PATH: &str = "/api/book/full";
pub const CATALOG_PATH: &str = "/api/book/catalog";
pub const CHAPTER_PATH: &str = "/api/chapter";

/// Mount a passing health probe on a mock node
pub async fn mount_health(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code": 0, "data": []}"#))
        .mount(server)
        .await;
}

/// Mount a catalog of `(id, title, index)` entries for a book
pub async fn mount_catalog(server: &MockServer, book_id: &str, entries: &[(&str, &str, usize)]) {
    let data: Vec<_> = entries
        .iter()
        .map(|(id, title, index)| json!({"id": id, "title": title, "index": index}))
        .collect();

    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("book", book_id))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"code": 0, "data": data})),
        )
        .mount(server)
        .await;
}

/// Mount a successful enveloped chapter response
pub async fn mount_chapter(server: &MockServer, book_id: &str, id: &str, content: &str) {
    Mock::given(method("GET"))
        .and(path(CHAPTER_PATH))
        .and(query_param("book", book_id))
        .and(query_param("id", id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"content": content}
        })))
        .mount(server)
        .await;
}

/// Build a bulk map body padded past the minimum plausible size
pub fn bulk_map_body(pairs: &[(&str, &str)]) -> String {
    let mut map = serde_json::Map::new();
    for (i, (id, content)) in pairs.iter().enumerate() {
        // Pad the first entry so the whole body clears the size floor
        let content = if i == 0 {
            format!("{content}{}", " ".repeat(2048))
        } else {
            content.to_string()
        };
        map.insert(id.to_string(), json!(content));
    }
    json!({"code": 0, "data": map}).to_string()
}

/// Engine configuration aimed at the given mock nodes, tuned for test speed
pub fn engine_config(checkpoint_dir: &Path, nodes: &[(&MockServer, bool)]) -> Config {
    let mut config = Config::default();
    config.checkpoint.dir = checkpoint_dir.to_path_buf();
    config.limits.rate_limit = 1000.0;
    config.limits.burst_capacity = 100.0;
    config.limits.flush_interval = 1;
    config.nodes.endpoints = nodes
        .iter()
        .map(|(server, bulk)| NodeEndpoint {
            base_url: server.uri(),
            supports_bulk: *bulk,
        })
        .collect();
    config
}
