//! End-to-end pipeline tests against mock content nodes

mod common;

use chaekbo::engine::Engine;
use chaekbo::error::Error;
use chaekbo::models::FetchOptions;
use chaekbo::storage::CheckpointStore;
use chaekbo::utils::error::EngineError;
use common::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_bulk_map_with_gap_left_unrepaired() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    mount_catalog(
        &server,
        "b1",
        &[("a", "One", 0), ("b", "Two", 1), ("c", "Three", 2)],
    )
    .await;

    // Bulk map covers chapters a and c; b stays missing because the
    // chapter endpoints are not mounted (404 on both).
    Mock::given(method("GET"))
        .and(path(FULL_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(bulk_map_body(&[("a", "alpha"), ("c", "gamma")])),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = engine_config(dir.path(), &[(&server, true)]);
    let engine = Engine::new(config).unwrap();

    let result = engine.run("b1", FetchOptions::default()).await.unwrap();

    assert_eq!(result.chapters.len(), 2);
    assert_eq!(result.completeness_percent, 66.7);
    assert_eq!(result.missing_indices, vec![1]);
    assert_eq!(result.chapters[0].content, "alpha");
    assert_eq!(result.chapters[1].index, 2);

    // Incomplete run keeps its checkpoint for a later resume
    let store = CheckpointStore::new(dir.path());
    assert!(store.exists("b1"));
}

#[tokio::test]
async fn test_chapter_succeeds_on_third_attempt() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    mount_catalog(&server, "b2", &[("a", "One", 0)]).await;

    // Two transient failures, then success
    Mock::given(method("GET"))
        .and(path(CHAPTER_PATH))
        .and(query_param("id", "a"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_chapter(&server, "b2", "a", "recovered text").await;

    let dir = TempDir::new().unwrap();
    let config = engine_config(dir.path(), &[(&server, false)]);
    let engine = Engine::new(config).unwrap();

    let result = engine.run("b2", FetchOptions::default()).await.unwrap();

    assert_eq!(result.completeness_percent, 100.0);
    assert_eq!(result.chapters[0].content, "recovered text");

    // Fully reconciled run removes its checkpoint
    assert!(!CheckpointStore::new(dir.path()).exists("b2"));
}

#[tokio::test]
async fn test_all_nodes_down_is_fatal() {
    // Port of a started-then-dropped server is very likely closed
    let dead_uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let dir = TempDir::new().unwrap();
    let mut config = engine_config(dir.path(), &[]);
    config.nodes.endpoints = vec![chaekbo::config::NodeEndpoint {
        base_url: dead_uri,
        supports_bulk: false,
    }];
    let engine = Engine::new(config).unwrap();

    let err = engine.run("b3", FetchOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::Engine(EngineError::NoNodeAvailable)));

    // Nothing was fetched, so nothing was checkpointed
    assert!(CheckpointStore::new(dir.path()).list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_range_restriction_skips_bulk() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    mount_catalog(
        &server,
        "b4",
        &[("a", "One", 0), ("b", "Two", 1), ("c", "Three", 2)],
    )
    .await;

    // Bulk would deliver all three chapters; a restricted run must not
    // take that path.
    Mock::given(method("GET"))
        .and(path(FULL_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(bulk_map_body(&[
                ("a", "alpha"),
                ("b", "beta"),
                ("c", "gamma"),
            ])),
        )
        .mount(&server)
        .await;
    mount_chapter(&server, "b4", "a", "alpha").await;
    mount_chapter(&server, "b4", "b", "beta").await;

    let dir = TempDir::new().unwrap();
    let config = engine_config(dir.path(), &[(&server, true)]);
    let engine = Engine::new(config).unwrap();

    let options = FetchOptions {
        range: Some((0, 1)),
        ..Default::default()
    };
    let result = engine.run("b4", options).await.unwrap();

    // Only the requested chapters, and complete within that scope
    assert_eq!(result.chapters.len(), 2);
    assert_eq!(result.completeness_percent, 100.0);
    assert!(result.missing_indices.is_empty());

    // A restricted run never deletes the book's checkpoint
    assert!(CheckpointStore::new(dir.path()).exists("b4"));
}

#[tokio::test]
async fn test_empty_catalog_is_fatal() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    mount_catalog(&server, "b5", &[]).await;

    let dir = TempDir::new().unwrap();
    let config = engine_config(dir.path(), &[(&server, false)]);
    let engine = Engine::new(config).unwrap();

    let err = engine.run("b5", FetchOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::Engine(EngineError::EmptyCatalog(_))));
}

#[tokio::test]
async fn test_bulk_text_blob_reassembled() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    mount_catalog(&server, "b6", &[("a", "Chapter 1: Dawn", 0), ("b", "Chapter 2: Noon", 1)])
        .await;

    // Plain text blob with both titles, padded past the size floor
    let blob = format!(
        "Chapter 1: Dawn\nfirst light{}\nChapter 2: Noon\nhigh sun\n",
        " ".repeat(2048)
    );
    Mock::given(method("GET"))
        .and(path(FULL_PATH))
        .and(query_param("format", "txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(blob))
        .mount(&server)
        .await;
    // The map mode answers with an unusable payload so the pipeline moves
    // on to the text mode.
    Mock::given(method("GET"))
        .and(path(FULL_PATH))
        .and(query_param("format", "map"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("{}{}", json!({"code": 0, "data": []}), " ".repeat(2048))),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = engine_config(dir.path(), &[(&server, true)]);
    let engine = Engine::new(config).unwrap();

    let result = engine.run("b6", FetchOptions::default()).await.unwrap();

    assert_eq!(result.completeness_percent, 100.0);
    assert_eq!(result.chapters[0].content, "first light");
    assert_eq!(result.chapters[1].content, "high sun");
}
