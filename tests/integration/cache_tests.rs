//! Derivative cache integration tests.
//!
//! Tests verify:
//! - Repeat requests are served from cache without decoding
//! - Equivalent spellings of a request share one entry
//! - Distinct parameters produce distinct entries
//! - Concurrent identical requests decode once
//! - Invalidation drops both metadata and derivatives

use axum::http::StatusCode;

use super::test_utils::{body_bytes, header, image_uri, TestServer};

const HIT: &str = "x-derivative-cache-hit";

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let server = TestServer::new();
    let uri = image_uri("v2", "cat-01", "full", "full", "0", "default.png");

    let first = server.get(&uri).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, HIT), Some("false"));
    let first_body = body_bytes(first).await;

    let second = server.get(&uri).await;
    assert_eq!(header(&second, HIT), Some("true"));
    assert_eq!(body_bytes(second).await, first_body);

    assert_eq!(server.loader.load_count(), 1);
    assert_eq!(server.loader.probe_count(), 1);
}

#[tokio::test]
async fn test_equivalent_requests_share_entry() {
    let server = TestServer::new();

    let canonical = server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "default.jpg"))
        .await;
    assert_eq!(header(&canonical, HIT), Some("false"));

    let spellings = [
        image_uri("v2", "cat-01", "0,0,100,200", "full", "0", "default.jpg"),
        image_uri("v2", "cat-01", "full", "100,200", "0", "default.jpg"),
        image_uri("v2", "cat-01", "full", "100,", "0", "default.jpg"),
        image_uri("v2", "cat-01", "full", "full", "360", "default.jpg"),
        image_uri("v2", "cat-01", "full", "full", "0", "default.jpeg"),
        image_uri("v2", "cat-01", "pct:0,0,100,100", "pct:100", "0.0", "default.jpg"),
    ];
    for uri in &spellings {
        let response = server.get(uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(header(&response, HIT), Some("true"), "{}", uri);
    }

    assert_eq!(server.loader.load_count(), 1);
}

#[tokio::test]
async fn test_distinct_parameters_distinct_entries() {
    let server = TestServer::new();
    let uris = [
        image_uri("v2", "cat-01", "full", "full", "0", "default.png"),
        image_uri("v2", "cat-01", "full", "full", "0", "gray.png"),
        image_uri("v2", "cat-01", "full", "full", "90", "default.png"),
        image_uri("v2", "cat-01", "full", "full", "!0", "default.png"),
        image_uri("v2", "cat-01", "full", "50,", "0", "default.png"),
        image_uri("v2", "cat-01", "full", "full", "0", "default.gif"),
        image_uri("v2", "square", "full", "full", "0", "default.png"),
    ];

    for uri in &uris {
        let response = server.get(uri).await;
        assert_eq!(header(&response, HIT), Some("false"), "{}", uri);
    }

    assert_eq!(server.loader.load_count(), uris.len());
    assert_eq!(server.service.cache_stats().await.unwrap().entries, uris.len());
}

#[tokio::test]
async fn test_versions_cached_separately() {
    let server = TestServer::new();

    server
        .get(&image_uri("v1", "cat-01", "full", "full", "0", "native.png"))
        .await;
    let response = server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "default.png"))
        .await;

    assert_eq!(header(&response, HIT), Some("false"));
    assert_eq!(server.loader.load_count(), 2);
}

#[tokio::test]
async fn test_concurrent_requests_decode_once() {
    let server = TestServer::new();
    let uri = image_uri("v2", "square", "full", "pct:50", "45", "default.png");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let router = server.router.clone();
        let uri = uri.clone();
        handles.push(tokio::spawn(async move {
            use tower::ServiceExt;
            let request = axum::http::Request::builder()
                .uri(uri)
                .body(axum::body::Body::empty())
                .unwrap();
            let response = router.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            body_bytes(response).await
        }));
    }

    let mut bodies = Vec::new();
    for handle in handles {
        bodies.push(handle.await.unwrap());
    }

    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(server.loader.load_count(), 1);
    assert_eq!(server.loader.probe_count(), 1);
}

#[tokio::test]
async fn test_errors_are_not_cached() {
    let server = TestServer::new();

    for _ in 0..2 {
        let response = server
            .get(&image_uri("v2", "gray", "full", "full", "0", "color.png"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    assert_eq!(server.service.cache_stats().await.unwrap().entries, 0);
}

#[tokio::test]
async fn test_invalidate_forces_recompute() {
    let server = TestServer::new();
    let uri = image_uri("v2", "cat-01", "full", "full", "0", "default.png");

    server.get(&uri).await;
    server
        .get(&image_uri("v2", "cat-01", "full", "50,", "0", "default.png"))
        .await;
    server
        .get(&image_uri("v2", "square", "full", "full", "0", "default.png"))
        .await;

    assert_eq!(server.service.invalidate("cat-01").await.unwrap(), 2);

    let response = server.get(&uri).await;
    assert_eq!(header(&response, HIT), Some("false"));
    assert_eq!(server.loader.probe_count(), 3);

    let response = server
        .get(&image_uri("v2", "square", "full", "full", "0", "default.png"))
        .await;
    assert_eq!(header(&response, HIT), Some("true"));
}
