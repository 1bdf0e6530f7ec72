//! API integration tests for derivative retrieval and error handling.
//!
//! Tests verify:
//! - Region, size, rotation, quality and format applied end to end
//! - Version-specific grammar at the HTTP boundary
//! - Error status codes and JSON bodies
//! - info.json, health and conditional requests

use axum::body::Body;
use axum::http::{header as h, Request, StatusCode};
use image::{ColorType, GenericImageView};

use super::test_utils::{
    body_bytes, body_json, decode, header, image_uri, is_gif, is_png, is_valid_jpeg, TestServer,
    API,
};

// =============================================================================
// Basic Retrieval
// =============================================================================

#[tokio::test]
async fn test_full_image_as_png() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "default.png"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/png"));
    assert!(header(&response, "cache-control")
        .unwrap()
        .starts_with("public, max-age="));
    assert!(header(&response, "etag").is_some());

    let body = body_bytes(response).await;
    assert!(is_png(&body));
    assert_eq!(decode(&body).dimensions(), (100, 200));
}

#[tokio::test]
async fn test_jpeg_and_gif_output() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "default.jpg"))
        .await;
    assert_eq!(header(&response, "content-type"), Some("image/jpeg"));
    assert!(is_valid_jpeg(&body_bytes(response).await));

    let response = server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "default.gif"))
        .await;
    assert_eq!(header(&response, "content-type"), Some("image/gif"));
    assert!(is_gif(&body_bytes(response).await));
}

#[tokio::test]
async fn test_missing_extension_defaults_to_jpeg() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "default"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/jpeg"));
}

#[tokio::test]
async fn test_v1_native_quality() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v1", "cat-01", "full", "full", "0", "native.png"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(decode(&body_bytes(response).await).dimensions(), (100, 200));
}

#[tokio::test]
async fn test_nested_identifier_is_percent_decoded() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "collection%2Fdog-02", "full", "full", "0", "default.png"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(decode(&body_bytes(response).await).dimensions(), (40, 30));
}

// =============================================================================
// Geometry
// =============================================================================

#[tokio::test]
async fn test_pixel_region() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "cat-01", "10,20,30,40", "full", "0", "default.png"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let image = decode(&body_bytes(response).await);
    assert_eq!(image.dimensions(), (30, 40));
    // Gradient encodes coordinates: top-left of the crop is (10, 20)
    let pixel = image.to_rgb8().get_pixel(0, 0).0;
    assert_eq!((pixel[0], pixel[1]), (10, 20));
}

#[tokio::test]
async fn test_region_clipped_at_edge() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "cat-01", "80,180,50,50", "full", "0", "default.png"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(decode(&body_bytes(response).await).dimensions(), (20, 20));
}

#[tokio::test]
async fn test_percent_region_and_size() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "small", "pct:0,0,50,50", "pct:50", "0", "default.png"))
        .await;
    assert_eq!(decode(&body_bytes(response).await).dimensions(), (25, 25));

    let response = server
        .get(&image_uri("v2", "square", "pct:0,0,50,50", "pct:50", "0", "default.png"))
        .await;
    assert_eq!(decode(&body_bytes(response).await).dimensions(), (50, 50));
}

#[tokio::test]
async fn test_size_forms() {
    let server = TestServer::new();
    let cases = [
        ("50,", (50, 100)),
        (",50", (25, 50)),
        ("30,30", (30, 30)),
        ("!50,50", (25, 50)),
    ];

    for (size, expected) in cases {
        let response = server
            .get(&image_uri("v2", "cat-01", "full", size, "0", "default.png"))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "size {}", size);
        assert_eq!(
            decode(&body_bytes(response).await).dimensions(),
            expected,
            "size {}",
            size
        );
    }
}

#[tokio::test]
async fn test_quarter_rotation_swaps_dimensions() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "cat-01", "full", "full", "90", "default.png"))
        .await;

    assert_eq!(decode(&body_bytes(response).await).dimensions(), (200, 100));
}

#[tokio::test]
async fn test_arbitrary_rotation_expands_canvas() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "square", "full", "full", "45", "default.png"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let (w, h) = decode(&body_bytes(response).await).dimensions();
    assert!(w > 200 && h > 200, "got {}x{}", w, h);
}

#[tokio::test]
async fn test_arbitrary_rotation_keeps_gray_source_gray() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "gray", "full", "full", "45", "default.png"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let image = decode(&body_bytes(response).await);
    assert_eq!(image.color(), ColorType::L8);
    assert!(image.width() > 50);
}

#[tokio::test]
async fn test_mirror_flips_horizontally() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "cat-01", "full", "full", "!0", "default.png"))
        .await;

    let image = decode(&body_bytes(response).await).to_rgb8();
    // Red channel counts x; after the flip the left column is x = 99
    assert_eq!(image.get_pixel(0, 0).0[0], 99);
}

// =============================================================================
// Quality
// =============================================================================

#[tokio::test]
async fn test_gray_quality_on_color_source() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "gray.png"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(decode(&body_bytes(response).await).color(), ColorType::L8);
}

#[tokio::test]
async fn test_bitonal_on_rgba_source() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "alpha", "full", "full", "0", "bitonal.png"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let image = decode(&body_bytes(response).await).to_luma8();
    assert!(image.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
}

#[tokio::test]
async fn test_color_on_gray_source_rejected() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "gray", "full", "full", "0", "color.png"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error"], "unsupported_quality");
    assert_eq!(error["status"], 400);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_malformed_size_names_the_field() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "cat-01", "full", "huge", "0", "default.png"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error"], "malformed_parameter");
    assert!(error["message"].as_str().unwrap().contains("size"));
}

#[tokio::test]
async fn test_v2_features_rejected_under_v1() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v1", "cat-01", "full", "full", "!90", "native.png"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server
        .get(&image_uri("v1", "cat-01", "full", "full", "0", "default.png"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .get(&image_uri("v1", "cat-01", "full", "full", "0", "gray.png"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_version_rejected() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v9", "cat-01", "full", "full", "0", "default.png"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["message"]
        .as_str()
        .unwrap()
        .contains("version"));
}

#[tokio::test]
async fn test_unknown_identifier_not_found() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "no-such-image", "full", "full", "0", "default.png"))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "not_found");
    assert_eq!(server.loader.load_count(), 0);
}

#[tokio::test]
async fn test_path_traversal_not_found() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "..%2Fetc%2Fpasswd", "full", "full", "0", "default.png"))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_region_outside_image_rejected_before_load() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "cat-01", "500,500,10,10", "full", "0", "default.png"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_geometry");
    assert_eq!(server.loader.load_count(), 0);
}

#[tokio::test]
async fn test_pdf_fails_as_encoding_error() {
    let server = TestServer::new();

    let response = server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "default.pdf"))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "encoding_error");
    assert_eq!(server.loader.load_count(), 0);
}

#[tokio::test]
async fn test_wrong_segment_count_not_routed() {
    let server = TestServer::new();

    let response = server
        .get(&format!("{}/v2/cat-01/full/full/default.png", API))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Conditional Requests
// =============================================================================

#[tokio::test]
async fn test_if_none_match_returns_304() {
    let server = TestServer::new();
    let uri = image_uri("v2", "cat-01", "full", "50,", "0", "default.png");

    let response = server.get(&uri).await;
    let etag = header(&response, "etag").unwrap().to_string();
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    let request = Request::builder()
        .uri(&uri)
        .header(h::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let response = server.send(request).await;

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header(&response, "etag"), Some(etag.as_str()));
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_etag_equal_for_equivalent_requests() {
    let server = TestServer::new();

    let a = server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "default.jpg"))
        .await;
    let b = server
        .get(&image_uri("v2", "cat-01", "0,0,100,200", "100,200", "360", "default.jpeg"))
        .await;

    assert_eq!(header(&a, "etag"), header(&b, "etag"));
}

// =============================================================================
// info.json and health
// =============================================================================

#[tokio::test]
async fn test_info_json_v2() {
    let server = TestServer::new();

    let response = server.get(&format!("{}/v2/cat-01/info.json", API)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("application/json"));
    let info = body_json(response).await;
    assert_eq!(info["@context"], "http://iiif.io/api/image/2/context.json");
    assert_eq!(info["@id"], format!("{}/v2/cat-01", API));
    assert_eq!(info["width"], 100);
    assert_eq!(info["height"], 200);
    assert_eq!(info["protocol"], "http://iiif.io/api/image");
}

#[tokio::test]
async fn test_info_json_v1_gray_source() {
    let server = TestServer::new();

    let response = server.get(&format!("{}/v1/gray/info.json", API)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let info = body_json(response).await;
    assert_eq!(info["width"], 50);
    assert_eq!(
        info["qualities"],
        serde_json::json!(["native", "grey", "bitonal"])
    );
}

#[tokio::test]
async fn test_info_json_does_not_decode() {
    let server = TestServer::new();

    let response = server.get(&format!("{}/v2/square/info.json", API)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.loader.load_count(), 0);
    assert_eq!(server.loader.probe_count(), 1);
}

#[tokio::test]
async fn test_info_json_unknown_identifier() {
    let server = TestServer::new();

    let response = server.get(&format!("{}/v2/missing/info.json", API)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_reports_cache_stats() {
    let server = TestServer::new();

    server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "default.png"))
        .await;
    let response = server.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["cache"]["entries"], 1);
    assert_eq!(health["cache"]["misses"], 1);
}
