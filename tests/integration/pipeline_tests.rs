//! Hook and access gate tests through the HTTP surface.

use std::sync::{Arc, Mutex};

use axum::http::StatusCode;

use iiif_image_server::derivative::{AccessDenied, Hooks, LifecycleEvent};
use iiif_image_server::iiif::ImageRequest;

use super::test_utils::{body_json, image_uri, TestServer, API};

type EventLog = Arc<Mutex<Vec<(LifecycleEvent, String)>>>;

fn recording_hooks() -> (Hooks, EventLog) {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let hooks = Hooks::new().with_observer(move |event: LifecycleEvent, id: &str| {
        sink.lock().unwrap().push((event, id.to_string()));
    });
    (hooks, log)
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let (hooks, log) = recording_hooks();
    let server = TestServer::with_hooks(hooks);

    let response = server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "default.png"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let events: Vec<_> = log.lock().unwrap().iter().map(|(e, _)| *e).collect();
    assert_eq!(
        events,
        vec![
            LifecycleEvent::BeforeProcess,
            LifecycleEvent::AfterValidation,
            LifecycleEvent::AfterProcess,
        ]
    );
    assert!(log.lock().unwrap().iter().all(|(_, id)| id == "cat-01"));
}

#[tokio::test]
async fn test_validation_failure_stops_events() {
    let (hooks, log) = recording_hooks();
    let server = TestServer::with_hooks(hooks);

    let response = server
        .get(&image_uri("v2", "cat-01", "nowhere", "full", "0", "default.png"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let events: Vec<_> = log.lock().unwrap().iter().map(|(e, _)| *e).collect();
    assert_eq!(events, vec![LifecycleEvent::BeforeProcess]);
}

#[tokio::test]
async fn test_gate_short_circuits_with_its_status() {
    let hooks = Hooks::new().with_gate(|request: &ImageRequest| {
        if request.identifier.starts_with("cat") {
            Err(AccessDenied::new(402, "subscription required"))
        } else {
            Ok(())
        }
    });
    let server = TestServer::with_hooks(hooks);

    let response = server
        .get(&image_uri("v2", "cat-01", "full", "full", "0", "default.png"))
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let error = body_json(response).await;
    assert_eq!(error["error"], "access_denied");
    assert!(error["message"]
        .as_str()
        .unwrap()
        .contains("subscription required"));
    assert_eq!(server.loader.probe_count(), 0);

    let response = server
        .get(&image_uri("v2", "square", "full", "full", "0", "default.png"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_gate_applies_to_info_json() {
    let hooks = Hooks::new()
        .with_gate(|_: &ImageRequest| Err::<(), _>(AccessDenied::forbidden("closed")));
    let server = TestServer::with_hooks(hooks);

    let response = server.get(&format!("{}/v2/cat-01/info.json", API)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_gate_sees_raw_parameters() {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let hooks = Hooks::new().with_gate(move |request: &ImageRequest| -> Result<(), AccessDenied> {
        *sink.lock().unwrap() = Some(request.clone());
        Ok(())
    });
    let server = TestServer::with_hooks(hooks);

    server
        .get(&image_uri("v2", "cat-01", "pct:10,10,50,50", "!40,40", "!90", "gray.png"))
        .await;

    let request = seen.lock().unwrap().clone().unwrap();
    assert_eq!(request.region, "pct:10,10,50,50");
    assert_eq!(request.size, "!40,40");
    assert_eq!(request.rotation, "!90");
    assert_eq!(request.quality, "gray");
    assert_eq!(request.format, "png");
}
