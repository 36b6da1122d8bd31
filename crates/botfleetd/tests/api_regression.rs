//! API regression tests.
//!
//! Drives the full router against a bootstrapped controller backed by an
//! in-memory gateway: status, worker listing, manual cycles, host status,
//! and metrics.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use botfleet_api::build_router;
use botfleet_controller::{Controller, ControllerConfig};
use botfleet_gateway::{FakeGateway, HostGateway};
use botfleet_policy::{HourlyCurveConfig, Policy};

async fn test_controller(fake: Arc<FakeGateway>, level: f64) -> Arc<Controller> {
    let gateway: Arc<dyn HostGateway> = fake;
    let mut config = ControllerConfig::new(20);
    config.cycle_period = Duration::from_secs(20);
    let policy = Policy::HourlyCurve(HourlyCurveConfig { table: [level; 24] });
    let controller = Controller::new(config, policy, gateway).with_seed(11);
    controller.bootstrap().await.unwrap();
    Arc::new(controller)
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

async fn post(router: &Router, uri: &str) -> StatusCode {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    router.clone().oneshot(req).await.unwrap().status()
}

#[tokio::test]
async fn status_after_bootstrap() {
    let fake = Arc::new(FakeGateway::uniform(2, 6));
    let router = build_router(test_controller(fake, 0.5).await);

    let (status, body) = get_json(&router, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_workers"], 12);
    assert_eq!(body["data"]["running_count"], 6);
    assert_eq!(body["data"]["hosts"], 2);
    assert_eq!(body["data"]["policy"], "hourly_curve");
}

#[tokio::test]
async fn worker_listing_matches_gateway() {
    let fake = Arc::new(FakeGateway::uniform(2, 3));
    let router = build_router(test_controller(fake.clone(), 0.5).await);

    let (status, body) = get_json(&router, "/api/v1/workers").await;
    assert_eq!(status, StatusCode::OK);

    let running = body["data"]["running"].as_array().unwrap();
    assert_eq!(running.len(), fake.running().len());
    assert_eq!(body["data"]["disabled"].as_array().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn manual_cycle_runs_and_updates_status() {
    let fake = Arc::new(FakeGateway::uniform(1, 10));
    let controller = test_controller(fake.clone(), 1.0).await;
    let router = build_router(controller.clone());

    assert_eq!(post(&router, "/api/v1/cycle").await, StatusCode::ACCEPTED);

    // Let the background cycle ramp through its paced batches.
    tokio::time::sleep(Duration::from_secs(60)).await;

    let (_, body) = get_json(&router, "/api/v1/status").await;
    assert_eq!(body["data"]["cycles_completed"], 1);
    assert_eq!(body["data"]["running_count"], 10);
    assert_eq!(body["data"]["last_cycle"]["started"], 5);
    assert_eq!(fake.running().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn overlapping_manual_cycle_is_conflict() {
    let fake = Arc::new(FakeGateway::uniform(1, 10).with_call_delay(Duration::from_secs(2)));
    let router = build_router(test_controller(fake, 1.0).await);

    assert_eq!(post(&router, "/api/v1/cycle").await, StatusCode::ACCEPTED);
    assert_eq!(post(&router, "/api/v1/cycle").await, StatusCode::CONFLICT);

    let (status, body) = get_json(&router, "/api/v1/workers").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    // Status stays readable while the cycle holds the inventory.
    let (status, body) = get_json(&router, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cycles_rejected"], 1);
}

#[tokio::test]
async fn host_status_routes() {
    let fake = Arc::new(FakeGateway::uniform(3, 2));
    let router = build_router(test_controller(fake, 0.5).await);

    let (status, body) = get_json(&router, "/api/v1/hosts/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["host"], 2);

    let (status, _) = get_json(&router, "/api/v1/hosts/3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_exposition() {
    let fake = Arc::new(FakeGateway::uniform(2, 2));
    let router = build_router(test_controller(fake, 0.5).await);

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("botfleet_workers{state=\"running\"} 2"));
    assert!(text.contains("botfleet_workers_total 4"));
}
