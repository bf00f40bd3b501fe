//! HTTP API tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use dockhand::server::serve::router;
use dockhand::server::state::ServerState;

use crate::fakes::Harness;

fn app(harness: &Harness) -> Router {
    router(Arc::new(ServerState::new(
        harness.context.coordinator.clone(),
    )))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn create(app: &Router) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/workloads",
        Some(json!({
            "name": "shop",
            "repository_url": "https://git.example.com/acme/shop.git",
            "compose_files": ["docker-compose.yml"],
            "auth": { "http": { "username": "deploy", "token": "s3cret" } }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    serde_json::from_str(&body).unwrap()
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new();
    let (status, body) = send(&app(&harness), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_create_hides_credentials() {
    let harness = Harness::new();
    let app = app(&harness);
    let created = create(&app).await;

    assert_eq!(created["branch"], "main");
    assert_eq!(created["status"], "stopped");
    assert_eq!(created["credentials"], "http");
    assert!(!created.to_string().contains("s3cret"));

    let (status, body) = send(&app, Method::GET, "/workloads", None).await;
    assert_eq!(status, StatusCode::OK);
    let list: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], created["id"]);
}

#[tokio::test]
async fn test_validation_and_missing_workloads() {
    let harness = Harness::new();
    let app = app(&harness);

    let (status, body) = send(
        &app,
        Method::POST,
        "/workloads",
        Some(json!({
            "name": "",
            "repository_url": "https://git.example.com/acme/shop.git",
            "compose_files": ["docker-compose.yml"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("name is required"));

    let (status, _) = send(&app, Method::GET, "/workloads/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/workloads/nope/deploy", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clone_failure_is_explained() {
    let harness = Harness::new();
    harness.git.fail_clone();

    let (status, body) = send(
        &app(&harness),
        Method::POST,
        "/workloads",
        Some(json!({
            "name": "shop",
            "repository_url": "https://git.example.com/acme/shop.git",
            "compose_files": ["docker-compose.yml"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Authentication with the repository failed"));
}

#[tokio::test]
async fn test_deploy_streams_events() {
    let harness = Harness::new();
    let app = app(&harness);
    let id = create(&app).await["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/workloads/{}/deploy?pull=false", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: info\ndata: Creating containers"));
    assert!(body.contains("event: stdout"));
    assert_eq!(body.matches("event: success").count(), 1);
    assert_eq!(harness.git.pulls(), 0);

    let (_, body) = send(&app, Method::GET, &format!("/workloads/{}", id), None).await;
    let workload: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(workload["status"], "running");

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/workloads/{}/deployments", id),
        None,
    )
    .await;
    let deployments: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(deployments.len(), 1);
    assert_eq!(deployments[0]["status"], "completed");
}

#[tokio::test]
async fn test_update_stop_and_delete() {
    let harness = Harness::new();
    let app = app(&harness);
    let id = create(&app).await["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/workloads/{}", id),
        Some(json!({ "auto_deploy": true, "auth": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let updated: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(updated["auto_deploy"], true);
    assert!(updated["credentials"].is_null());

    let (status, body) = send(&app, Method::POST, &format!("/workloads/{}/stop", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: success\ndata: Workload stopped"));

    let (status, _) = send(&app, Method::DELETE, &format!("/workloads/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, &format!("/workloads/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_inspection_endpoints() {
    let harness = Harness::new();
    let app = app(&harness);
    let id = create(&app).await["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::GET, &format!("/workloads/{}/logs?tail=10", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let logs: Value = serde_json::from_str(&body).unwrap();
    assert!(logs["stdout"].as_str().unwrap().starts_with("logs "));

    let (status, body) = send(&app, Method::GET, &format!("/workloads/{}/status", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let stack: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(stack["state"], "stopped");

    let (status, _) = send(&app, Method::GET, &format!("/workloads/{}/config", id), None).await;
    assert_eq!(status, StatusCode::OK);
}
