//! Management router end to end over a file credential store.
//!
//! Container work goes to a small engine that accepts everything, so the
//! routes, status mapping and JSON bodies are what is under test.

#![allow(clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use dispatch_cli::application::ports::{
    BuildContextSource, ContainerDetails, ContainerInfo, ContainerRuntime, ContainerSpec,
    NetworkProbe, ProcessInspector, StopOutcome,
};
use dispatch_cli::application::services::management::ManagementService;
use dispatch_cli::application::services::orchestrator::{
    Orchestrator, OrchestratorPorts, OrchestratorSettings,
};
use dispatch_cli::domain::adapter::MailpileAdapter;
use dispatch_cli::domain::port_pool::PortPool;
use dispatch_cli::http::management::{ManagerState, router};
use dispatch_cli::infra::credentials::FileCredentialStore;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

// ── Engine fake ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct AcceptingEngine {
    next_id: AtomicU32,
}

#[async_trait]
impl ContainerRuntime for AcceptingEngine {
    async fn image_exists(&self, _tag: &str) -> Result<bool> {
        Ok(true)
    }

    async fn build_image(&self, _tag: &str, _context: Bytes) -> Result<()> {
        Ok(())
    }

    async fn list_containers(&self, _all: bool, _labels: &[String]) -> Result<Vec<ContainerInfo>> {
        Ok(Vec::new())
    }

    async fn create_container(&self, _spec: &ContainerSpec) -> Result<String> {
        Ok(format!("c{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn start_container(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn wait_container(&self, _id: &str) -> Result<i64> {
        Ok(0)
    }

    async fn stop_container(&self, _id: &str, _grace: Duration) -> Result<StopOutcome> {
        Ok(StopOutcome::Graceful)
    }

    async fn kill_container(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn remove_container(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn inspect_container(&self, _id: &str) -> Result<ContainerDetails> {
        Ok(ContainerDetails::default())
    }
}

struct EmptyContext;

#[async_trait]
impl BuildContextSource for EmptyContext {
    async fn build_context(&self, _app_name: &str) -> Result<Bytes> {
        Ok(Bytes::new())
    }
}

struct NoProcesses;

#[async_trait]
impl ProcessInspector for NoProcesses {
    async fn resident_memory(&self, _pid: u32) -> Option<u64> {
        None
    }
}

struct ClosedPorts;

#[async_trait]
impl NetworkProbe for ClosedPorts {
    async fn check_tcp_connectivity(&self, _host: &str, _port: u16) -> Result<bool> {
        Ok(false)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn app(root: &Path) -> Router {
    let ports = OrchestratorPorts {
        containers: Arc::new(AcceptingEngine::default()),
        build_context: Arc::new(EmptyContext),
        processes: Arc::new(NoProcesses),
        probe: Arc::new(ClosedPorts),
    };
    let settings = OrchestratorSettings {
        root_path: root.to_path_buf(),
        ..OrchestratorSettings::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(
        ports,
        Arc::new(MailpileAdapter),
        PortPool::new(5000, 5010),
        settings,
    ));
    let credentials = Arc::new(FileCredentialStore::new(root));
    router(ManagerState {
        service: Arc::new(ManagementService::new(orchestrator, credentials)),
    })
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

fn send_json(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn add(app: &Router, name: &str, password: &str) -> StatusCode {
    let (status, _) = call(
        app,
        send_json("POST", "/agents", &json!({ "name": name, "password": password })),
    )
    .await;
    status
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_is_ok() {
    let dir = tempfile::tempdir().expect("tempdir");
    let response = app(dir.path()).oneshot(get("/health")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn added_agent_is_listed_and_described() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());

    let (status, created) = call(
        &app,
        send_json("POST", "/agents", &json!({ "name": "bob", "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created, json!({ "name": "bob", "state": "stopped" }));
    assert_eq!(add(&app, "alice", "pw").await, StatusCode::CREATED);

    let (status, list) = call(&app, get("/agents")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!({ "agents": ["alice", "bob"] }));

    let (status, agent) = call(&app, get("/agents/alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agent, json!({ "name": "alice", "state": "stopped" }));
    assert!(dir.path().join("alice").join("credentials.json").exists());
}

#[tokio::test]
async fn duplicate_and_invalid_names_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());
    add(&app, "alice", "pw").await;

    assert_eq!(add(&app, "alice", "other").await, StatusCode::CONFLICT);
    assert_eq!(add(&app, "Not Valid", "pw").await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_agent_is_404_with_error_body() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());

    let (status, body) = call(&app, get("/agents/mallory")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().expect("message").contains("mallory"));
}

#[tokio::test]
async fn authenticate_checks_the_stored_digest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());
    add(&app, "alice", "s3cret").await;

    let (ok, _) = call(
        &app,
        send_json("POST", "/agents/alice/authenticate", &json!({ "password": "s3cret" })),
    )
    .await;
    let (wrong, _) = call(
        &app,
        send_json("POST", "/agents/alice/authenticate", &json!({ "password": "nope" })),
    )
    .await;
    let (unknown, _) = call(
        &app,
        send_json("POST", "/agents/bob/authenticate", &json!({ "password": "x" })),
    )
    .await;

    assert_eq!(ok, StatusCode::NO_CONTENT);
    assert_eq!(wrong, StatusCode::FORBIDDEN);
    assert_eq!(unknown, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn idle_agent_runtime_is_stopped_without_port() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());
    add(&app, "alice", "pw").await;

    let (status, runtime) = call(&app, get("/agents/alice/runtime")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(runtime, json!({ "state": "stopped" }));
}

#[tokio::test]
async fn stopping_an_idle_agent_is_404() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());
    add(&app, "alice", "pw").await;

    let (status, _) = call(
        &app,
        send_json("PUT", "/agents/alice/state", &json!({ "state": "stopped" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn starting_returns_starting_right_away() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());
    add(&app, "alice", "pw").await;

    let (status, runtime) = call(
        &app,
        send_json("PUT", "/agents/alice/state", &json!({ "state": "running" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(runtime, json!({ "state": "starting" }));
}

#[tokio::test]
async fn unknown_target_state_is_a_client_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(dir.path());
    add(&app, "alice", "pw").await;

    let response = app
        .oneshot(send_json(
            "PUT",
            "/agents/alice/state",
            &json!({ "state": "paused" }),
        ))
        .await
        .expect("response");

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn memory_report_without_agents_is_zero() {
    let dir = tempfile::tempdir().expect("tempdir");

    let (status, report) = call(&app(dir.path()), get("/stats/memory_usage")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total_usage"], 0);
    assert_eq!(report["average_usage"], 0);
    assert_eq!(report["agents"], json!([]));
}
