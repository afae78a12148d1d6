//! Unit tests for request dispatch: start-on-demand, bounded wait, relay.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dispatch_cli::application::ports::{BackendResponse, ForwardRequest, Forwarder};
use dispatch_cli::application::services::proxy::{DispatchOutcome, ProxyService};
use dispatch_cli::domain::error::{ForwardError, ManagementError};
use dispatch_cli::domain::startup::WaitPolicy;
use dispatch_common::AgentRuntime;
use http::header::{CONNECTION, CONTENT_TYPE, HOST, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::mocks::{MockManagement, RecordingTimer, unavailable};

// ── Forwarder fake ────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingForwarder {
    calls: Mutex<Vec<(u16, ForwardRequest)>>,
    fail_with: Option<ForwardError>,
}

impl RecordingForwarder {
    fn failing(err: ForwardError) -> Self {
        Self {
            calls: Mutex::default(),
            fail_with: Some(err),
        }
    }

    fn calls(&self) -> Vec<(u16, ForwardRequest)> {
        self.calls.lock().expect("calls").clone()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(
        &self,
        port: u16,
        request: ForwardRequest,
    ) -> Result<BackendResponse, ForwardError> {
        self.calls.lock().expect("calls").push((port, request));
        if let Some(err) = &self.fail_with {
            return Err(match err {
                ForwardError::Timeout(ms) => ForwardError::Timeout(*ms),
                ForwardError::Transport(reason) => ForwardError::Transport(reason.clone()),
            });
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.insert(SET_COOKIE, HeaderValue::from_static("backend=1"));
        headers.insert("x-powered-by", HeaderValue::from_static("mailpile"));
        Ok(BackendResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"<html>inbox</html>"),
        })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn request() -> ForwardRequest {
    let mut headers = HeaderMap::new();
    headers.insert(HOST, HeaderValue::from_static("dispatch.example"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-custom", HeaderValue::from_static("kept"));
    ForwardRequest {
        method: Method::GET,
        path_and_query: "/in/inbox/?q=1".to_string(),
        headers,
        body: Bytes::new(),
    }
}

struct Setup {
    service: ProxyService,
    forwarder: Arc<RecordingForwarder>,
    timer: Arc<RecordingTimer>,
}

fn setup(api: MockManagement, forwarder: RecordingForwarder) -> Setup {
    let forwarder = Arc::new(forwarder);
    let timer = Arc::new(RecordingTimer::default());
    let service = ProxyService::new(
        Arc::new(api),
        forwarder.clone(),
        timer.clone(),
        WaitPolicy::default(),
    );
    Setup {
        service,
        forwarder,
        timer,
    }
}

/// The n-th runtime poll (1-based, the initial lookup included) reports
/// `running(port)` from `running_from` on.
fn runtime_sequence(api: &mut MockManagement, running_from: Option<usize>, port: u16) {
    let mut polls = 0;
    api.expect_agent_runtime().returning(move |_| {
        polls += 1;
        match running_from {
            Some(n) if polls >= n => Ok(AgentRuntime::running(port)),
            _ if polls == 1 => Ok(AgentRuntime::stopped()),
            _ => Ok(AgentRuntime::starting()),
        }
    });
}

fn forwarded(outcome: DispatchOutcome) -> BackendResponse {
    match outcome {
        DispatchOutcome::Forwarded(response) => response,
        other => panic!("expected a forwarded response, got {other:?}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn running_agent_is_forwarded_without_waiting() {
    let mut api = MockManagement::new();
    runtime_sequence(&mut api, Some(1), 5004);
    api.expect_start_agent().never();
    let s = setup(api, RecordingForwarder::default());

    let outcome = s.service.dispatch("alice", request()).await.expect("dispatch");

    let response = forwarded(outcome);
    assert_eq!(response.status, StatusCode::OK);
    assert!(s.timer.sleeps().is_empty());
    let calls = s.forwarder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, 5004);
    assert_eq!(calls[0].1.path_and_query, "/in/inbox/?q=1");
}

#[tokio::test]
async fn stopped_agent_is_started_and_forwarded_after_one_poll() {
    let mut api = MockManagement::new();
    runtime_sequence(&mut api, Some(2), 5000);
    api.expect_start_agent()
        .times(1)
        .returning(|_| Ok(AgentRuntime::starting()));
    let s = setup(api, RecordingForwarder::default());

    let outcome = s.service.dispatch("alice", request()).await.expect("dispatch");

    forwarded(outcome);
    assert_eq!(s.timer.sleeps(), [Duration::from_secs(1)]);
    assert_eq!(s.forwarder.calls()[0].0, 5000);
}

#[tokio::test]
async fn agent_that_never_comes_up_is_unavailable_after_budget() {
    let mut api = MockManagement::new();
    runtime_sequence(&mut api, None, 0);
    api.expect_start_agent()
        .times(1)
        .returning(|_| Ok(AgentRuntime::starting()));
    let s = setup(api, RecordingForwarder::default());

    let outcome = s.service.dispatch("bob", request()).await.expect("dispatch");

    assert!(matches!(outcome, DispatchOutcome::Unavailable));
    assert_eq!(s.timer.sleeps().len(), 3);
    assert_eq!(s.timer.total(), Duration::from_secs(3));
    assert!(s.forwarder.calls().is_empty());
}

#[tokio::test]
async fn failed_start_stops_waiting_early() {
    let mut api = MockManagement::new();
    let mut polls = 0;
    api.expect_agent_runtime().returning(move |_| {
        polls += 1;
        if polls == 1 {
            Ok(AgentRuntime::stopped())
        } else {
            Ok(AgentRuntime::failed())
        }
    });
    api.expect_start_agent()
        .returning(|_| Ok(AgentRuntime::starting()));
    let s = setup(api, RecordingForwarder::default());

    let outcome = s.service.dispatch("bob", request()).await.expect("dispatch");

    assert!(matches!(outcome, DispatchOutcome::Unavailable));
    assert_eq!(s.timer.sleeps().len(), 1);
}

#[tokio::test]
async fn start_answering_running_skips_the_wait() {
    let mut api = MockManagement::new();
    runtime_sequence(&mut api, None, 0);
    api.expect_start_agent()
        .returning(|_| Ok(AgentRuntime::running(5007)));
    let s = setup(api, RecordingForwarder::default());

    forwarded(s.service.dispatch("alice", request()).await.expect("dispatch"));

    assert!(s.timer.sleeps().is_empty());
    assert_eq!(s.forwarder.calls()[0].0, 5007);
}

#[tokio::test]
async fn unavailable_management_api_is_unavailable() {
    let mut api = MockManagement::new();
    api.expect_agent_runtime().returning(|_| Err(unavailable()));
    api.expect_start_agent().never();
    let s = setup(api, RecordingForwarder::default());

    let outcome = s.service.dispatch("alice", request()).await.expect("dispatch");

    assert!(matches!(outcome, DispatchOutcome::Unavailable));
}

#[tokio::test]
async fn unavailable_during_start_is_unavailable() {
    let mut api = MockManagement::new();
    runtime_sequence(&mut api, None, 0);
    api.expect_start_agent().returning(|_| Err(unavailable()));
    let s = setup(api, RecordingForwarder::default());

    let outcome = s.service.dispatch("alice", request()).await.expect("dispatch");

    assert!(matches!(outcome, DispatchOutcome::Unavailable));
    assert!(s.timer.sleeps().is_empty());
}

#[tokio::test]
async fn other_management_errors_propagate() {
    let mut api = MockManagement::new();
    api.expect_agent_runtime().returning(|_| {
        Err(ManagementError::Request {
            status: 500,
            reason: "Internal Server Error".to_string(),
        })
    });
    let s = setup(api, RecordingForwarder::default());

    let err = s
        .service
        .dispatch("alice", request())
        .await
        .expect_err("500 is not a dispatch outcome");

    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn transport_failure_is_backend_failed() {
    let mut api = MockManagement::new();
    runtime_sequence(&mut api, Some(1), 5000);
    let s = setup(
        api,
        RecordingForwarder::failing(ForwardError::Transport("connection refused".to_string())),
    );

    let outcome = s.service.dispatch("alice", request()).await.expect("dispatch");

    match outcome {
        DispatchOutcome::BackendFailed(reason) => assert!(reason.contains("connection refused")),
        other => panic!("expected BackendFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn forward_timeout_is_backend_failed() {
    let mut api = MockManagement::new();
    runtime_sequence(&mut api, Some(1), 5000);
    let s = setup(api, RecordingForwarder::failing(ForwardError::Timeout(1000)));

    let outcome = s.service.dispatch("alice", request()).await.expect("dispatch");

    assert!(matches!(outcome, DispatchOutcome::BackendFailed(_)));
}

#[tokio::test]
async fn headers_are_filtered_both_ways() {
    let mut api = MockManagement::new();
    runtime_sequence(&mut api, Some(1), 5000);
    let s = setup(api, RecordingForwarder::default());

    let response = forwarded(s.service.dispatch("alice", request()).await.expect("dispatch"));

    assert_eq!(response.headers.len(), 1);
    assert_eq!(response.headers[CONTENT_TYPE], "text/html");
    let sent = &s.forwarder.calls()[0].1;
    assert_eq!(sent.headers[HOST], "dispatch.example");
    assert!(sent.headers.get(CONNECTION).is_none());
    assert_eq!(sent.headers["x-custom"], "kept");
}
