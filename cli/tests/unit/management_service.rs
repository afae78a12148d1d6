//! Unit tests for the use-cases behind the management API.

#![allow(clippy::expect_used)]

use dispatch_cli::application::services::management::ManagementService;
use dispatch_cli::domain::error::{AgentStoreError, OrchestratorError};
use dispatch_common::{AgentRuntime, NewAgent, RuntimeState, TargetState};

use crate::mocks::{FakeEngine, Harness, MemoryCredentials};

fn service(agents: &[(&str, &str)]) -> (Harness, ManagementService) {
    let h = Harness::new(FakeEngine::with_image());
    let service = ManagementService::new(h.orchestrator.clone(), MemoryCredentials::with(agents));
    (h, service)
}

fn store_error(err: &anyhow::Error) -> &AgentStoreError {
    err.downcast_ref::<AgentStoreError>().expect("store error")
}

#[tokio::test]
async fn list_is_sorted() {
    let (_h, service) = service(&[("carol", "c"), ("alice", "a"), ("bob", "b")]);

    let list = service.list_agents().await.expect("list");

    assert_eq!(list.agents, ["alice", "bob", "carol"]);
}

#[tokio::test]
async fn describe_unknown_agent_is_not_found() {
    let (_h, service) = service(&[("alice", "a")]);

    let err = service.describe("mallory").await.expect_err("unknown");

    assert_eq!(
        store_error(&err),
        &AgentStoreError::NotFound("mallory".to_string())
    );
}

#[tokio::test]
async fn describe_reports_state() {
    let (_h, service) = service(&[("alice", "a")]);

    let agent = service.describe("alice").await.expect("describe");

    assert_eq!(agent.name, "alice");
    assert_eq!(agent.state, RuntimeState::Stopped);
}

#[tokio::test]
async fn change_to_running_returns_starting_immediately() {
    let (_h, service) = service(&[("alice", "a")]);

    let runtime = service
        .change_state("alice", TargetState::Running)
        .await
        .expect("start");

    assert_eq!(runtime, AgentRuntime::starting());
    // the next poll must not see `stopped`
    assert!(service.runtime("alice").await.expect("runtime").state.is_active());
}

#[tokio::test]
async fn change_to_stopped_of_idle_agent_fails() {
    let (_h, service) = service(&[("alice", "a")]);

    let err = service
        .change_state("alice", TargetState::Stopped)
        .await
        .expect_err("not running");

    assert!(err.downcast_ref::<OrchestratorError>().is_some());
}

#[tokio::test]
async fn change_to_stopped_after_start() {
    let (h, service) = service(&[("alice", "a")]);
    h.orchestrator.start("alice").await.expect("start");

    let runtime = service
        .change_state("alice", TargetState::Stopped)
        .await
        .expect("stop");

    assert_eq!(runtime, AgentRuntime::stopped());
}

#[tokio::test]
async fn authenticate_checks_password() {
    let (_h, service) = service(&[("alice", "s3cret")]);

    service.authenticate("alice", "s3cret").await.expect("valid");
    let err = service.authenticate("alice", "wrong").await.expect_err("invalid");

    assert_eq!(
        store_error(&err),
        &AgentStoreError::InvalidCredentials("alice".to_string())
    );
}

#[tokio::test]
async fn add_agent_validates_and_rejects_duplicates() {
    let (_h, service) = service(&[("alice", "a")]);

    service
        .add_agent(&NewAgent {
            name: "bob".to_string(),
            password: "pw".to_string(),
        })
        .await
        .expect("bob");
    let duplicate = service
        .add_agent(&NewAgent {
            name: "alice".to_string(),
            password: "pw".to_string(),
        })
        .await
        .expect_err("duplicate");
    let invalid = service
        .add_agent(&NewAgent {
            name: "Bad Name".to_string(),
            password: "pw".to_string(),
        })
        .await
        .expect_err("invalid");

    assert_eq!(
        store_error(&duplicate),
        &AgentStoreError::AlreadyExists("alice".to_string())
    );
    assert_eq!(
        store_error(&invalid),
        &AgentStoreError::InvalidName("Bad Name".to_string())
    );
    assert_eq!(
        service.list_agents().await.expect("list").agents,
        ["alice", "bob"]
    );
}
