//! Unit tests for the login use-case.

#![allow(clippy::expect_used)]

use std::sync::Arc;

use dispatch_cli::application::services::login::LoginService;
use dispatch_cli::domain::error::ManagementError;
use dispatch_cli::domain::login::LoginOutcome;
use dispatch_common::{AgentDescriptor, RuntimeState};

use crate::mocks::{MockManagement, not_found, unavailable};

fn known_agent(api: &mut MockManagement) {
    api.expect_get_agent().returning(|name| {
        Ok(AgentDescriptor {
            name: name.to_string(),
            state: RuntimeState::Stopped,
        })
    });
}

fn service(api: MockManagement) -> LoginService {
    LoginService::new(Arc::new(api))
}

#[tokio::test]
async fn correct_password_authenticates() {
    let mut api = MockManagement::new();
    known_agent(&mut api);
    api.expect_authenticate()
        .times(1)
        .returning(|_, password| {
            if password == "s3cret" {
                Ok(())
            } else {
                Err(ManagementError::Request {
                    status: 403,
                    reason: "Forbidden".to_string(),
                })
            }
        });

    let outcome = service(api).login("alice", "s3cret").await.expect("login");

    assert_eq!(outcome, LoginOutcome::Authenticated("alice".to_string()));
}

#[tokio::test]
async fn wrong_password_is_invalid_credentials() {
    let mut api = MockManagement::new();
    known_agent(&mut api);
    api.expect_authenticate().returning(|_, _| {
        Err(ManagementError::Request {
            status: 403,
            reason: "Forbidden".to_string(),
        })
    });

    let outcome = service(api).login("alice", "nope").await.expect("login");

    assert_eq!(outcome, LoginOutcome::InvalidCredentials);
    assert_eq!(
        outcome.redirect_target(),
        "/auth/login?error=Invalid%20credentials"
    );
}

#[tokio::test]
async fn unknown_agent_is_invalid_credentials_without_authenticate() {
    let mut api = MockManagement::new();
    api.expect_get_agent().returning(|_| Err(not_found()));
    api.expect_authenticate().never();

    let outcome = service(api).login("mallory", "pw").await.expect("login");

    assert_eq!(outcome, LoginOutcome::InvalidCredentials);
}

#[tokio::test]
async fn unavailable_api_is_service_unavailable() {
    let mut api = MockManagement::new();
    api.expect_get_agent().returning(|_| Err(unavailable()));

    let outcome = service(api).login("alice", "pw").await.expect("login");

    assert_eq!(outcome, LoginOutcome::ServiceUnavailable);
    assert_eq!(
        outcome.redirect_target(),
        "/auth/login?error=Service%20currently%20not%20available"
    );
}

#[tokio::test]
async fn malformed_input_never_reaches_the_api() {
    let mut api = MockManagement::new();
    api.expect_get_agent().never();
    api.expect_authenticate().never();
    let login = service(api);

    for (user, password) in [("", "pw"), ("../admin", "pw"), ("alice", "")] {
        let outcome = login.login(user, password).await.expect("login");
        assert_eq!(outcome, LoginOutcome::InvalidCredentials, "{user:?}");
    }
}

#[tokio::test]
async fn server_error_on_authenticate_is_invalid_credentials() {
    let mut api = MockManagement::new();
    known_agent(&mut api);
    api.expect_authenticate().returning(|_, _| {
        Err(ManagementError::Request {
            status: 500,
            reason: "Internal Server Error".to_string(),
        })
    });

    let outcome = service(api).login("alice", "pw").await.expect("login");

    assert_eq!(outcome, LoginOutcome::InvalidCredentials);
}

#[tokio::test]
async fn transport_errors_propagate() {
    let mut api = MockManagement::new();
    api.expect_get_agent().returning(|_| {
        Err(ManagementError::Transport("connection refused".to_string()))
    });

    let err = service(api)
        .login("alice", "pw")
        .await
        .expect_err("transport errors are not login outcomes");

    assert_eq!(
        err,
        ManagementError::Transport("connection refused".to_string())
    );
}
