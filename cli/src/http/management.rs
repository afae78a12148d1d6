//! Management API routes over [`ManagementService`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use dispatch_common::{
    AgentDescriptor, AgentList, AgentRuntime, AuthenticateRequest, MemoryUsageReport, NewAgent,
    RuntimeState, StateChange,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::application::services::management::ManagementService;
use crate::domain::error::{AgentStoreError, OrchestratorError};

#[derive(Clone)]
pub struct ManagerState {
    pub service: Arc<ManagementService>,
}

pub fn router(state: ManagerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agents", get(list_agents).post(add_agent))
        .route("/agents/{name}", get(get_agent))
        .route("/agents/{name}/runtime", get(get_runtime))
        .route("/agents/{name}/state", put(put_state))
        .route("/agents/{name}/authenticate", post(authenticate))
        .route("/stats/memory_usage", get(memory_usage))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Error mapping ─────────────────────────────────────────────────────────────

/// Any handler failure; the status is picked from the typed error inside.
pub struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = format!("{:#}", self.0);
        if status.is_server_error() {
            error!(status = status.as_u16(), "{message}");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[must_use]
pub fn status_for(err: &anyhow::Error) -> StatusCode {
    if let Some(e) = err.downcast_ref::<AgentStoreError>() {
        return match e {
            AgentStoreError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentStoreError::AlreadyExists(_) => StatusCode::CONFLICT,
            AgentStoreError::InvalidName(_) => StatusCode::BAD_REQUEST,
            AgentStoreError::InvalidCredentials(_) => StatusCode::FORBIDDEN,
        };
    }
    if let Some(e) = err.downcast_ref::<OrchestratorError>() {
        return match e {
            OrchestratorError::NotRunning(_) => StatusCode::NOT_FOUND,
            OrchestratorError::NameTaken(_) => StatusCode::CONFLICT,
            OrchestratorError::PortsExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::SetupFailed { .. } | OrchestratorError::ImageBuild { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_agents(State(state): State<ManagerState>) -> Result<Json<AgentList>, ApiError> {
    Ok(Json(state.service.list_agents().await?))
}

async fn get_agent(
    State(state): State<ManagerState>,
    Path(name): Path<String>,
) -> Result<Json<AgentDescriptor>, ApiError> {
    Ok(Json(state.service.describe(&name).await?))
}

async fn get_runtime(
    State(state): State<ManagerState>,
    Path(name): Path<String>,
) -> Result<Json<AgentRuntime>, ApiError> {
    Ok(Json(state.service.runtime(&name).await?))
}

async fn put_state(
    State(state): State<ManagerState>,
    Path(name): Path<String>,
    Json(change): Json<StateChange>,
) -> Result<Json<AgentRuntime>, ApiError> {
    Ok(Json(state.service.change_state(&name, change.state).await?))
}

async fn authenticate(
    State(state): State<ManagerState>,
    Path(name): Path<String>,
    Json(request): Json<AuthenticateRequest>,
) -> Result<StatusCode, ApiError> {
    state.service.authenticate(&name, &request.password).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_agent(
    State(state): State<ManagerState>,
    Json(agent): Json<NewAgent>,
) -> Result<(StatusCode, Json<AgentDescriptor>), ApiError> {
    state.service.add_agent(&agent).await?;
    Ok((
        StatusCode::CREATED,
        Json(AgentDescriptor {
            name: agent.name,
            state: RuntimeState::Stopped,
        }),
    ))
}

async fn memory_usage(
    State(state): State<ManagerState>,
) -> Result<Json<MemoryUsageReport>, ApiError> {
    Ok(Json(state.service.memory_usage().await?))
}
