//! Typed domain error enums.
//!
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator. The HTTP layer downcasts them to pick a status code.

use thiserror::Error;

// ── Orchestration errors ──────────────────────────────────────────────────────

/// Errors raised while driving agent containers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("No running container for agent '{0}'.")]
    NotRunning(String),

    #[error("Setup of agent '{name}' exited with code {code}.")]
    SetupFailed { name: String, code: i64 },

    #[error("Image build for '{tag}' failed: {reason}")]
    ImageBuild { tag: String, reason: String },

    #[error("No free port between {first} and {last}.")]
    PortsExhausted { first: u16, last: u16 },

    #[error("Container name '{0}' is used by a container dispatch did not create.")]
    NameTaken(String),
}

// ── Agent store errors ────────────────────────────────────────────────────────

/// Errors related to agent identities.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentStoreError {
    #[error("Agent '{0}' not found.")]
    NotFound(String),

    #[error("Agent '{0}' already exists.")]
    AlreadyExists(String),

    #[error("Invalid agent name '{0}': must match ^[a-z0-9][a-z0-9_.-]{{0,62}}$")]
    InvalidName(String),

    #[error("Invalid credentials for agent '{0}'.")]
    InvalidCredentials(String),
}

// ── Forwarding errors ─────────────────────────────────────────────────────────

/// Transport-level failure talking to an agent. HTTP error statuses from the
/// agent are responses, not errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForwardError {
    #[error("agent did not answer within {0} ms")]
    Timeout(u64),

    #[error("{0}")]
    Transport(String),
}

// ── Management API errors ─────────────────────────────────────────────────────

/// Failures reported by the management API client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagementError {
    /// The API answered 503.
    #[error("Service unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    /// Any other 4xx/5xx answer.
    #[error("{status} {reason}")]
    Request { status: u16, reason: String },

    #[error("Management API unreachable: {0}")]
    Transport(String),

    #[error("Unexpected management API response: {0}")]
    Decode(String),
}

impl ManagementError {
    /// Classifies an HTTP status the way every client call does.
    ///
    /// Returns `None` for non-error statuses.
    #[must_use]
    pub fn from_status(status: u16, reason: &str) -> Option<Self> {
        match status {
            503 => Some(Self::ServiceUnavailable {
                reason: reason.to_string(),
            }),
            400..=599 => Some(Self::Request {
                status,
                reason: reason.to_string(),
            }),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Request { status: 404, .. })
    }
}
