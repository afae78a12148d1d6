//! Wire types of the management API shared by the manager, the proxy and the CLI.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of an agent as reported by the management API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    #[default]
    Stopped,
    Starting,
    Running,
    Failed,
}

impl RuntimeState {
    /// `true` while the agent holds a port lease.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Body of `GET /agents/{name}/runtime`.
///
/// `port` is only ever present when `state` is `running`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AgentRuntime {
    pub state: RuntimeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl AgentRuntime {
    /// Builds a runtime report, dropping the port unless the agent is running.
    #[must_use]
    pub fn new(state: RuntimeState, port: Option<u16>) -> Self {
        let port = if state == RuntimeState::Running { port } else { None };
        Self { state, port }
    }

    #[must_use]
    pub fn stopped() -> Self {
        Self::new(RuntimeState::Stopped, None)
    }

    #[must_use]
    pub fn starting() -> Self {
        Self::new(RuntimeState::Starting, None)
    }

    #[must_use]
    pub fn running(port: u16) -> Self {
        Self::new(RuntimeState::Running, Some(port))
    }

    #[must_use]
    pub fn failed() -> Self {
        Self::new(RuntimeState::Failed, None)
    }

    /// The backend port when the agent can be forwarded to.
    #[must_use]
    pub fn running_port(&self) -> Option<u16> {
        match self.state {
            RuntimeState::Running => self.port,
            _ => None,
        }
    }
}

/// Desired state sent with `PUT /agents/{name}/state`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateChange {
    pub state: TargetState,
}

/// Body of `GET /agents`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AgentList {
    pub agents: Vec<String>,
}

/// Body of `GET /agents/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub name: String,
    pub state: RuntimeState,
}

/// Body of `POST /agents/{name}/authenticate`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub password: String,
}

impl fmt::Debug for AuthenticateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticateRequest")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /agents`.
#[derive(Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub password: String,
}

impl fmt::Debug for NewAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAgent")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resident memory of one agent, in bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentMemoryUsage {
    pub name: String,
    pub memory_usage: u64,
}

/// Body of `GET /stats/memory_usage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MemoryUsageReport {
    pub total_usage: u64,
    pub average_usage: u64,
    pub agents: Vec<AgentMemoryUsage>,
}

impl MemoryUsageReport {
    /// Aggregates per-agent samples. An empty sample set averages to zero.
    #[must_use]
    pub fn from_samples(agents: Vec<AgentMemoryUsage>) -> Self {
        let total_usage: u64 = agents.iter().map(|a| a.memory_usage).sum();
        let average_usage = match u64::try_from(agents.len()) {
            Ok(0) | Err(_) => 0,
            Ok(count) => total_usage / count,
        };
        Self {
            total_usage,
            average_usage,
            agents,
        }
    }
}
