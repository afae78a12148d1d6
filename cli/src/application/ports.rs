//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared wire types,
//! never from `crate::infra`, `crate::commands`, `crate::http` or
//! `crate::output`.
//!
//! The traits are object-safe (`async_trait`) because services hold them as
//! `Arc<dyn _>` inside shared server state.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dispatch_common::{AgentDescriptor, AgentList, AgentRuntime, MemoryUsageReport};
use http::{HeaderMap, Method, StatusCode};

use crate::domain::error::{ForwardError, ManagementError};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Label carrying the adapter application name on every managed container.
pub const APP_LABEL: &str = "dispatch.app";

/// Label distinguishing agent containers from prepare containers.
pub const ROLE_LABEL: &str = "dispatch.role";

pub const ROLE_AGENT: &str = "agent";

pub const ROLE_PREPARE: &str = "prepare";

// ── Value Types ───────────────────────────────────────────────────────────────

/// Everything needed to create one container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub labels: BTreeMap<String, String>,
    /// `host_path:container_path:mode` bind mounts.
    pub binds: Vec<String>,
    /// Container port declared as exposed, e.g. `"33411/tcp"`.
    pub exposed_port: Option<String>,
    /// Host port published for `exposed_port` on 127.0.0.1.
    pub host_port: Option<u16>,
}

/// One row of a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerInfo {
    pub id: String,
    /// Name without the leading `/`.
    pub name: String,
    pub running: bool,
    pub labels: BTreeMap<String, String>,
}

impl ContainerInfo {
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.labels.get(ROLE_LABEL).is_some_and(|r| r == role)
    }
}

/// Result of inspecting one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerDetails {
    pub running: bool,
    pub pid: Option<u32>,
    /// Host port bound to the container's service port, if any.
    pub host_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Graceful,
    /// The grace period elapsed before the container exited.
    TimedOut,
}

/// An inbound request as relayed to an agent.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// An agent's answer.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

// ── Container Port Traits ─────────────────────────────────────────────────────

/// Container engine operations.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn image_exists(&self, tag: &str) -> Result<bool>;
    /// Builds `tag` from a tar archive of the build context.
    async fn build_image(&self, tag: &str, context: Bytes) -> Result<()>;
    /// Lists containers carrying every `key=value` label. `all` includes
    /// stopped ones.
    async fn list_containers(&self, all: bool, labels: &[String]) -> Result<Vec<ContainerInfo>>;
    /// Returns the container id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;
    async fn start_container(&self, id: &str) -> Result<()>;
    /// Waits for the container to exit and returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64>;
    async fn stop_container(&self, id: &str, grace: Duration) -> Result<StopOutcome>;
    async fn kill_container(&self, id: &str) -> Result<()>;
    async fn remove_container(&self, id: &str) -> Result<()>;
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails>;
}

/// Produces the tar build context for an application image.
#[async_trait]
pub trait BuildContextSource: Send + Sync {
    async fn build_context(&self, app_name: &str) -> Result<Bytes>;
}

/// Host process accounting.
#[async_trait]
pub trait ProcessInspector: Send + Sync {
    /// Resident memory in bytes, `None` when the process cannot be read.
    async fn resident_memory(&self, pid: u32) -> Option<u64>;
}

// ── Network Port Traits ───────────────────────────────────────────────────────

#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn check_tcp_connectivity(&self, host: &str, port: u16) -> Result<bool>;
}

/// Relays one request to the agent listening on `port`.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        port: u16,
        request: ForwardRequest,
    ) -> std::result::Result<BackendResponse, ForwardError>;
}

/// Remote management API as seen by the proxy and the CLI.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    async fn list_agents(&self) -> std::result::Result<AgentList, ManagementError>;
    async fn get_agent(&self, name: &str) -> std::result::Result<AgentDescriptor, ManagementError>;
    async fn agent_runtime(&self, name: &str) -> std::result::Result<AgentRuntime, ManagementError>;
    async fn start_agent(&self, name: &str) -> std::result::Result<AgentRuntime, ManagementError>;
    async fn stop_agent(&self, name: &str) -> std::result::Result<AgentRuntime, ManagementError>;
    async fn authenticate(&self, name: &str, password: &str)
    -> std::result::Result<(), ManagementError>;
    async fn add_agent(&self, name: &str, password: &str)
    -> std::result::Result<(), ManagementError>;
    async fn memory_usage(&self) -> std::result::Result<MemoryUsageReport, ManagementError>;
}

// ── Support Port Traits ───────────────────────────────────────────────────────

/// Timed suspension, replaced by a recording fake in tests.
#[async_trait]
pub trait Timer: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Agent identities and their password digests.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn list(&self) -> Result<Vec<String>>;
    async fn exists(&self, name: &str) -> Result<bool>;
    /// Fails with `AgentStoreError::AlreadyExists` for a known name.
    async fn create(&self, name: &str, password: &str) -> Result<()>;
    /// Fails with `AgentStoreError::NotFound` for an unknown name.
    async fn verify(&self, name: &str, password: &str) -> Result<bool>;
}

/// External process execution.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run_in(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<Output>;
}
