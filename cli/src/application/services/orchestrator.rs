//! Agent lifecycle use-cases: image, start, stop, listing and accounting.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use dispatch_common::{AgentMemoryUsage, AgentRuntime, MemoryUsageReport, RuntimeState};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::application::ports::{
    APP_LABEL, BuildContextSource, ContainerInfo, ContainerRuntime, ContainerSpec, NetworkProbe,
    ProcessInspector, ROLE_AGENT, ROLE_LABEL, ROLE_PREPARE, StopOutcome,
};
use crate::domain::adapter::{DATA_MOUNT, DockerAdapter};
use crate::domain::agent::{data_path, validate_agent_name};
use crate::domain::error::OrchestratorError;
use crate::domain::port_pool::PortPool;
use crate::domain::registry::{AgentRegistry, Claim};

/// Infrastructure the orchestrator drives.
pub struct OrchestratorPorts {
    pub containers: Arc<dyn ContainerRuntime>,
    pub build_context: Arc<dyn BuildContextSource>,
    pub processes: Arc<dyn ProcessInspector>,
    pub probe: Arc<dyn NetworkProbe>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Parent of the per-agent directories.
    pub root_path: PathBuf,
    pub stop_grace: Duration,
    /// Host the published ports are probed on.
    pub probe_host: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("/var/lib/dispatch/agents"),
            stop_grace: Duration::from_secs(10),
            probe_host: "127.0.0.1".to_string(),
        }
    }
}

/// Outcome of [`Orchestrator::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { port: u16 },
    /// Nothing was done: another start owns the agent or it is running.
    AlreadyActive(AgentRuntime),
}

pub struct Orchestrator {
    containers: Arc<dyn ContainerRuntime>,
    build_context: Arc<dyn BuildContextSource>,
    processes: Arc<dyn ProcessInspector>,
    probe: Arc<dyn NetworkProbe>,
    adapter: Arc<dyn DockerAdapter>,
    registry: Mutex<AgentRegistry>,
    image_lock: Mutex<()>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        ports: OrchestratorPorts,
        adapter: Arc<dyn DockerAdapter>,
        pool: PortPool,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            containers: ports.containers,
            build_context: ports.build_context,
            processes: ports.processes,
            probe: ports.probe,
            adapter,
            registry: Mutex::new(AgentRegistry::new(pool)),
            image_lock: Mutex::new(()),
            settings,
        }
    }

    #[must_use]
    pub fn adapter(&self) -> &dyn DockerAdapter {
        self.adapter.as_ref()
    }

    /// Builds `<app>:latest` unless it already exists. Concurrent callers
    /// wait for the first build instead of starting their own.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ImageBuild`] when the context cannot be
    /// produced or the build fails, or the runtime error of the image lookup.
    pub async fn ensure_image_ready(&self) -> Result<()> {
        let _guard = self.image_lock.lock().await;
        let tag = self.adapter.image_tag();
        if self.containers.image_exists(&tag).await? {
            debug!(image = %tag, "image present");
            return Ok(());
        }

        info!(image = %tag, "building image");
        let started = Instant::now();
        let build_failed = |e: anyhow::Error| OrchestratorError::ImageBuild {
            tag: tag.clone(),
            reason: format!("{e:#}"),
        };
        let context = self
            .build_context
            .build_context(self.adapter.app_name())
            .await
            .map_err(build_failed)?;
        self.containers
            .build_image(&tag, context)
            .await
            .map_err(build_failed)?;
        info!(
            image = %tag,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "image built"
        );
        Ok(())
    }

    /// Starts an agent and waits for its container to be started.
    ///
    /// The agent is `starting` afterwards; it becomes `running` once its
    /// port answers (see [`Orchestrator::runtime`]).
    ///
    /// # Errors
    ///
    /// Returns an error for invalid names, image build failures, a failing
    /// setup step, an exhausted port pool or container runtime errors. The
    /// agent is then `failed` and holds no port.
    pub async fn start(&self, name: &str) -> Result<StartOutcome> {
        if let Some(active) = self.claim(name).await? {
            return Ok(StartOutcome::AlreadyActive(active));
        }
        let port = self.launch_claimed(name).await?;
        Ok(StartOutcome::Started { port })
    }

    /// Claims the agent and finishes the start on a background task.
    ///
    /// Returns the runtime the caller should report right away.
    ///
    /// # Errors
    ///
    /// Returns an error only for invalid names; start failures are logged
    /// and leave the agent `failed`.
    pub async fn start_detached(self: &Arc<Self>, name: &str) -> Result<AgentRuntime> {
        if let Some(active) = self.claim(name).await? {
            return Ok(active);
        }
        let this = Arc::clone(self);
        let owned = name.to_string();
        tokio::spawn(async move {
            // Failure is already logged and recorded as `failed`.
            let _ = this.launch_claimed(&owned).await;
        });
        Ok(AgentRuntime::starting())
    }

    /// `Some(runtime)` when the agent is already starting or running.
    async fn claim(&self, name: &str) -> Result<Option<AgentRuntime>> {
        validate_agent_name(name)?;
        let mut registry = self.registry.lock().await;
        match registry.claim(name) {
            Claim::Claimed => Ok(None),
            Claim::AlreadyActive(state) => {
                debug!(agent = name, %state, "start ignored, agent already active");
                Ok(Some(registry.runtime(name)))
            }
        }
    }

    async fn launch_claimed(&self, name: &str) -> Result<u16> {
        match self.launch(name).await {
            Ok(port) => Ok(port),
            Err(e) => {
                let released = self.registry.lock().await.fail(name);
                error!(agent = name, port = ?released, error = %format!("{e:#}"), "start failed");
                Err(e)
            }
        }
    }

    async fn launch(&self, name: &str) -> Result<u16> {
        self.ensure_image_ready().await?;
        let data = data_path(&self.settings.root_path, name);

        let existing = self
            .agent_containers(true)
            .await?
            .into_iter()
            .find(|c| c.name == name);

        let (container_id, port, already_running) = match existing {
            Some(container) => self.reuse_container(name, &data, container).await?,
            None => {
                self.ensure_name_free(name).await?;
                self.prepare(name, &data).await?;
                let port = self.lease(name, None).await?;
                let id = self.create_agent_container(name, &data, port).await?;
                (id, port, false)
            }
        };

        self.registry.lock().await.upsert_container(name, &container_id);
        if !already_running {
            self.containers.start_container(&container_id).await?;
        }
        info!(agent = name, port, container_id = %short_id(&container_id), "agent container started");
        Ok(port)
    }

    /// Leases the port the existing container is bound to, or recreates the
    /// container when that port is taken. Data lives in the bind mount, so a
    /// recreated container keeps it.
    async fn reuse_container(
        &self,
        name: &str,
        data: &Path,
        container: ContainerInfo,
    ) -> Result<(String, u16, bool)> {
        let details = self.containers.inspect_container(&container.id).await?;
        let port = self.lease(name, details.host_port).await?;
        if details.host_port == Some(port) {
            debug!(agent = name, port, "reusing container");
            return Ok((container.id, port, details.running));
        }

        info!(agent = name, port, "recreating container on a new port");
        if details.running {
            self.halt(name, &container.id).await?;
        }
        self.containers.remove_container(&container.id).await?;
        self.registry.lock().await.remove_container(name);
        let id = self.create_agent_container(name, data, port).await?;
        Ok((id, port, false))
    }

    /// Refuses names held by containers without the agent role label.
    async fn ensure_name_free(&self, name: &str) -> Result<()> {
        let foreign = self
            .containers
            .list_containers(true, &[])
            .await?
            .into_iter()
            .any(|c| c.name == name);
        if foreign {
            return Err(OrchestratorError::NameTaken(name.to_string()).into());
        }
        Ok(())
    }

    async fn lease(&self, name: &str, preferred: Option<u16>) -> Result<u16> {
        Ok(self.registry.lock().await.lease(name, preferred)?)
    }

    /// Runs the adapter's setup command against a fresh data volume.
    async fn prepare(&self, name: &str, data: &Path) -> Result<()> {
        let command = self.adapter.setup_command();
        if command.is_empty() {
            return Ok(());
        }
        let prepare_name = self.adapter.prepare_container_name(name);
        let existing = self
            .containers
            .list_containers(true, &self.label_filters(ROLE_PREPARE))
            .await?
            .into_iter()
            .find(|c| c.name == prepare_name);

        let id = if let Some(container) = existing {
            container.id
        } else {
            let spec = ContainerSpec {
                name: prepare_name,
                image: self.adapter.image_tag(),
                command,
                env: self.adapter.environment(DATA_MOUNT),
                labels: self.labels(ROLE_PREPARE),
                binds: vec![data_bind(data)],
                exposed_port: None,
                host_port: None,
            };
            self.containers.create_container(&spec).await?
        };

        info!(agent = name, "running setup");
        self.containers.start_container(&id).await?;
        let code = self.containers.wait_container(&id).await?;
        if code != 0 {
            return Err(OrchestratorError::SetupFailed {
                name: name.to_string(),
                code,
            }
            .into());
        }
        Ok(())
    }

    async fn create_agent_container(&self, name: &str, data: &Path, port: u16) -> Result<String> {
        let spec = ContainerSpec {
            name: name.to_string(),
            image: self.adapter.image_tag(),
            command: self.adapter.run_command(),
            env: self.adapter.environment(DATA_MOUNT),
            labels: self.labels(ROLE_AGENT),
            binds: vec![data_bind(data)],
            exposed_port: Some(self.adapter.container_port_key()),
            host_port: Some(port),
        };
        self.containers.create_container(&spec).await
    }

    /// Stops the agent's running container and releases its port.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotRunning`] when no container of that
    /// name is running, or the container runtime error.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let running = self
            .agent_containers(false)
            .await?
            .into_iter()
            .find(|c| c.name == name);

        let Some(container) = running else {
            let mut registry = self.registry.lock().await;
            // A container that died on its own still holds its lease.
            if registry.runtime(name).state == RuntimeState::Running {
                let port = registry.release(name);
                warn!(agent = name, port = ?port, "released lease of vanished container");
            }
            return Err(OrchestratorError::NotRunning(name.to_string()).into());
        };

        self.halt(name, &container.id).await?;
        let port = self.registry.lock().await.release(name);
        info!(agent = name, port = ?port, "agent stopped");
        Ok(())
    }

    /// Graceful stop, escalating to kill once the grace period is spent.
    async fn halt(&self, name: &str, id: &str) -> Result<()> {
        match self
            .containers
            .stop_container(id, self.settings.stop_grace)
            .await?
        {
            StopOutcome::Graceful => Ok(()),
            StopOutcome::TimedOut => {
                warn!(
                    agent = name,
                    grace_secs = self.settings.stop_grace.as_secs(),
                    "stop timed out, killing container"
                );
                self.containers.kill_container(id).await
            }
        }
    }

    /// Names of agents with a running container.
    ///
    /// # Errors
    ///
    /// Returns the container runtime error.
    pub async fn list_running(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .agent_containers(false)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Current runtime of an agent. A starting agent whose port accepts
    /// connections is promoted to running; a running agent whose container
    /// has exited is settled to stopped and its port released.
    pub async fn runtime(&self, name: &str) -> AgentRuntime {
        let (runtime, port, container_id) = {
            let registry = self.registry.lock().await;
            let slot = registry.slot(name);
            (
                registry.runtime(name),
                slot.and_then(|s| s.port),
                slot.and_then(|s| s.container_id.clone()),
            )
        };
        match (runtime.state, port) {
            (RuntimeState::Starting, Some(port)) => self.promote(name, port, runtime).await,
            (RuntimeState::Running, _) => {
                self.confirm_running(name, container_id.as_deref(), runtime)
                    .await
            }
            _ => runtime,
        }
    }

    async fn promote(&self, name: &str, port: u16, runtime: AgentRuntime) -> AgentRuntime {
        let reachable = self
            .probe
            .check_tcp_connectivity(&self.settings.probe_host, port)
            .await
            .unwrap_or(false);
        if !reachable {
            return runtime;
        }
        match self.registry.lock().await.mark_running(name) {
            Some(port) => {
                info!(agent = name, port, "agent is running");
                AgentRuntime::running(port)
            }
            None => runtime,
        }
    }

    async fn confirm_running(
        &self,
        name: &str,
        container_id: Option<&str>,
        runtime: AgentRuntime,
    ) -> AgentRuntime {
        if self.container_alive(name, container_id).await {
            return runtime;
        }
        let mut registry = self.registry.lock().await;
        if registry.runtime(name).state != RuntimeState::Running {
            return registry.runtime(name);
        }
        let port = registry.release(name);
        warn!(agent = name, port = ?port, "agent container exited, lease released");
        AgentRuntime::stopped()
    }

    /// `false` only when the engine confirms the container is not running.
    async fn container_alive(&self, name: &str, container_id: Option<&str>) -> bool {
        if let Some(id) = container_id {
            if let Ok(details) = self.containers.inspect_container(id).await {
                return details.running;
            }
        }
        match self.agent_containers(false).await {
            Ok(running) => running.iter().any(|c| c.name == name),
            Err(e) => {
                debug!(agent = name, error = %format!("{e:#}"), "liveness check failed");
                true
            }
        }
    }

    /// Resident memory of every running agent.
    ///
    /// # Errors
    ///
    /// Returns the container runtime error of the listing. Failures for a
    /// single container only zero that entry.
    pub async fn memory_usage(&self) -> Result<MemoryUsageReport> {
        let running = self.agent_containers(false).await?;
        let mut samples = Vec::with_capacity(running.len());
        for container in running {
            let pid = match self.containers.inspect_container(&container.id).await {
                Ok(details) => details.pid,
                Err(e) => {
                    warn!(agent = %container.name, error = %format!("{e:#}"), "inspect failed");
                    None
                }
            };
            let sample = match pid {
                Some(pid) => self.processes.resident_memory(pid).await,
                None => None,
            };
            let memory_usage = sample.unwrap_or_else(|| {
                warn!(agent = %container.name, pid = ?pid, "memory sample unavailable");
                0
            });
            samples.push(AgentMemoryUsage {
                name: container.name,
                memory_usage,
            });
        }
        Ok(MemoryUsageReport::from_samples(samples))
    }

    /// Registers agent containers that are already running, e.g. after a
    /// restart of the manager. Returns how many were adopted.
    ///
    /// # Errors
    ///
    /// Returns the container runtime error of the listing.
    pub async fn adopt_running(&self) -> Result<usize> {
        let mut adopted = 0;
        for container in self.agent_containers(false).await? {
            let host_port = match self.containers.inspect_container(&container.id).await {
                Ok(details) => details.host_port,
                Err(e) => {
                    warn!(agent = %container.name, error = %format!("{e:#}"), "inspect failed");
                    continue;
                }
            };
            let accepted = match host_port {
                Some(port) => self
                    .registry
                    .lock()
                    .await
                    .adopt(&container.name, port, &container.id),
                None => false,
            };
            if accepted {
                info!(agent = %container.name, port = ?host_port, "adopted running agent");
                adopted += 1;
            } else {
                warn!(agent = %container.name, port = ?host_port, "cannot adopt running container");
            }
        }
        Ok(adopted)
    }

    async fn agent_containers(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        let containers = self
            .containers
            .list_containers(all, &self.label_filters(ROLE_AGENT))
            .await?;
        Ok(containers
            .into_iter()
            .filter(|c| c.has_role(ROLE_AGENT))
            .collect())
    }

    fn labels(&self, role: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_LABEL.to_string(), self.adapter.app_name().to_string()),
            (ROLE_LABEL.to_string(), role.to_string()),
        ])
    }

    fn label_filters(&self, role: &str) -> Vec<String> {
        self.labels(role)
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect()
    }
}

fn data_bind(data: &Path) -> String {
    format!("{}:{DATA_MOUNT}:rw", data.display())
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
