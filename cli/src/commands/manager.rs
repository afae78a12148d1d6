//! Manager command: serve the management API over the local Docker engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dispatch_common::ManagerServerConfig;
use tracing::{info, warn};

use crate::application::services::management::ManagementService;
use crate::application::services::orchestrator::{
    Orchestrator, OrchestratorPorts, OrchestratorSettings,
};
use crate::domain::port_pool::PortPool;
use crate::http::management::{ManagerState, router};
use crate::http::serve::{TlsFiles, serve};
use crate::infra::build_context::ResourceBuildContext;
use crate::infra::command_runner::{DEFAULT_SCRIPT_TIMEOUT, TokioCommandRunner};
use crate::infra::config::{load_adapter, load_manager_config};
use crate::infra::credentials::FileCredentialStore;
use crate::infra::docker::DockerRuntime;
use crate::infra::network::TokioNetworkProbe;
use crate::infra::process::SysinfoProcessInspector;

/// Load `DISPATCH_MANAGER_*`, adopt running agents, and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error for invalid configuration, an unreachable Docker engine
/// or when the listener fails.
pub async fn run() -> Result<()> {
    let config = load_manager_config()?;
    info!(
        listen_addr = %config.listen_addr,
        root_path = %config.root_path.display(),
        adapter = %config.adapter,
        "configuration loaded",
    );
    let orchestrator = Arc::new(build_orchestrator(&config)?);

    match orchestrator.adopt_running().await {
        Ok(0) => {}
        Ok(adopted) => info!(adopted, "adopted running agents"),
        Err(e) => warn!("cannot list running agents: {e:#}"),
    }

    let warmup = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        if let Err(e) = warmup.ensure_image_ready().await {
            warn!("image not ready, first start will retry: {e:#}");
        }
    });

    let credentials = Arc::new(FileCredentialStore::new(config.root_path.clone()));
    let state = ManagerState {
        service: Arc::new(ManagementService::new(orchestrator, credentials)),
    };
    let tls = match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => Some(TlsFiles { cert, key }),
        _ => None,
    };
    serve(router(state), config.listen_addr, tls, "manager").await
}

fn build_orchestrator(config: &ManagerServerConfig) -> Result<Orchestrator> {
    let adapter = load_adapter(config)?;
    let ports = OrchestratorPorts {
        containers: Arc::new(DockerRuntime::connect(config.docker_url.as_deref())?),
        build_context: Arc::new(ResourceBuildContext::new(
            config.resources_dir.clone(),
            TokioCommandRunner,
            DEFAULT_SCRIPT_TIMEOUT,
        )),
        processes: Arc::new(SysinfoProcessInspector),
        probe: Arc::new(TokioNetworkProbe),
    };
    let settings = OrchestratorSettings {
        root_path: config.root_path.clone(),
        stop_grace: Duration::from_secs(config.stop_timeout_secs),
        ..OrchestratorSettings::default()
    };
    Ok(Orchestrator::new(
        ports,
        adapter,
        PortPool::new(config.base_port, config.last_port),
        settings,
    ))
}
