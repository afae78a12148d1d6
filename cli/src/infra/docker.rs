//! Docker engine implementation of `ContainerRuntime` over bollard.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::image::{BuildImageOptions, ListImagesOptions};
use bollard::models::{ContainerSummary, HostConfig, PortBinding};
use bollard::{API_DEFAULT_VERSION, Docker};
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::debug;

use crate::application::ports::{
    ContainerDetails, ContainerInfo, ContainerRuntime, ContainerSpec, StopOutcome,
};

/// Request timeout of the Docker client, in seconds.
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Extra time granted on top of the stop grace period before the stop call
/// itself is considered hung.
const STOP_MARGIN: Duration = Duration::from_secs(5);

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to `url` (`unix://`, `tcp://` or `http://`), or to the local
    /// defaults when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error when the client cannot be configured for `url`.
    pub fn connect(url: Option<&str>) -> Result<Self> {
        let docker = match url {
            None => Docker::connect_with_local_defaults(),
            Some(url) if url.starts_with("unix://") => {
                Docker::connect_with_unix(url, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(url) => {
                let addr = url.strip_prefix("tcp://").map_or_else(
                    || url.to_string(),
                    |rest| format!("http://{rest}"),
                );
                Docker::connect_with_http(&addr, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
        }
        .with_context(|| format!("cannot connect to docker at {}", url.unwrap_or("local socket")))?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn image_exists(&self, tag: &str) -> Result<bool> {
        let options = ListImagesOptions::<String> {
            all: false,
            filters: HashMap::from([("reference".to_string(), vec![tag.to_string()])]),
            ..Default::default()
        };
        let images = self
            .docker
            .list_images(Some(options))
            .await
            .context("listing images")?;
        Ok(images
            .iter()
            .any(|image| image.repo_tags.iter().any(|t| t == tag)))
    }

    async fn build_image(&self, tag: &str, context: Bytes) -> Result<()> {
        let options = BuildImageOptions::<String> {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };
        let mut stream = self.docker.build_image(options, None, Some(context));
        while let Some(item) = stream.next().await {
            let info = item.with_context(|| format!("building {tag}"))?;
            if let Some(error) = info.error {
                bail!("{error}");
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(image = tag, "{line}");
                }
            }
        }
        Ok(())
    }

    async fn list_containers(&self, all: bool, labels: &[String]) -> Result<Vec<ContainerInfo>> {
        let mut filters = HashMap::new();
        if !labels.is_empty() {
            filters.insert("label".to_string(), labels.to_vec());
        }
        let options = ListContainersOptions::<String> {
            all,
            filters,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .context("listing containers")?;
        Ok(containers.into_iter().filter_map(container_info).collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let port_bindings = spec
            .exposed_port
            .as_ref()
            .zip(spec.host_port)
            .map(|(container_port, host_port)| {
                HashMap::from([(
                    container_port.clone(),
                    Some(vec![PortBinding {
                        host_ip: Some("127.0.0.1".to_string()),
                        host_port: Some(host_port.to_string()),
                    }]),
                )])
            });
        let exposed_ports = spec
            .exposed_port
            .as_ref()
            .map(|port| HashMap::from([(port.clone(), HashMap::new())]));

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            env: Some(spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect()),
            labels: Some(spec.labels.clone().into_iter().collect()),
            exposed_ports,
            host_config: Some(HostConfig {
                binds: Some(spec.binds.clone()),
                port_bindings,
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .with_context(|| format!("creating container {}", spec.name))?;
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .with_context(|| format!("starting container {id}"))
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let mut stream = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e).with_context(|| format!("waiting for container {id}")),
            None => bail!("container {id} wait returned no status"),
        }
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<StopOutcome> {
        let options = StopContainerOptions {
            t: i64::try_from(grace.as_secs()).unwrap_or(i64::MAX),
        };
        let stop = self.docker.stop_container(id, Some(options));
        match tokio::time::timeout(grace + STOP_MARGIN, stop).await {
            Ok(Ok(())) => Ok(StopOutcome::Graceful),
            Ok(Err(bollard::errors::Error::RequestTimeoutError)) | Err(_) => {
                Ok(StopOutcome::TimedOut)
            }
            Ok(Err(e)) => Err(e).with_context(|| format!("stopping container {id}")),
        }
    }

    async fn kill_container(&self, id: &str) -> Result<()> {
        self.docker
            .kill_container(id, None::<KillContainerOptions<String>>)
            .await
            .with_context(|| format!("killing container {id}"))
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .with_context(|| format!("removing container {id}"))
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .with_context(|| format!("inspecting container {id}"))?;
        let state = response.state.unwrap_or_default();
        let host_port = response
            .host_config
            .and_then(|hc| hc.port_bindings)
            .and_then(|bindings| {
                bindings
                    .into_values()
                    .flatten()
                    .flatten()
                    .find_map(|binding| binding.host_port.and_then(|p| p.parse().ok()))
            });
        Ok(ContainerDetails {
            running: state.running.unwrap_or(false),
            pid: state
                .pid
                .and_then(|pid| u32::try_from(pid).ok())
                .filter(|pid| *pid != 0),
            host_port,
        })
    }
}

fn container_info(summary: ContainerSummary) -> Option<ContainerInfo> {
    let id = summary.id?;
    let name = summary
        .names?
        .into_iter()
        .next()?
        .trim_start_matches('/')
        .to_string();
    Some(ContainerInfo {
        id,
        name,
        running: summary.state.as_deref() == Some("running"),
        labels: summary.labels.unwrap_or_default().into_iter().collect(),
    })
}
