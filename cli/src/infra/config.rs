//! Server configuration and adapter loading.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use dispatch_common::{ManagerServerConfig, ProxyServerConfig};

use crate::domain::adapter::{CustomAdapter, DockerAdapter, MailpileAdapter};

pub const PROXY_ENV_PREFIX: &str = "DISPATCH_PROXY_";
pub const MANAGER_ENV_PREFIX: &str = "DISPATCH_MANAGER_";

/// Reads and validates `DISPATCH_PROXY_*`.
///
/// # Errors
///
/// Returns an error naming the prefix when a variable cannot be parsed or
/// the result is invalid.
pub fn load_proxy_config() -> Result<ProxyServerConfig> {
    let config: ProxyServerConfig = envy::prefixed(PROXY_ENV_PREFIX)
        .from_env()
        .with_context(|| format!("cannot read {PROXY_ENV_PREFIX}* configuration"))?;
    config
        .validate()
        .with_context(|| format!("invalid {PROXY_ENV_PREFIX}* configuration"))?;
    Ok(config)
}

/// Reads and validates `DISPATCH_MANAGER_*`.
///
/// # Errors
///
/// Returns an error naming the prefix when a variable cannot be parsed or
/// the result is invalid.
pub fn load_manager_config() -> Result<ManagerServerConfig> {
    let config: ManagerServerConfig = envy::prefixed(MANAGER_ENV_PREFIX)
        .from_env()
        .with_context(|| format!("cannot read {MANAGER_ENV_PREFIX}* configuration"))?;
    config
        .validate()
        .with_context(|| format!("invalid {MANAGER_ENV_PREFIX}* configuration"))?;
    Ok(config)
}

/// Resolves the configured adapter. A YAML definition wins over the
/// built-in name.
///
/// # Errors
///
/// Returns an error for unreadable or invalid definitions and unknown names.
pub fn load_adapter(config: &ManagerServerConfig) -> Result<Arc<dyn DockerAdapter>> {
    if let Some(path) = &config.adapter_file {
        return Ok(Arc::new(read_custom_adapter(path)?));
    }
    match config.adapter.as_str() {
        "mailpile" => Ok(Arc::new(MailpileAdapter)),
        other => bail!(
            "unknown adapter '{other}'; describe it in a YAML file and set {MANAGER_ENV_PREFIX}ADAPTER_FILE"
        ),
    }
}

fn read_custom_adapter(path: &Path) -> Result<CustomAdapter> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let adapter: CustomAdapter = serde_yaml::from_str(&content)
        .with_context(|| format!("cannot parse {}", path.display()))?;
    ensure!(
        !adapter.app_name.is_empty() && !adapter.run_command.is_empty(),
        "{}: app_name and run_command are required",
        path.display()
    );
    ensure!(adapter.port != 0, "{}: port must not be 0", path.display());
    Ok(adapter)
}
