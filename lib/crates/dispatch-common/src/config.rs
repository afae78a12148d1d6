use serde::Deserialize;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Minimum length of the session cookie signing secret.
pub const MIN_COOKIE_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cookie_secret must be at least {MIN_COOKIE_SECRET_LEN} bytes (got {0})")]
    CookieSecretTooShort(usize),

    #[error("tls_cert and tls_key must be set together")]
    IncompleteTls,

    #[error("base_port {base} is above last_port {last}")]
    EmptyPortRange { base: u16, last: u16 },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Reverse proxy configuration, read from `DISPATCH_PROXY_*`.
#[derive(Clone, Deserialize)]
pub struct ProxyServerConfig {
    /// Listen address (default: 127.0.0.1:8080)
    #[serde(default = "default_proxy_addr")]
    pub listen_addr: SocketAddr,

    /// Base URL of the management API
    #[serde(default = "default_manager_url")]
    pub manager_url: String,

    /// Extra root certificate (PEM) trusted when talking to an https manager
    #[serde(default)]
    pub manager_ca_cert: Option<PathBuf>,

    /// Secret used to sign the session cookie
    #[serde(default)]
    pub cookie_secret: String,

    #[serde(default)]
    pub tls_cert: Option<PathBuf>,

    #[serde(default)]
    pub tls_key: Option<PathBuf>,

    /// Runtime polls made after a start request before giving up
    #[serde(default = "default_start_wait_attempts")]
    pub start_wait_attempts: u32,

    #[serde(default = "default_start_wait_interval_ms")]
    pub start_wait_interval_ms: u64,

    /// Timeout of a single forwarded request
    #[serde(default = "default_forward_timeout_ms")]
    pub forward_timeout_ms: u64,

    /// Host the agents publish their ports on
    #[serde(default = "default_backend_host")]
    pub backend_host: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ProxyServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie_secret.len() < MIN_COOKIE_SECRET_LEN {
            return Err(ConfigError::CookieSecretTooShort(self.cookie_secret.len()));
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err(ConfigError::IncompleteTls);
        }
        if self.start_wait_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("start_wait_interval_ms"));
        }
        if self.forward_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("forward_timeout_ms"));
        }
        Ok(())
    }

    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert.is_some() && self.tls_key.is_some()
    }
}

// The signing secret stays out of logs.
impl fmt::Debug for ProxyServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyServerConfig")
            .field("listen_addr", &self.listen_addr)
            .field("manager_url", &self.manager_url)
            .field("manager_ca_cert", &self.manager_ca_cert)
            .field("cookie_secret", &"<redacted>")
            .field("tls_cert", &self.tls_cert)
            .field("tls_key", &self.tls_key)
            .field("start_wait_attempts", &self.start_wait_attempts)
            .field("start_wait_interval_ms", &self.start_wait_interval_ms)
            .field("forward_timeout_ms", &self.forward_timeout_ms)
            .field("backend_host", &self.backend_host)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

/// Management server configuration, read from `DISPATCH_MANAGER_*`.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerServerConfig {
    /// Listen address (default: 127.0.0.1:4443)
    #[serde(default = "default_manager_addr")]
    pub listen_addr: SocketAddr,

    /// Directory holding one subdirectory per agent
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Directory holding `Dockerfile.<app>` or `init-<app>-docker-context.sh`
    #[serde(default = "default_resources_dir")]
    pub resources_dir: PathBuf,

    /// Docker endpoint; local defaults when unset
    #[serde(default)]
    pub docker_url: Option<String>,

    /// Built-in adapter name
    #[serde(default = "default_adapter")]
    pub adapter: String,

    /// YAML adapter definition, takes precedence over `adapter`
    #[serde(default)]
    pub adapter_file: Option<PathBuf>,

    #[serde(default = "default_base_port")]
    pub base_port: u16,

    #[serde(default = "default_last_port")]
    pub last_port: u16,

    /// Grace period before a stopping container is killed
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    #[serde(default)]
    pub tls_cert: Option<PathBuf>,

    #[serde(default)]
    pub tls_key: Option<PathBuf>,
}

impl ManagerServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_port > self.last_port {
            return Err(ConfigError::EmptyPortRange {
                base: self.base_port,
                last: self.last_port,
            });
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err(ConfigError::IncompleteTls);
        }
        if self.stop_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("stop_timeout_secs"));
        }
        Ok(())
    }
}

fn default_proxy_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))
}

fn default_manager_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 4443))
}

fn default_manager_url() -> String {
    "http://127.0.0.1:4443".to_string()
}

fn default_start_wait_attempts() -> u32 {
    3
}

fn default_start_wait_interval_ms() -> u64 {
    1000
}

fn default_forward_timeout_ms() -> u64 {
    1000
}

fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_root_path() -> PathBuf {
    PathBuf::from("/var/lib/dispatch/agents")
}

fn default_resources_dir() -> PathBuf {
    PathBuf::from("/usr/share/dispatch")
}

fn default_adapter() -> String {
    "mailpile".to_string()
}

fn default_base_port() -> u16 {
    5000
}

fn default_last_port() -> u16 {
    32767
}

fn default_stop_timeout_secs() -> u64 {
    10
}

impl Default for ProxyServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_proxy_addr(),
            manager_url: default_manager_url(),
            manager_ca_cert: None,
            cookie_secret: String::new(),
            tls_cert: None,
            tls_key: None,
            start_wait_attempts: default_start_wait_attempts(),
            start_wait_interval_ms: default_start_wait_interval_ms(),
            forward_timeout_ms: default_forward_timeout_ms(),
            backend_host: default_backend_host(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for ManagerServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_manager_addr(),
            root_path: default_root_path(),
            resources_dir: default_resources_dir(),
            docker_url: None,
            adapter: default_adapter(),
            adapter_file: None,
            base_port: default_base_port(),
            last_port: default_last_port(),
            stop_timeout_secs: default_stop_timeout_secs(),
            tls_cert: None,
            tls_key: None,
        }
    }
}
