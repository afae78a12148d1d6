//! How a backend application is built, prepared and run inside a container.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Mount point of the agent's data directory inside every container.
pub const DATA_MOUNT: &str = "/mnt/user";

/// Capability describing one backend application type.
///
/// The orchestrator only ever talks to this trait.
pub trait DockerAdapter: Send + Sync {
    fn app_name(&self) -> &str;

    fn run_command(&self) -> Vec<String>;

    /// One-time initialisation of a fresh data volume.
    fn setup_command(&self) -> Vec<String>;

    /// Service port inside the container.
    fn port(&self) -> u16;

    fn environment(&self, data_path: &str) -> Vec<(String, String)>;

    fn image_tag(&self) -> String {
        format!("{}:latest", self.app_name())
    }

    fn prepare_container_name(&self, agent: &str) -> String {
        format!("{}_prepare_{agent}", self.app_name())
    }

    /// `"<port>/tcp"` as used in container port maps.
    fn container_port_key(&self) -> String {
        format!("{}/tcp", self.port())
    }
}

/// Mailpile webmail.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailpileAdapter;

impl MailpileAdapter {
    pub const PORT: u16 = 33411;
}

impl DockerAdapter for MailpileAdapter {
    fn app_name(&self) -> &'static str {
        "mailpile"
    }

    fn run_command(&self) -> Vec<String> {
        vec![
            "mailpile".to_string(),
            format!("--www=0.0.0.0:{}", Self::PORT),
            "--wait".to_string(),
        ]
    }

    fn setup_command(&self) -> Vec<String> {
        vec!["mailpile".to_string(), "--setup".to_string()]
    }

    fn port(&self) -> u16 {
        Self::PORT
    }

    fn environment(&self, data_path: &str) -> Vec<(String, String)> {
        vec![("MAILPILE_HOME".to_string(), data_path.to_string())]
    }
}

/// Adapter read from a YAML definition.
///
/// Environment values may contain `{data_path}`, replaced by the mount point.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CustomAdapter {
    pub app_name: String,
    pub run_command: Vec<String>,
    #[serde(default)]
    pub setup_command: Vec<String>,
    pub port: u16,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl DockerAdapter for CustomAdapter {
    fn app_name(&self) -> &str {
        &self.app_name
    }

    fn run_command(&self) -> Vec<String> {
        self.run_command.clone()
    }

    fn setup_command(&self) -> Vec<String> {
        self.setup_command.clone()
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn environment(&self, data_path: &str) -> Vec<(String, String)> {
        self.environment
            .iter()
            .map(|(k, v)| (k.clone(), v.replace("{data_path}", data_path)))
            .collect()
    }
}
