//! File-backed credential store: `<root>/<name>/credentials.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::application::ports::CredentialStore;
use crate::domain::agent::{instance_path, validate_agent_name};
use crate::domain::credentials::{PasswordDigest, generate_salt};
use crate::domain::error::AgentStoreError;

const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Serialize, Deserialize)]
struct CredentialsFile {
    #[serde(flatten)]
    digest: PasswordDigest,
    created_at: DateTime<Utc>,
}

pub struct FileCredentialStore {
    root: PathBuf,
}

impl FileCredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn credentials_path(&self, name: &str) -> PathBuf {
        instance_path(&self.root, name).join(CREDENTIALS_FILE)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.root.display()));
            }
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_agent_name(&name).is_ok() && self.exists(&name).await? {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        validate_agent_name(name)?;
        Ok(tokio::fs::try_exists(self.credentials_path(name)).await?)
    }

    async fn create(&self, name: &str, password: &str) -> Result<()> {
        validate_agent_name(name)?;
        let dir = instance_path(&self.root, name);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;

        let file = CredentialsFile {
            digest: PasswordDigest::new(&generate_salt(), password),
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        write_new(&self.credentials_path(name), &json)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => AgentStoreError::AlreadyExists(name.to_string()).into(),
                _ => anyhow::Error::new(e).context(format!("writing credentials of {name}")),
            })
    }

    async fn verify(&self, name: &str, password: &str) -> Result<bool> {
        validate_agent_name(name)?;
        let raw = match tokio::fs::read(self.credentials_path(name)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AgentStoreError::NotFound(name.to_string()).into());
            }
            Err(e) => return Err(e).with_context(|| format!("reading credentials of {name}")),
        };
        let file: CredentialsFile = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing credentials of {name}"))?;
        Ok(file.digest.verify(password))
    }
}

/// Writes `content` to a file that must not exist yet, readable by the owner only.
async fn write_new(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(content).await?;
    file.flush().await
}
