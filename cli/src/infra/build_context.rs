//! Build contexts for application images, read from the resources directory.
//!
//! `init-<app>-docker-context.sh` wins over `Dockerfile.<app>`: the script
//! runs in a scratch directory whose contents become the context.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::application::ports::{BuildContextSource, CommandRunner};

pub struct ResourceBuildContext<R> {
    resources_dir: PathBuf,
    runner: R,
    script_timeout: Duration,
}

impl<R: CommandRunner> ResourceBuildContext<R> {
    pub fn new(resources_dir: impl Into<PathBuf>, runner: R, script_timeout: Duration) -> Self {
        Self {
            resources_dir: resources_dir.into(),
            runner,
            script_timeout,
        }
    }

    async fn from_script(&self, script: &Path) -> Result<Bytes> {
        let workdir = tempfile::tempdir().context("creating build directory")?;
        let script_arg = script.to_string_lossy();
        info!(script = %script.display(), "generating build context");
        let output = self
            .runner
            .run_in("sh", &[script_arg.as_ref()], workdir.path(), self.script_timeout)
            .await?;
        if !output.status.success() {
            bail!(
                "{} failed ({}): {}",
                script.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let dir = workdir.path().to_path_buf();
        let archive = tokio::task::spawn_blocking(move || directory_archive(&dir))
            .await
            .context("packing build context")??;
        Ok(archive)
    }
}

#[async_trait]
impl<R: CommandRunner> BuildContextSource for ResourceBuildContext<R> {
    async fn build_context(&self, app_name: &str) -> Result<Bytes> {
        let script = self
            .resources_dir
            .join(format!("init-{app_name}-docker-context.sh"));
        if tokio::fs::try_exists(&script).await.unwrap_or(false) {
            return self.from_script(&script).await;
        }

        let dockerfile = self.resources_dir.join(format!("Dockerfile.{app_name}"));
        if tokio::fs::try_exists(&dockerfile).await.unwrap_or(false) {
            let content = tokio::fs::read(&dockerfile)
                .await
                .with_context(|| format!("reading {}", dockerfile.display()))?;
            return dockerfile_archive(&content);
        }

        bail!(
            "no build resources for '{app_name}' in {}",
            self.resources_dir.display()
        )
    }
}

fn directory_archive(dir: &Path) -> Result<Bytes> {
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_dir_all(".", dir)
        .with_context(|| format!("archiving {}", dir.display()))?;
    Ok(Bytes::from(builder.into_inner()?))
}

/// Single-entry archive holding `content` as `Dockerfile`.
fn dockerfile_archive(content: &[u8]) -> Result<Bytes> {
    let mut header = tar::Header::new_gnu();
    header.set_size(u64::try_from(content.len())?);
    header.set_mode(0o644);
    header.set_cksum();
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, "Dockerfile", content)?;
    Ok(Bytes::from(builder.into_inner()?))
}
