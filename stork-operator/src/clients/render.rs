//! Renders the Stork server environment file and restarts the server.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{service_active, service_restart, ConfigRenderer};
use crate::connection::ConnectionDescriptor;

pub const DEFAULT_ENV_FILE: &str = "/etc/stork/server.env";

/// Render the environment file contents for a descriptor.
///
/// Pure function of the descriptor: equal descriptors give identical bytes.
pub fn render_server_env(descriptor: &ConnectionDescriptor) -> String {
    let mut lines = vec![
        "# Managed by stork-operator. Local changes will be overwritten.".to_string(),
        env_line("STORK_DATABASE_HOST", descriptor.host()),
        env_line("STORK_DATABASE_PORT", descriptor.port()),
    ];
    if let Some(name) = descriptor.database() {
        lines.push(env_line("STORK_DATABASE_NAME", name));
    }
    lines.push(env_line("STORK_DATABASE_USER_NAME", descriptor.user()));
    lines.push(env_line("STORK_DATABASE_PASSWORD", descriptor.password()));
    lines.push(env_line("STORK_DATABASE_OPTIONS", descriptor.options()));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// `KEY="value"` with the quoting systemd's EnvironmentFile expects.
fn env_line(key: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("{}=\"{}\"", key, escaped)
}

/// Writes the environment file the Stork server unit loads.
pub struct EnvFileRenderer {
    path: PathBuf,
    service: String,
}

impl EnvFileRenderer {
    pub fn new(path: impl Into<PathBuf>, service: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            service: service.into(),
        }
    }

    /// Write the rendered file, returning whether its contents changed.
    ///
    /// The file is written next to its destination and renamed into place,
    /// so the server never reads a partial file.
    pub async fn write(&self, descriptor: &ConnectionDescriptor) -> Result<bool> {
        let rendered = render_server_env(descriptor);

        match tokio::fs::read_to_string(&self.path).await {
            Ok(current) if current == rendered => {
                debug!(path = %self.path.display(), "Environment file unchanged");
                return Ok(false);
            }
            _ => {}
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.tmp_path();
        if let Err(e) = write_private(&tmp, rendered.as_bytes()).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e)
                .with_context(|| format!("Failed to move {} into place", tmp.display()));
        }

        info!(path = %self.path.display(), "Environment file written");
        Ok(true)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Write `contents` to a file only its owner can read.
///
/// The mode is applied at creation time; an existing file is narrowed to
/// 0600 before it is truncated.
async fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o600)
        .open(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .await
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    file.set_len(0)
        .await
        .with_context(|| format!("Failed to truncate {}", path.display()))?;
    file.write_all(contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.sync_all()
        .await
        .with_context(|| format!("Failed to sync {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl ConfigRenderer for EnvFileRenderer {
    async fn render_and_reload(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        let changed = self.write(descriptor).await?;

        // A stopped server is restarted even when nothing changed.
        if changed || !service_active(&self.service).await {
            info!("Restarting {}", self.service);
            service_restart(&self.service).await?;
        }

        Ok(())
    }
}
