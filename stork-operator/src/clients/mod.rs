//! Collaborators that touch the host.
//!
//! - workload: the Stork server package and its systemd unit
//! - render: the server environment file the unit reads its database from

pub mod render;
pub mod workload;

use std::process::Output;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::connection::ConnectionDescriptor;

pub use render::EnvFileRenderer;
pub use workload::StorkServer;

/// The managed workload.
#[async_trait]
pub trait Workload: Send + Sync {
    /// Installed version, `None` if the workload is not installed.
    async fn get_version(&self) -> Option<String>;

    async fn is_running(&self) -> bool;

    /// Free-form detail for the active status.
    async fn get_status_detail(&self) -> String;

    async fn install(&self) -> Result<()>;

    async fn start(&self) -> Result<()>;

    /// Create the workload's schema in a freshly provisioned database.
    async fn init_database(&self, descriptor: &ConnectionDescriptor) -> Result<()>;
}

/// Writes the workload configuration and makes the workload pick it up.
///
/// Must be idempotent: the same descriptor may be applied on every pass.
#[async_trait]
pub trait ConfigRenderer: Send + Sync {
    async fn render_and_reload(&self, descriptor: &ConnectionDescriptor) -> Result<()>;
}

/// Run a command to completion, failing on a non-zero exit status.
///
/// Only the program name is logged; arguments and environment may carry
/// credentials.
pub(crate) async fn run(cmd: &mut Command) -> Result<Output> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    debug!(%program, "Running command");
    let output = cmd
        .output()
        .await
        .with_context(|| format!("Failed to spawn {}", program))?;

    if !output.status.success() {
        bail!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(output)
}

/// Whether a systemd unit is active.
pub(crate) async fn service_active(service: &str) -> bool {
    Command::new("systemctl")
        .args(["is-active", "--quiet", service])
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

pub(crate) async fn service_restart(service: &str) -> Result<()> {
    run(Command::new("systemctl").args(["restart", service]))
        .await
        .with_context(|| format!("Failed to restart {}", service))?;
    Ok(())
}
