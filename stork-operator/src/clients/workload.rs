//! Stork server workload backed by apt and systemd.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{run, service_active, Workload};
use crate::connection::ConnectionDescriptor;

/// ISC's apt repository setup script for Stork packages.
const REPO_SETUP_URL: &str = "https://dl.cloudsmith.io/public/isc/stork/cfg/setup/bash.deb.sh";

pub const PACKAGE: &str = "isc-stork-server";

/// The Stork server installed on this machine.
pub struct StorkServer {
    service: String,
}

impl StorkServer {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[async_trait]
impl Workload for StorkServer {
    async fn get_version(&self) -> Option<String> {
        let output = run(Command::new("stork-server").arg("--version"))
            .await
            .map_err(|e| debug!("No Stork server version: {:#}", e))
            .ok()?;
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!version.is_empty()).then_some(version)
    }

    async fn is_running(&self) -> bool {
        service_active(&self.service).await
    }

    async fn get_status_detail(&self) -> String {
        match run(Command::new("systemctl").args([
            "show",
            "--property=SubState",
            "--value",
            self.service.as_str(),
        ]))
        .await
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout).trim().to_string(),
            Err(e) => {
                debug!("No status detail for {}: {:#}", self.service, e);
                String::new()
            }
        }
    }

    async fn install(&self) -> Result<()> {
        info!("Adding Stork apt repository");
        run(Command::new("bash")
            .args(["-o", "pipefail", "-c"])
            .arg(format!("curl -1sLf {} | bash", REPO_SETUP_URL)))
        .await
        .context("Failed to add Stork apt repository")?;

        info!("Installing {}", PACKAGE);
        run(Command::new("apt-get")
            .args(["install", "-y", PACKAGE])
            .env("DEBIAN_FRONTEND", "noninteractive"))
        .await
        .with_context(|| format!("Failed to install {}", PACKAGE))?;

        Ok(())
    }

    async fn start(&self) -> Result<()> {
        run(Command::new("systemctl").args(["enable", "--now", self.service.as_str()]))
            .await
            .with_context(|| format!("Failed to start {}", self.service))?;
        Ok(())
    }

    async fn init_database(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        let mut cmd = db_init_command(descriptor);
        let output = run(&mut cmd).await.context("stork-tool db-init failed")?;
        debug!(
            "Database init output: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

/// `stork-tool db-init` for a database. The password goes through the
/// environment so it never shows up in the process list.
fn db_init_command(descriptor: &ConnectionDescriptor) -> Command {
    let mut cmd = Command::new("stork-tool");
    cmd.arg("db-init")
        .arg(format!("--db-host={}", descriptor.host()))
        .arg(format!("--db-port={}", descriptor.port()))
        .arg(format!("--db-user={}", descriptor.user()))
        .env("STORK_DATABASE_PASSWORD", descriptor.password());
    if let Some(name) = descriptor.database() {
        cmd.arg(format!("--db-name={}", name));
    }
    cmd
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;
    use crate::connection::{resolve, RelationInstance, RelationSnapshot};

    fn descriptor(database: Option<&str>) -> ConnectionDescriptor {
        let mut data = vec![
            ("username", "stork"),
            ("password", "s3cret-pw"),
            ("endpoints", "10.0.0.1:5432"),
        ];
        if let Some(db) = database {
            data.push(("database", db));
        }
        let snapshot = RelationSnapshot::new(vec![RelationInstance::new(1, data)]);
        resolve(&snapshot, true).unwrap().unwrap()
    }

    #[test]
    fn db_init_keeps_password_out_of_argv() {
        let cmd = db_init_command(&descriptor(Some("stork_database")));
        let inner = cmd.as_std();

        assert_eq!(inner.get_program(), "stork-tool");
        let args: Vec<String> = inner
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "db-init",
                "--db-host=10.0.0.1",
                "--db-port=5432",
                "--db-user=stork",
                "--db-name=stork_database",
            ]
        );
        assert!(args.iter().all(|a| !a.contains("s3cret-pw")));

        let password = inner
            .get_envs()
            .find(|(k, _)| *k == OsStr::new("STORK_DATABASE_PASSWORD"))
            .and_then(|(_, v)| v);
        assert_eq!(password, Some(OsStr::new("s3cret-pw")));
    }

    #[test]
    fn db_init_omits_missing_database_name() {
        let cmd = db_init_command(&descriptor(None));
        assert!(cmd
            .as_std()
            .get_args()
            .all(|a| !a.to_string_lossy().starts_with("--db-name")));
    }
}
