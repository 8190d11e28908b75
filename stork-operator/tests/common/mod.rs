//! Fake collaborators for stork-operator integration tests.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use stork_operator::clients::{ConfigRenderer, Workload};
use stork_operator::{ConnectionDescriptor, HookContext, RelationInstance, RelationSnapshot};

/// Ordered record of collaborator calls, shared by the fakes.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Workload with scripted facts that records every action.
pub struct FakeWorkload {
    pub version: Option<String>,
    pub running: bool,
    pub detail: String,
    pub fail_install: bool,
    pub fail_start: bool,
    pub fail_init: bool,
    pub calls: CallLog,
}

impl FakeWorkload {
    pub fn installed(calls: &CallLog) -> Self {
        Self {
            version: Some("1.19.0".to_string()),
            running: true,
            detail: "running".to_string(),
            fail_install: false,
            fail_start: false,
            fail_init: false,
            calls: Arc::clone(calls),
        }
    }

    pub fn not_installed(calls: &CallLog) -> Self {
        Self {
            version: None,
            running: false,
            detail: String::new(),
            ..Self::installed(calls)
        }
    }
}

#[async_trait]
impl Workload for FakeWorkload {
    async fn get_version(&self) -> Option<String> {
        self.version.clone()
    }

    async fn is_running(&self) -> bool {
        self.running
    }

    async fn get_status_detail(&self) -> String {
        self.detail.clone()
    }

    async fn install(&self) -> Result<()> {
        self.calls.lock().await.push("install".to_string());
        if self.fail_install {
            bail!("apt-get exited with 100");
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.calls.lock().await.push("start".to_string());
        if self.fail_start {
            bail!("systemctl exited with 1");
        }
        Ok(())
    }

    async fn init_database(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        self.calls
            .lock()
            .await
            .push(format!("init:{}", descriptor.host()));
        if self.fail_init {
            bail!("stork-tool exited with 1");
        }
        Ok(())
    }
}

/// Renderer that records the descriptors it was handed.
pub struct FakeRenderer {
    pub fail: bool,
    pub calls: CallLog,
    pub rendered: Arc<Mutex<Vec<ConnectionDescriptor>>>,
}

impl FakeRenderer {
    pub fn new(calls: &CallLog) -> Self {
        Self {
            fail: false,
            calls: Arc::clone(calls),
            rendered: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ConfigRenderer for FakeRenderer {
    async fn render_and_reload(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        self.calls
            .lock()
            .await
            .push(format!("render:{}", descriptor.host()));
        if self.fail {
            bail!("systemctl exited with 5");
        }
        self.rendered.lock().await.push(descriptor.clone());
        Ok(())
    }
}

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Context with one live relation carrying `data`.
pub fn context_with(data: &[(&str, &str)]) -> HookContext {
    HookContext {
        relations: vec![4],
        relation_data: RelationSnapshot::new(vec![RelationInstance::new(
            4,
            data.iter().copied(),
        )]),
        endpoints: None,
    }
}

/// Relation data published by a provider that has created the database.
pub fn complete_data() -> Vec<(&'static str, &'static str)> {
    vec![
        ("username", "u"),
        ("password", "p"),
        ("endpoints", "10.0.0.1:5432"),
        ("database", "db"),
    ]
}
