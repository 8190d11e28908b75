//! Reconciler for hook events.
//!
//! Each pass resolves the database relation, decides what to do about the
//! triggering event, asks the collaborators to do it and then evaluates the
//! status to publish. Nothing is carried over between passes.

pub mod hook;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};

use crate::clients::{ConfigRenderer, Workload};
use crate::connection::{resolve, ConnectionDescriptor};
use crate::status::{evaluate, StatusValue, WorkloadFacts};

pub use hook::{requested_database_name, HookContext, HookEvent};

/// What a pass decided to do about its event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    NoOp,
    /// Required relation data is missing; redeliver the event later.
    Defer,
    InstallWorkload,
    StartWorkload,
    RenderAndReload {
        descriptor: ConnectionDescriptor,
        /// Initialise the database schema before rendering.
        initialize_database: bool,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::NoOp => "no-op",
            Action::Defer => "defer",
            Action::InstallWorkload => "install-workload",
            Action::StartWorkload => "start-workload",
            Action::RenderAndReload { .. } => "render-and-reload",
        }
    }
}

/// Decide the action for an event given the resolved connection.
///
/// Config-affecting events without a usable connection defer. Relation
/// removal deliberately leaves the workload alone.
pub fn decide(event: HookEvent, descriptor: Option<&ConnectionDescriptor>) -> Action {
    if event.affects_config() {
        return match descriptor {
            Some(descriptor) => Action::RenderAndReload {
                descriptor: descriptor.clone(),
                initialize_database: event == HookEvent::DatabaseCreated,
            },
            None => Action::Defer,
        };
    }

    match event {
        HookEvent::Install => Action::InstallWorkload,
        HookEvent::Start => Action::StartWorkload,
        _ => Action::NoOp,
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub event: HookEvent,
    pub action: Action,
    pub status: StatusValue,
    pub workload_version: Option<String>,
}

impl PassOutcome {
    /// The event has not been handled and must be redelivered.
    pub fn deferred(&self) -> bool {
        self.action == Action::Defer
    }

    pub fn report(&self) -> PassReport<'_> {
        PassReport {
            event: self.event,
            action: self.action.name(),
            deferred: self.deferred(),
            status: &self.status,
            workload_version: self.workload_version.as_deref(),
        }
    }
}

/// Serializable summary of a pass, handed back to the hosting runtime.
#[derive(Debug, Serialize)]
pub struct PassReport<'a> {
    pub event: HookEvent,
    pub action: &'static str,
    pub deferred: bool,
    pub status: &'a StatusValue,
    pub workload_version: Option<&'a str>,
}

/// Reconciler that drives the workload and its configuration.
pub struct Reconciler<W, R> {
    workload: W,
    renderer: R,
}

impl<W: Workload, R: ConfigRenderer> Reconciler<W, R> {
    pub fn new(workload: W, renderer: R) -> Self {
        Self { workload, renderer }
    }

    /// Run one pass for `event`.
    ///
    /// A deferred pass performs no side effects but still reports status.
    /// Collaborator failures abort the pass with an error.
    pub async fn handle(&self, event: HookEvent, ctx: &HookContext) -> Result<PassOutcome> {
        info!(%event, relations = ctx.relations.len(), "Reconciling");

        if event == HookEvent::EndpointsChanged {
            info!(
                endpoints = ctx.endpoints.as_deref().unwrap_or("<unknown>"),
                "Database endpoints changed"
            );
        }

        let relation_present = ctx.relation_present();
        let descriptor = resolve(&ctx.relation_data, relation_present)
            .context("Failed to resolve database relation")?;

        let action = decide(event, descriptor.as_ref());
        info!(%event, action = action.name(), "Decided action");

        self.apply(&action).await?;

        let facts = self.facts().await;
        let status = evaluate(&facts, relation_present, descriptor.as_ref());
        info!(%event, %status, "Reconciliation pass complete");

        Ok(PassOutcome {
            event,
            action,
            status,
            workload_version: facts.version,
        })
    }

    /// Execute an action against the collaborators.
    pub async fn apply(&self, action: &Action) -> Result<()> {
        match action {
            Action::NoOp => Ok(()),
            Action::Defer => {
                info!("Deferring until database relation data is complete");
                Ok(())
            }
            Action::InstallWorkload => {
                info!("Installing workload");
                self.workload.install().await.map_err(|e| {
                    error!("Failed to install workload: {:#}", e);
                    e.context("Failed to install workload")
                })
            }
            Action::StartWorkload => {
                info!("Starting workload");
                self.workload.start().await.map_err(|e| {
                    error!("Failed to start workload: {:#}", e);
                    e.context("Failed to start workload")
                })
            }
            Action::RenderAndReload {
                descriptor,
                initialize_database,
            } => {
                if *initialize_database {
                    info!(
                        database = descriptor.database().unwrap_or_default(),
                        host = descriptor.host(),
                        "Initializing database"
                    );
                    self.workload
                        .init_database(descriptor)
                        .await
                        .map_err(|e| {
                            error!("Failed to initialize database: {:#}", e);
                            e.context("Failed to initialize database")
                        })?;
                }

                info!(host = descriptor.host(), port = descriptor.port(), "Rendering configuration");
                self.renderer
                    .render_and_reload(descriptor)
                    .await
                    .map_err(|e| {
                        error!("Failed to render configuration: {:#}", e);
                        e.context("Failed to render and reload configuration")
                    })
            }
        }
    }

    /// Evaluate the status from the current relation context without acting.
    pub async fn collect_status(&self, ctx: &HookContext) -> Result<StatusValue> {
        let relation_present = ctx.relation_present();
        let descriptor = resolve(&ctx.relation_data, relation_present)
            .context("Failed to resolve database relation")?;
        let facts = self.facts().await;
        Ok(evaluate(&facts, relation_present, descriptor.as_ref()))
    }

    /// Query the workload. Never cached, so status is always current.
    async fn facts(&self) -> WorkloadFacts {
        WorkloadFacts {
            version: self.workload.get_version().await,
            running: self.workload.is_running().await,
            status_detail: self.workload.get_status_detail().await,
        }
    }
}
