//! Hook events and the per-event context delivered by the hosting runtime.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::connection::{RelationId, RelationSnapshot};

/// Lifecycle and relation events that trigger a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HookEvent {
    Install,
    Start,
    ConfigChanged,
    /// The provider created the requested database and published credentials.
    DatabaseCreated,
    EndpointsChanged,
    RelationBroken,
    UpdateStatus,
}

impl HookEvent {
    /// Events whose purpose is to (re)apply the database configuration.
    pub fn affects_config(self) -> bool {
        matches!(
            self,
            Self::ConfigChanged | Self::DatabaseCreated | Self::EndpointsChanged
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Start => "start",
            Self::ConfigChanged => "config-changed",
            Self::DatabaseCreated => "database-created",
            Self::EndpointsChanged => "endpoints-changed",
            Self::RelationBroken => "relation-broken",
            Self::UpdateStatus => "update-status",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of the database relations at the time the event fired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookContext {
    /// Live relation instances. A relation being broken is not listed.
    #[serde(default)]
    pub relations: Vec<RelationId>,
    #[serde(default)]
    pub relation_data: RelationSnapshot,
    /// Endpoints carried by an endpoints-changed event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<String>,
}

impl HookContext {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Whether at least one database relation is live.
    pub fn relation_present(&self) -> bool {
        !self.relations.is_empty()
    }
}

/// Database name requested from the provider for an application.
pub fn requested_database_name(app_name: &str) -> String {
    format!("{}_database", app_name.replace('-', "_"))
}
