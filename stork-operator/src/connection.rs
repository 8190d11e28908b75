//! Connection resolution - turns raw database relation data into a validated
//! connection descriptor.
//!
//! The provider publishes its fields asynchronously, so a relation can exist
//! long before it carries usable credentials. Anything short of a complete
//! `username` / `password` / `endpoints` triple resolves to `None`.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// libpq connection options applied to every Stork database connection.
pub const DB_OPTIONS: &str =
    "connect_timeout=5 keepalives=1 keepalives_idle=30 keepalives_count=1 tcp_user_timeout=30";

/// Relation data field names published by the database provider.
pub mod fields {
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const ENDPOINTS: &str = "endpoints";
    pub const DATABASE: &str = "database";
}

/// Host value published by providers that have not allocated an endpoint yet.
const PLACEHOLDER_HOST: &str = "None";

/// Identifier of a live relation instance.
pub type RelationId = u32;

/// Errors raised while resolving relation data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The runtime reported a live relation but supplied no data for it.
    #[error("database relation reported present but the relation data snapshot is empty")]
    EmptySnapshot,
}

/// Data bag of a single relation instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationInstance {
    pub id: RelationId,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl RelationInstance {
    pub fn new<K, V>(id: RelationId, data: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id,
            data: data
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }
}

/// Relation data of every live database relation, in delivery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationSnapshot {
    instances: Vec<RelationInstance>,
}

impl RelationSnapshot {
    pub fn new(instances: Vec<RelationInstance>) -> Self {
        Self { instances }
    }

    /// The instance consulted for connection data.
    ///
    /// Only the first entry is ever used. If several providers publish
    /// different credentials, the later ones are ignored.
    pub fn first(&self) -> Option<&RelationInstance> {
        self.instances.first()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl FromIterator<RelationInstance> for RelationSnapshot {
    fn from_iter<I: IntoIterator<Item = RelationInstance>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Validated database connection parameters.
///
/// Only [`resolve`] builds one, and it is always complete. It is recomputed
/// on every pass and never stored.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    database: Option<String>,
    user: String,
    password: String,
    host: String,
    port: String,
}

impl ConnectionDescriptor {
    /// Database name, if the provider published one.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn options(&self) -> &'static str {
        DB_OPTIONS
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("options", &DB_OPTIONS)
            .finish()
    }
}

/// Resolve the relation snapshot into a connection descriptor.
///
/// Returns `Ok(None)` when there is no relation or its data is incomplete.
/// `Err` means the caller handed over an empty snapshot for a relation it
/// claims is live, which is a bug on the caller's side and not missing data.
pub fn resolve(
    snapshot: &RelationSnapshot,
    relation_present: bool,
) -> Result<Option<ConnectionDescriptor>, ResolveError> {
    if !relation_present {
        return Ok(None);
    }

    let instance = snapshot.first().ok_or(ResolveError::EmptySnapshot)?;

    let (Some(user), Some(password), Some(endpoints)) = (
        instance.field(fields::USERNAME),
        instance.field(fields::PASSWORD),
        instance.field(fields::ENDPOINTS),
    ) else {
        warn!(
            relation_id = instance.id,
            missing = ?missing_fields(instance),
            "Database relation data incomplete"
        );
        return Ok(None);
    };

    let Some((host, port)) = endpoints.split_once(':') else {
        warn!(
            relation_id = instance.id,
            endpoints, "Database endpoints are not in host:port form"
        );
        return Ok(None);
    };

    // A port carrying another separator means a multi-endpoint list.
    if port.contains([':', ',']) {
        warn!(
            relation_id = instance.id,
            endpoints, "Database endpoints must be a single host:port"
        );
        return Ok(None);
    }

    if host.is_empty() || host == PLACEHOLDER_HOST {
        warn!(
            relation_id = instance.id,
            endpoints, "Database host has not been published yet"
        );
        return Ok(None);
    }

    debug!(relation_id = instance.id, host, port, "Resolved database connection");

    Ok(Some(ConnectionDescriptor {
        database: instance.field(fields::DATABASE).map(str::to_string),
        user: user.to_string(),
        password: password.to_string(),
        host: host.to_string(),
        port: port.to_string(),
    }))
}

fn missing_fields(instance: &RelationInstance) -> Vec<&'static str> {
    [fields::USERNAME, fields::PASSWORD, fields::ENDPOINTS]
        .into_iter()
        .filter(|name| instance.field(name).is_none())
        .collect()
}
