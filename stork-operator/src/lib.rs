//! stork-operator: keeps an ISC Stork server configured against the
//! PostgreSQL database provided over its `database` relation.
//!
//! One process invocation handles one hook event:
//! - resolves the relation data into a connection descriptor
//! - decides whether to install, start, render and reload, defer or do nothing
//! - drives the workload collaborators accordingly
//! - evaluates the status to publish

pub mod clients;
pub mod connection;
pub mod reconciler;
pub mod status;

pub use connection::{resolve, ConnectionDescriptor, RelationInstance, RelationSnapshot};
pub use reconciler::{decide, Action, HookContext, HookEvent, PassOutcome, Reconciler};
pub use status::{evaluate, StatusValue, WorkloadFacts};
