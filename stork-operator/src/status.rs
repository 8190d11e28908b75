//! Status evaluation - maps workload and relation state onto the unit status.

use std::fmt;

use serde::Serialize;

use crate::connection::ConnectionDescriptor;

pub const NOT_INSTALLED: &str = "workload not installed";
pub const RELATION_MISSING: &str = "database relation missing";
pub const RELATION_INCOMPLETE: &str = "database relation incomplete, check the logs";
pub const NOT_RUNNING: &str = "workload not running";

/// Facts about the workload, queried fresh from the workload collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadFacts {
    /// Installed version; `None` means the workload is not installed.
    pub version: Option<String>,
    pub running: bool,
    /// Free-form detail reported by the workload.
    pub status_detail: String,
}

impl WorkloadFacts {
    pub fn installed(&self) -> bool {
        self.version.is_some()
    }
}

/// Status published to the hosting runtime after every pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum StatusValue {
    Blocked(String),
    Active(String),
}

impl StatusValue {
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked(reason.into())
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Blocked(m) | Self::Active(m) => m,
        }
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked(reason) => write!(f, "blocked: {}", reason),
            Self::Active(detail) if detail.is_empty() => write!(f, "active"),
            Self::Active(detail) => write!(f, "active: {}", detail),
        }
    }
}

/// Evaluate the status to publish.
///
/// The checks run from the most fundamental failure outwards and the first
/// match wins:
/// 1. workload not installed
/// 2. no usable connection (relation missing or incomplete)
/// 3. workload not running
/// 4. active, with the workload's own detail
pub fn evaluate(
    facts: &WorkloadFacts,
    relation_present: bool,
    descriptor: Option<&ConnectionDescriptor>,
) -> StatusValue {
    if !facts.installed() {
        return StatusValue::blocked(NOT_INSTALLED);
    }

    if descriptor.is_none() {
        return if relation_present {
            StatusValue::blocked(RELATION_INCOMPLETE)
        } else {
            StatusValue::blocked(RELATION_MISSING)
        };
    }

    if !facts.running {
        return StatusValue::blocked(NOT_RUNNING);
    }

    StatusValue::Active(facts.status_detail.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{resolve, RelationInstance, RelationSnapshot};

    fn descriptor() -> ConnectionDescriptor {
        let snapshot = RelationSnapshot::new(vec![RelationInstance::new(
            1,
            [
                ("username", "u"),
                ("password", "p"),
                ("endpoints", "10.0.0.1:5432"),
            ],
        )]);
        resolve(&snapshot, true).unwrap().unwrap()
    }

    fn facts(version: Option<&str>, running: bool) -> WorkloadFacts {
        WorkloadFacts {
            version: version.map(str::to_string),
            running,
            status_detail: "serving on :8080".to_string(),
        }
    }

    #[test]
    fn not_installed_outranks_everything() {
        let d = descriptor();
        for (present, desc) in [(false, None), (true, None), (true, Some(&d))] {
            for running in [false, true] {
                assert_eq!(
                    evaluate(&facts(None, running), present, desc),
                    StatusValue::blocked(NOT_INSTALLED)
                );
            }
        }
    }

    #[test]
    fn missing_relation_is_blocked() {
        assert_eq!(
            evaluate(&facts(Some("1.19.0"), true), false, None),
            StatusValue::blocked(RELATION_MISSING)
        );
    }

    #[test]
    fn incomplete_relation_outranks_not_running() {
        assert_eq!(
            evaluate(&facts(Some("1.19.0"), false), true, None),
            StatusValue::blocked(RELATION_INCOMPLETE)
        );
    }

    #[test]
    fn not_running_outranks_active() {
        let d = descriptor();
        assert_eq!(
            evaluate(&facts(Some("1.19.0"), false), true, Some(&d)),
            StatusValue::blocked(NOT_RUNNING)
        );
    }

    #[test]
    fn active_carries_workload_detail() {
        let d = descriptor();
        let status = evaluate(&facts(Some("1.19.0"), true), true, Some(&d));
        assert!(status.is_active());
        assert_eq!(status.message(), "serving on :8080");
    }

    #[test]
    fn status_serializes_as_tagged_value() {
        let json = serde_json::to_value(StatusValue::blocked(NOT_RUNNING)).unwrap();
        assert_eq!(json["state"], "blocked");
        assert_eq!(json["message"], NOT_RUNNING);
    }

    #[test]
    fn display_formats() {
        assert_eq!(
            StatusValue::blocked(RELATION_MISSING).to_string(),
            "blocked: database relation missing"
        );
        assert_eq!(StatusValue::Active(String::new()).to_string(), "active");
    }
}
