//! Operator status resolution
//!
//! Folds the outcome of a reconcile pass into one [`Status`] with a stable,
//! operator-facing message.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::relation::RelationEndpoint;

/// Message shown when everything is in place
pub const READY_MSG: &str = "Ready";

/// Message shown while cluster facts cannot be fetched
pub const WAITING_FOR_NAMESPACES_MSG: &str = "Trying to get namespaces...";

/// Message shown when the controller lacks cluster permissions
pub const MISSING_TRUST_MSG: &str = "Missing '--trust': insufficient permissions";

/// Separator between aggregated issues
const ISSUE_SEPARATOR: &str = "; ";

/// Operator status, re-derived on every pass
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum Status {
    /// Specs are published and all requirements are met
    Active(String),
    /// A user action is required
    Blocked(String),
    /// A transient condition is expected to clear on a later pass
    Waiting(String),
}

impl Status {
    /// Lowercase status name (`active`, `blocked`, `waiting`)
    pub fn name(&self) -> &'static str {
        match self {
            Status::Active(_) => "active",
            Status::Blocked(_) => "blocked",
            Status::Waiting(_) => "waiting",
        }
    }

    /// The status message
    pub fn message(&self) -> &str {
        match self {
            Status::Active(m) | Status::Blocked(m) | Status::Waiting(m) => m,
        }
    }

    /// Whether this is [`Status::Active`]
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Active(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.message())
    }
}

/// Why a pass stopped before reaching status resolution with full facts
#[derive(Debug, Error)]
pub enum SetupError {
    /// The namespace selection is invalid; the user must fix it
    #[error(transparent)]
    Config(ConfigError),
    /// Cluster facts could not be fetched; a later pass may succeed
    #[error(transparent)]
    Cluster(GatewayError),
    /// A spec could not be written to a joined relation
    #[error("[{endpoint}] {source}")]
    Relation {
        /// Endpoint that rejected the write
        endpoint: RelationEndpoint,
        /// Underlying failure
        #[source]
        source: infra_backup_common::Error,
    },
}

impl SetupError {
    /// Operator-facing message for this failure
    pub fn message(&self) -> String {
        match self {
            SetupError::Config(e) => e.to_string(),
            SetupError::Cluster(_) => WAITING_FOR_NAMESPACES_MSG.to_string(),
            SetupError::Relation { endpoint, .. } => {
                format!("Failed to publish backup spec on relation: [{}]", endpoint)
            }
        }
    }

    /// Whether the failure clears without user action
    pub fn is_transient(&self) -> bool {
        !matches!(self, SetupError::Config(_))
    }
}

/// Per-endpoint relation presence, iterated in declared endpoint order
pub type RelationPresence = BTreeMap<RelationEndpoint, bool>;

/// Resolve the status for one pass
///
/// A setup error wins outright. Otherwise the missing permission is listed
/// first, followed by each absent relation in declared endpoint order.
pub fn resolve(
    setup_error: Option<&SetupError>,
    has_permission: bool,
    relation_presence: &RelationPresence,
) -> Status {
    if let Some(err) = setup_error {
        return if err.is_transient() {
            Status::Waiting(err.message())
        } else {
            Status::Blocked(err.message())
        };
    }

    let mut issues = Vec::new();
    if !has_permission {
        issues.push(MISSING_TRUST_MSG.to_string());
    }
    issues.extend(
        relation_presence
            .iter()
            .filter(|(_, present)| !**present)
            .map(|(endpoint, _)| format!("Missing relation: [{}]", endpoint)),
    );

    if issues.is_empty() {
        Status::Active(READY_MSG.to_string())
    } else {
        Status::Blocked(issues.join(ISSUE_SEPARATOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: RelationEndpoint = RelationEndpoint::ClusterInfraBackup;
    const B: RelationEndpoint = RelationEndpoint::NamespacedInfraBackup;

    fn presence(a: bool, b: bool) -> RelationPresence {
        // Insert in reverse to show declared order wins over insertion order
        let mut p = RelationPresence::new();
        p.insert(B, b);
        p.insert(A, a);
        p
    }

    #[test]
    fn missing_permission_only() {
        assert_eq!(
            resolve(None, false, &presence(true, true)),
            Status::Blocked("Missing '--trust': insufficient permissions".to_string())
        );
    }

    #[test]
    fn missing_single_relation() {
        assert_eq!(
            resolve(None, true, &presence(false, true)),
            Status::Blocked("Missing relation: [cluster-infra-backup]".to_string())
        );
        assert_eq!(
            resolve(None, true, &presence(true, false)),
            Status::Blocked("Missing relation: [namespaced-infra-backup]".to_string())
        );
    }

    #[test]
    fn missing_both_relations() {
        assert_eq!(
            resolve(None, true, &presence(false, false)),
            Status::Blocked(
                "Missing relation: [cluster-infra-backup]; \
                 Missing relation: [namespaced-infra-backup]"
                    .to_string()
            )
        );
    }

    #[test]
    fn permission_issue_precedes_relation_issues() {
        assert_eq!(
            resolve(None, false, &presence(false, false)),
            Status::Blocked(
                "Missing '--trust': insufficient permissions; \
                 Missing relation: [cluster-infra-backup]; \
                 Missing relation: [namespaced-infra-backup]"
                    .to_string()
            )
        );
    }

    #[test]
    fn all_requirements_met_is_ready() {
        assert_eq!(
            resolve(None, true, &presence(true, true)),
            Status::Active("Ready".to_string())
        );
    }

    #[test]
    fn only_declared_endpoints_are_checked() {
        let mut p = RelationPresence::new();
        p.insert(A, true);
        assert!(resolve(None, true, &p).is_active());
    }

    #[test]
    fn config_error_blocks() {
        let err = SetupError::Config(ConfigError::InvalidName("-bad".to_string()));
        assert_eq!(
            resolve(Some(&err), true, &presence(true, true)),
            Status::Blocked("invalid namespace name: '-bad'".to_string())
        );
    }

    #[test]
    fn cluster_error_waits_regardless_of_other_inputs() {
        let err = SetupError::Cluster(GatewayError::Unavailable("connection refused".to_string()));
        assert_eq!(
            resolve(Some(&err), false, &presence(false, false)),
            Status::Waiting("Trying to get namespaces...".to_string())
        );
    }

    #[test]
    fn relation_publish_error_waits() {
        let err = SetupError::Relation {
            endpoint: B,
            source: infra_backup_common::Error::relation(B.name(), "conflict"),
        };
        assert_eq!(
            resolve(Some(&err), true, &presence(true, true)),
            Status::Waiting(
                "Failed to publish backup spec on relation: [namespaced-infra-backup]".to_string()
            )
        );
    }

    #[test]
    fn setup_errors_display_and_chain() {
        use std::error::Error as _;

        let err = SetupError::Config(ConfigError::Empty);
        assert_eq!(err.to_string(), "the namespaces config cannot be empty");

        let err = SetupError::Relation {
            endpoint: A,
            source: infra_backup_common::Error::relation(A.name(), "conflict"),
        };
        assert_eq!(
            err.to_string(),
            "[cluster-infra-backup] relation error [cluster-infra-backup]: conflict"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn status_accessors() {
        let status = Status::Blocked("x".to_string());
        assert_eq!(status.name(), "blocked");
        assert_eq!(status.message(), "x");
        assert!(!status.is_active());
        assert_eq!(status.to_string(), "blocked: x");
    }

    #[test]
    fn status_serializes_tagged() {
        let json = serde_json::to_value(Status::Waiting("later".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "waiting", "message": "later"}));
    }
}
