//! Common types for the infra backup operator: errors, telemetry, and labels

#![deny(missing_docs)]

pub mod error;
pub mod telemetry;

pub use error::Error;

/// Field manager used for every server-side apply and patch
pub const FIELD_MANAGER: &str = "infra-backup-operator";

/// Default namespace for the operator's own ConfigMaps
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "infra-backup";

/// Label key identifying which relation endpoint a peer ConfigMap joins
pub const RELATION_LABEL_KEY: &str = "infra-backup.io/relation";

/// Standard Kubernetes label for the managing tool
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] for resources written by this operator
pub const LABEL_MANAGED_BY_INFRA_BACKUP: &str = "infra-backup-operator";
