//! Reconciliation core for the infrastructure backup operator
//!
//! Given the namespace selection and live cluster facts, computes the
//! backup specs to hand to the backup provider and the operator status:
//!
//! - **config**: validates the comma-separated `namespaces` selection
//! - **spec**: builds the cluster-scoped and namespace-scoped [`BackupSpec`]s
//! - **status**: folds setup errors, permission and relation presence into a [`Status`]
//! - **reconcile**: sequences one pass per [`Event`]
//! - **gateway**, **relation**, **sink**: seams to the cluster, the relation
//!   transport and the status destination, with kube-backed implementations

#![deny(missing_docs)]

pub mod config;
pub mod gateway;
pub mod reconcile;
pub mod relation;
pub mod sink;
pub mod spec;
pub mod status;

pub use config::{validate, ConfigError, NamespaceConfig, NamespaceName};
pub use gateway::{ClusterFacts, GatewayError, KubeClusterFacts};
pub use reconcile::{build_specs, Event, PassOutcome, ReconcileSettings, Reconciler, Stage};
pub use relation::{ConfigMapRelations, RelationEndpoint, RelationHub};
pub use sink::{ConfigMapStatusSink, StatusSink};
pub use spec::{compute_cluster_scoped_spec, compute_namespace_scoped_spec, BackupSpec};
pub use status::{resolve, RelationPresence, SetupError, Status};
