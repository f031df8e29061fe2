//! Backup specs handed to the backup provider
//!
//! A [`BackupSpec`] is the declarative description of what the provider
//! should include and exclude. Two specs are built per pass: one for
//! cluster-scoped resources plus the selected namespaces, one for the
//! namespaced identity/policy resources across the whole cluster.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::NamespaceName;

/// Declarative backup description published on a relation
///
/// Every field is serialized, absent ones as `null`. An absent list and an
/// empty list mean different things to the provider: absent is "no
/// restriction", empty is "nothing".
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupSpec {
    /// Namespaces to include
    #[serde(default)]
    pub include_namespaces: Option<Vec<NamespaceName>>,
    /// Resource kinds to include
    #[serde(default)]
    pub include_resources: Option<Vec<String>>,
    /// Namespaces to exclude
    #[serde(default)]
    pub exclude_namespaces: Option<Vec<NamespaceName>>,
    /// Resource kinds to exclude
    #[serde(default)]
    pub exclude_resources: Option<Vec<String>>,
    /// Label selector (match labels)
    #[serde(default)]
    pub label_selector: Option<BTreeMap<String, String>>,
    /// TTL for backups
    #[serde(default)]
    pub ttl: Option<String>,
    /// Whether cluster-scoped resources travel with this backup
    #[serde(default)]
    pub include_cluster_resources: Option<bool>,
}

impl BackupSpec {
    /// Serialize to the JSON stored under the relation's `spec` key
    pub fn to_relation_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse the JSON stored under the relation's `spec` key
    pub fn from_relation_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

/// Resource kinds never taken by the cluster-scoped backup
///
/// Persistent volumes belong to their workload's own backup policy. Pods
/// are recreated by their owning controllers.
pub const CLUSTER_EXCLUDED_RESOURCES: &[&str] = &["persistentvolumes", "pods"];

/// Namespaced resource kinds critical to cluster function and security
pub const NAMESPACED_RESOURCES: &[&str] = &[
    "roles",
    "rolebindings",
    "networkpolicies",
    "resourcequotas",
    "limitranges",
    "serviceaccounts",
    "gateways",
    "grpcroutes",
    "httproutes",
    "tlsroutes",
    "ingresses",
    "configmaps",
    "secrets",
    "cronjobs",
    "jobs",
    "horizontalpodautoscalers",
    "verticalpodautoscalers",
];

/// Cilium policy kind, included when the cluster runs Cilium
pub const CILIUM_NETWORK_POLICIES: &str = "ciliumnetworkpolicies";

/// Build the list of namespaced resource kinds
pub fn build_namespaced_resources(include_cilium: bool) -> Vec<String> {
    let mut resources: Vec<String> = NAMESPACED_RESOURCES.iter().map(|s| s.to_string()).collect();
    if include_cilium {
        resources.push(CILIUM_NETWORK_POLICIES.to_string());
    }
    resources
}

/// Build the cluster-scoped spec
///
/// Includes the configured namespaces that exist in the cluster, sorted.
/// An empty intersection yields an empty (not absent) namespace list.
pub fn compute_cluster_scoped_spec(
    cluster_namespaces: &BTreeSet<String>,
    configured_namespaces: &BTreeSet<NamespaceName>,
) -> BackupSpec {
    // BTreeSet iteration is already ascending
    let include_namespaces = configured_namespaces
        .iter()
        .filter(|ns| cluster_namespaces.contains(ns.as_str()))
        .cloned()
        .collect();

    BackupSpec {
        include_namespaces: Some(include_namespaces),
        exclude_resources: Some(
            CLUSTER_EXCLUDED_RESOURCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ),
        include_cluster_resources: Some(true),
        ..Default::default()
    }
}

/// Build the namespace-scoped spec
///
/// Independent of cluster state; cluster-scoped resources are left to the
/// cluster-scoped spec.
pub fn compute_namespace_scoped_spec(include_cilium: bool) -> BackupSpec {
    BackupSpec {
        include_resources: Some(build_namespaced_resources(include_cilium)),
        include_cluster_resources: Some(false),
        ..Default::default()
    }
}
