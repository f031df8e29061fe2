//! Relation endpoints and the transport that publishes specs on them
//!
//! A peer joins an endpoint by creating a ConfigMap in the operator
//! namespace labelled `infra-backup.io/relation=<endpoint>`. The operator
//! writes the endpoint's spec into the `spec` key of every such ConfigMap.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use infra_backup_common::{Error, FIELD_MANAGER, RELATION_LABEL_KEY};

use crate::spec::BackupSpec;

#[cfg(test)]
use mockall::automock;

/// Key under which the spec JSON is stored in relation data
pub const SPEC_DATA_KEY: &str = "spec";

/// A named integration point with the backup provider
///
/// Variant order is the declared order used when reporting missing
/// relations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationEndpoint {
    /// Receives the cluster-scoped spec
    ClusterInfraBackup,
    /// Receives the namespace-scoped spec
    NamespacedInfraBackup,
}

impl RelationEndpoint {
    /// Every endpoint, in declared order
    pub const ALL: [RelationEndpoint; 2] = [
        RelationEndpoint::ClusterInfraBackup,
        RelationEndpoint::NamespacedInfraBackup,
    ];

    /// Endpoint name as seen by peers
    pub fn name(&self) -> &'static str {
        match self {
            RelationEndpoint::ClusterInfraBackup => "cluster-infra-backup",
            RelationEndpoint::NamespacedInfraBackup => "namespaced-infra-backup",
        }
    }

    /// Label selector matching peer ConfigMaps on this endpoint
    pub fn label_selector(&self) -> String {
        format!("{}={}", RELATION_LABEL_KEY, self.name())
    }
}

impl fmt::Display for RelationEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RelationEndpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationEndpoint::ALL
            .into_iter()
            .find(|e| e.name() == s)
            .ok_or_else(|| format!("unknown relation endpoint: '{}'", s))
    }
}

/// Transport for relation presence and published specs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RelationHub: Send + Sync {
    /// Whether at least one peer has joined the endpoint
    async fn is_related(&self, endpoint: RelationEndpoint) -> bool;

    /// Publish a spec to every peer on the endpoint
    async fn publish(&self, endpoint: RelationEndpoint, spec: &BackupSpec) -> Result<(), Error>;
}

/// [`RelationHub`] backed by labelled ConfigMaps
pub struct ConfigMapRelations {
    client: Client,
    namespace: String,
}

impl ConfigMapRelations {
    /// Create a relation hub for peers in `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    async fn peers(&self, endpoint: RelationEndpoint) -> Result<Vec<ConfigMap>, kube::Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let params = ListParams::default().labels(&endpoint.label_selector());
        Ok(api.list(&params).await?.items)
    }
}

#[async_trait]
impl RelationHub for ConfigMapRelations {
    async fn is_related(&self, endpoint: RelationEndpoint) -> bool {
        match self.peers(endpoint).await {
            Ok(peers) => !peers.is_empty(),
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Failed to look up relation peers");
                false
            }
        }
    }

    async fn publish(&self, endpoint: RelationEndpoint, spec: &BackupSpec) -> Result<(), Error> {
        let data = spec
            .to_relation_json()
            .map_err(|e| Error::serialization_for_kind("BackupSpec", e.to_string()))?;

        let peers = self
            .peers(endpoint)
            .await
            .map_err(|e| Error::relation(endpoint.name(), format!("failed to list peers: {}", e)))?;

        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let patch = spec_patch(&data);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        for peer in &peers {
            let name = peer.name_any();
            api.patch(&name, &params, &Patch::Merge(&patch))
                .await
                .map_err(|e| {
                    Error::relation(endpoint.name(), format!("failed to patch {}: {}", name, e))
                })?;
            debug!(endpoint = %endpoint, peer = %name, "Published backup spec");
        }
        Ok(())
    }
}

fn spec_patch(data: &str) -> serde_json::Value {
    let mut entries = BTreeMap::new();
    entries.insert(SPEC_DATA_KEY, data);
    json!({ "data": entries })
}
