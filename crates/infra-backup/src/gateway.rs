//! Cluster facts gateway
//!
//! Supplies the live namespace inventory and the permission check. The
//! trait allows tests to mock Kubernetes while production uses the API.

use std::collections::BTreeSet;

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, ResourceExt};
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

/// Errors fetching cluster facts
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Kubernetes API error while listing namespaces
    #[error("failed to list namespaces: {0}")]
    Kube(#[from] kube::Error),

    /// The access review request itself failed, so permission is unknown
    #[error("access review failed for {verb} {resource}: {source}")]
    AccessReview {
        /// Verb being checked
        verb: &'static str,
        /// Resource being checked
        resource: &'static str,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// Cluster facts are unavailable for another reason
    #[error("cluster facts unavailable: {0}")]
    Unavailable(String),
}

/// A single access the controller needs before fetching cluster facts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequiredAccess {
    /// API verb (e.g., "list")
    pub verb: &'static str,
    /// API group, empty for core
    pub group: &'static str,
    /// Resource plural
    pub resource: &'static str,
}

/// Accesses checked before cluster facts are fetched
pub const REQUIRED_ACCESS: &[RequiredAccess] = &[RequiredAccess {
    verb: "list",
    group: "",
    resource: "namespaces",
}];

/// Source of live cluster facts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterFacts: Send + Sync {
    /// Names of all namespaces currently in the cluster
    async fn list_namespaces(&self) -> Result<BTreeSet<String>, GatewayError>;

    /// Whether the controller holds the cluster permissions it needs
    ///
    /// `Ok(false)` means the API server answered and denied an access. An
    /// `Err` means the answer is unknown (e.g., the API server is
    /// unreachable).
    async fn has_permission(&self) -> Result<bool, GatewayError>;
}

/// [`ClusterFacts`] backed by the Kubernetes API
pub struct KubeClusterFacts {
    client: Client,
}

impl KubeClusterFacts {
    /// Create a gateway using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn review(&self, access: &RequiredAccess) -> Result<bool, kube::Error> {
        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    verb: Some(access.verb.to_string()),
                    group: Some(access.group.to_string()),
                    resource: Some(access.resource.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let result = api.create(&PostParams::default(), &review).await?;
        Ok(result.status.map(|s| s.allowed).unwrap_or(false))
    }
}

#[async_trait]
impl ClusterFacts for KubeClusterFacts {
    async fn list_namespaces(&self) -> Result<BTreeSet<String>, GatewayError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        let names: BTreeSet<String> = list.items.iter().map(|ns| ns.name_any()).collect();
        debug!(count = names.len(), "Listed cluster namespaces");
        Ok(names)
    }

    async fn has_permission(&self) -> Result<bool, GatewayError> {
        for access in REQUIRED_ACCESS {
            let allowed = self.review(access).await.map_err(|source| {
                warn!(
                    verb = access.verb,
                    resource = access.resource,
                    error = %source,
                    "Access review failed"
                );
                GatewayError::AccessReview {
                    verb: access.verb,
                    resource: access.resource,
                    source,
                }
            })?;
            if !allowed {
                debug!(
                    verb = access.verb,
                    resource = access.resource,
                    "Access denied by SelfSubjectAccessReview"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }
}
