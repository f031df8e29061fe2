//! Status sink
//!
//! Records the operator status where operators and tooling can read it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

use infra_backup_common::{Error, FIELD_MANAGER, LABEL_MANAGED_BY, LABEL_MANAGED_BY_INFRA_BACKUP};

use crate::status::Status;

#[cfg(test)]
use mockall::automock;

/// ConfigMap key holding the status name
pub const STATUS_KEY: &str = "status";
/// ConfigMap key holding the status message
pub const MESSAGE_KEY: &str = "message";
/// ConfigMap key holding the operator version that wrote the status
pub const VERSION_KEY: &str = "version";

/// Destination for the resolved status
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Record the status of the latest pass
    async fn apply(&self, status: &Status) -> Result<(), Error>;
}

/// [`StatusSink`] writing to a ConfigMap via server-side apply
pub struct ConfigMapStatusSink {
    client: Client,
    name: String,
    namespace: String,
    version: String,
}

impl ConfigMapStatusSink {
    /// Create a sink writing ConfigMap `name` in `namespace`
    pub fn new(
        client: Client,
        name: impl Into<String>,
        namespace: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            namespace: namespace.into(),
            version: version.into(),
        }
    }

    /// Version recorded by the last status write, if any
    pub async fn recorded_version(&self) -> Result<Option<String>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let cm = api.get_opt(&self.name).await?;
        Ok(cm
            .and_then(|cm| cm.data)
            .and_then(|data| data.get(VERSION_KEY).cloned()))
    }
}

#[async_trait]
impl StatusSink for ConfigMapStatusSink {
    async fn apply(&self, status: &Status) -> Result<(), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let body = status_configmap(&self.name, &self.namespace, status, &self.version);
        let params = PatchParams::apply(FIELD_MANAGER).force();

        api.patch(&self.name, &params, &Patch::Apply(&body)).await?;
        debug!(status = %status, configmap = %self.name, "Status written");
        Ok(())
    }
}

fn status_configmap(name: &str, namespace: &str, status: &Status, version: &str) -> serde_json::Value {
    let mut data = BTreeMap::new();
    data.insert(STATUS_KEY, status.name());
    data.insert(MESSAGE_KEY, status.message());
    data.insert(VERSION_KEY, version);
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_MANAGED_BY, LABEL_MANAGED_BY_INFRA_BACKUP);

    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": labels,
        },
        "data": data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_configmap_structure() {
        let body = status_configmap(
            "infra-backup-status",
            "infra-backup",
            &Status::Blocked("Missing relation: [cluster-infra-backup]".to_string()),
            "0.1.0",
        );

        assert_eq!(body["kind"], "ConfigMap");
        assert_eq!(body["metadata"]["name"], "infra-backup-status");
        assert_eq!(body["metadata"]["namespace"], "infra-backup");
        assert_eq!(
            body["metadata"]["labels"][LABEL_MANAGED_BY],
            LABEL_MANAGED_BY_INFRA_BACKUP
        );
        assert_eq!(body["data"]["status"], "blocked");
        assert_eq!(
            body["data"]["message"],
            "Missing relation: [cluster-infra-backup]"
        );
        assert_eq!(body["data"]["version"], "0.1.0");
    }
}
