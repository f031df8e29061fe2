//! Reconcile orchestrator
//!
//! One pass per triggering event: validate the namespace selection, fetch
//! cluster facts, build and publish specs, then resolve and apply the
//! status. Passes never overlap; the runtime feeds events one at a time.
//!
//! The only state carried between passes is the last published spec per
//! endpoint and the last applied status, both used to skip writes that
//! would not change anything.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{self, NamespaceName};
use crate::gateway::ClusterFacts;
use crate::relation::{RelationEndpoint, RelationHub};
use crate::sink::StatusSink;
use crate::spec::{compute_cluster_scoped_spec, compute_namespace_scoped_spec, BackupSpec};
use crate::status::{resolve, RelationPresence, SetupError, Status};

/// Events that trigger a reconcile pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// First start of the controller
    Install,
    /// The namespace selection changed
    ConfigChanged,
    /// Periodic status refresh
    UpdateStatus,
    /// The controller started with a different version than last time
    Upgrade,
    /// A peer joined the endpoint
    RelationJoined(RelationEndpoint),
    /// The last peer left the endpoint
    RelationBroken(RelationEndpoint),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Install => f.write_str("install"),
            Event::ConfigChanged => f.write_str("config-changed"),
            Event::UpdateStatus => f.write_str("update-status"),
            Event::Upgrade => f.write_str("upgrade"),
            Event::RelationJoined(e) => write!(f, "{}-relation-joined", e),
            Event::RelationBroken(e) => write!(f, "{}-relation-broken", e),
        }
    }
}

/// Stage a pass was in when it finished
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// No pass has run
    Idle,
    /// Validating the namespace selection
    Validating,
    /// Probing permission and listing namespaces
    Fetching,
    /// Building and publishing specs
    Building,
    /// Every stage completed
    Resolved,
}

/// Deployment-level reconcile settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Relation endpoints this deployment declares
    pub endpoints: BTreeSet<RelationEndpoint>,
    /// Append Cilium network policies to the namespaced resource list
    pub include_cilium: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            endpoints: RelationEndpoint::ALL.into_iter().collect(),
            include_cilium: false,
        }
    }
}

/// Build the spec for every endpoint the deployment declares
pub fn build_specs(
    settings: &ReconcileSettings,
    cluster_namespaces: &BTreeSet<String>,
    configured: &BTreeSet<NamespaceName>,
) -> BTreeMap<RelationEndpoint, BackupSpec> {
    settings
        .endpoints
        .iter()
        .map(|endpoint| {
            let spec = match endpoint {
                RelationEndpoint::ClusterInfraBackup => {
                    compute_cluster_scoped_spec(cluster_namespaces, configured)
                }
                RelationEndpoint::NamespacedInfraBackup => {
                    compute_namespace_scoped_spec(settings.include_cilium)
                }
            };
            (*endpoint, spec)
        })
        .collect()
}

/// Result of one pass
#[derive(Clone, Debug, PartialEq)]
pub struct PassOutcome {
    /// Stage the pass finished in
    pub stage: Stage,
    /// Status resolved for the pass
    pub status: Status,
    /// Specs built during the pass, keyed by endpoint
    pub specs: BTreeMap<RelationEndpoint, BackupSpec>,
}

impl PassOutcome {
    fn setup_failure(stage: Stage, err: SetupError) -> Self {
        warn!(stage = ?stage, error = %err, "Reconcile pass stopped early");
        Self {
            stage,
            status: resolve(Some(&err), false, &RelationPresence::new()),
            specs: BTreeMap::new(),
        }
    }
}

/// Drives reconcile passes against the external collaborators
pub struct Reconciler {
    facts: Arc<dyn ClusterFacts>,
    relations: Arc<dyn RelationHub>,
    sink: Arc<dyn StatusSink>,
    settings: ReconcileSettings,
    published: BTreeMap<RelationEndpoint, BackupSpec>,
    last_status: Option<Status>,
    last_stage: Stage,
}

impl Reconciler {
    /// Create a reconciler with the given collaborators
    pub fn new(
        facts: Arc<dyn ClusterFacts>,
        relations: Arc<dyn RelationHub>,
        sink: Arc<dyn StatusSink>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            facts,
            relations,
            sink,
            settings,
            published: BTreeMap::new(),
            last_status: None,
            last_stage: Stage::Idle,
        }
    }

    /// Status applied by the most recent pass
    pub fn last_status(&self) -> Option<&Status> {
        self.last_status.as_ref()
    }

    /// Stage the most recent pass finished in
    pub fn last_stage(&self) -> Stage {
        self.last_stage
    }

    /// Specs currently published, keyed by endpoint
    pub fn published(&self) -> &BTreeMap<RelationEndpoint, BackupSpec> {
        &self.published
    }

    /// Run one pass for `event` with the current raw namespace selection
    pub async fn reconcile(&mut self, event: Event, raw_namespaces: &str) -> PassOutcome {
        info!(event = %event, "Reconciling");
        self.observe(event);

        let outcome = self.run_pass(raw_namespaces).await;
        self.last_stage = outcome.stage;
        self.apply_status(&outcome.status).await;

        info!(
            event = %event,
            stage = ?outcome.stage,
            status = %outcome.status,
            "Reconcile pass complete"
        );
        outcome
    }

    /// Forget published specs that a peer no longer holds
    fn observe(&mut self, event: Event) {
        match event {
            Event::Install | Event::Upgrade => self.published.clear(),
            Event::RelationJoined(endpoint) | Event::RelationBroken(endpoint) => {
                self.published.remove(&endpoint);
            }
            Event::ConfigChanged | Event::UpdateStatus => {}
        }
    }

    async fn run_pass(&mut self, raw_namespaces: &str) -> PassOutcome {
        debug!(stage = ?Stage::Validating, "Validating namespace selection");
        let configured = match config::validate(raw_namespaces) {
            Ok(namespaces) => namespaces,
            Err(e) => return PassOutcome::setup_failure(Stage::Validating, SetupError::Config(e)),
        };

        debug!(stage = ?Stage::Fetching, "Fetching cluster facts");
        match self.facts.has_permission().await {
            Ok(true) => {}
            Ok(false) => {
                let presence = self.relation_presence().await;
                return PassOutcome {
                    stage: Stage::Fetching,
                    status: resolve(None, false, &presence),
                    specs: BTreeMap::new(),
                };
            }
            Err(e) => return PassOutcome::setup_failure(Stage::Fetching, SetupError::Cluster(e)),
        }
        let cluster_namespaces = match self.facts.list_namespaces().await {
            Ok(namespaces) => namespaces,
            Err(e) => return PassOutcome::setup_failure(Stage::Fetching, SetupError::Cluster(e)),
        };

        debug!(stage = ?Stage::Building, "Building backup specs");
        let specs = build_specs(&self.settings, &cluster_namespaces, &configured);
        let presence = self.relation_presence().await;
        if let Err(err) = self.publish(&specs, &presence).await {
            return PassOutcome {
                stage: Stage::Building,
                status: resolve(Some(&err), true, &presence),
                specs,
            };
        }

        PassOutcome {
            stage: Stage::Resolved,
            status: resolve(None, true, &presence),
            specs,
        }
    }

    async fn relation_presence(&self) -> RelationPresence {
        let mut presence = RelationPresence::new();
        for endpoint in &self.settings.endpoints {
            presence.insert(*endpoint, self.relations.is_related(*endpoint).await);
        }
        presence
    }

    /// Publish every changed spec to its joined endpoint
    ///
    /// A failure on one endpoint does not stop the others; the first failure
    /// is returned once every endpoint has been attempted.
    async fn publish(
        &mut self,
        specs: &BTreeMap<RelationEndpoint, BackupSpec>,
        presence: &RelationPresence,
    ) -> Result<(), SetupError> {
        let mut first_failure = None;
        for (endpoint, spec) in specs {
            if !presence.get(endpoint).copied().unwrap_or(false) {
                debug!(endpoint = %endpoint, "No peer on endpoint, not publishing");
                continue;
            }
            if self.published.get(endpoint) == Some(spec) {
                debug!(endpoint = %endpoint, "Backup spec unchanged, skipping publish");
                continue;
            }

            match self.relations.publish(*endpoint, spec).await {
                Ok(()) => {
                    info!(endpoint = %endpoint, "Backup spec published");
                    self.published.insert(*endpoint, spec.clone());
                }
                Err(source) => {
                    warn!(endpoint = %endpoint, error = %source, "Failed to publish backup spec");
                    first_failure.get_or_insert(SetupError::Relation {
                        endpoint: *endpoint,
                        source,
                    });
                }
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    async fn apply_status(&mut self, status: &Status) {
        if self.last_status.as_ref() == Some(status) {
            debug!(status = %status, "Status unchanged, skipping update");
            return;
        }

        match self.sink.apply(status).await {
            Ok(()) => self.last_status = Some(status.clone()),
            Err(e) => warn!(status = %status, error = %e, "Failed to apply status"),
        }
    }
}
