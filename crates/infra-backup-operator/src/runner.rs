//! Controller runner
//!
//! Turns cluster changes into reconcile events and feeds them to a single
//! [`Reconciler`], one pass at a time:
//!
//! - the config ConfigMap watch yields `ConfigChanged`
//! - the relation ConfigMap watch yields `RelationJoined` / `RelationBroken`
//! - a periodic tick yields `UpdateStatus`

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube::runtime::watcher::{self, Event as WatchEvent};
use kube::runtime::WatchStreamExt;
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

use infra_backup::config::{DEFAULT_NAMESPACES, NAMESPACES_KEY};
use infra_backup::{
    ConfigMapRelations, ConfigMapStatusSink, Event, KubeClusterFacts, ReconcileSettings,
    Reconciler, RelationEndpoint,
};
use infra_backup_common::RELATION_LABEL_KEY;

/// Version recorded alongside the status, used to detect upgrades
pub const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Settings for the controller loop
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Namespace holding the config, status and relation ConfigMaps
    pub namespace: String,
    /// Name of the config ConfigMap
    pub config_map: String,
    /// Name of the status ConfigMap
    pub status_config_map: String,
    /// Period of the update-status event
    pub update_status_interval: Duration,
    /// Reconcile settings for the deployment
    pub settings: ReconcileSettings,
}

/// Pick the first event after process start from the recorded version
pub fn startup_event(recorded: Option<&str>, current: &str) -> Event {
    match recorded {
        None => Event::Install,
        Some(v) if v != current => Event::Upgrade,
        Some(_) => Event::UpdateStatus,
    }
}

/// Raw namespace selection held by a config ConfigMap
pub fn namespaces_from(cm: Option<&ConfigMap>) -> String {
    cm.and_then(|cm| cm.data.as_ref())
        .and_then(|data| data.get(NAMESPACES_KEY))
        .cloned()
        .unwrap_or_else(|| DEFAULT_NAMESPACES.to_string())
}

/// Raw namespace selection read at startup
///
/// A failed read falls back to the default; the config watch delivers the
/// real value once the API server answers.
fn initial_namespaces(read: Result<Option<ConfigMap>, kube::Error>, config_map: &str) -> String {
    match read {
        Ok(cm) => namespaces_from(cm.as_ref()),
        Err(e) => {
            warn!(
                configmap = %config_map,
                error = %e,
                "Failed to read namespace selection, using default until the watch catches up"
            );
            namespaces_from(None)
        }
    }
}

/// Tracks which peer ConfigMaps have joined which endpoint
///
/// Watch events fire on every modification, including the operator's own
/// spec writes. Only peers appearing or disappearing become relation
/// events.
#[derive(Debug, Default)]
pub struct PeerTracker {
    peers: BTreeMap<RelationEndpoint, BTreeSet<String>>,
    pending: Option<BTreeMap<RelationEndpoint, BTreeSet<String>>>,
}

impl PeerTracker {
    /// Record a peer that exists now
    ///
    /// A peer relabelled onto another endpoint leaves the endpoint it was
    /// on before.
    pub fn applied(&mut self, endpoint: RelationEndpoint, peer: &str) -> Vec<Event> {
        let mut events: Vec<Event> = RelationEndpoint::ALL
            .into_iter()
            .filter(|other| *other != endpoint)
            .filter_map(|other| self.deleted(other, peer))
            .collect();

        let newly_related = !self.is_related(endpoint);
        let inserted = self
            .peers
            .entry(endpoint)
            .or_default()
            .insert(peer.to_string());
        if inserted && newly_related {
            events.push(Event::RelationJoined(endpoint));
        }
        events
    }

    /// Record a peer that was deleted
    pub fn deleted(&mut self, endpoint: RelationEndpoint, peer: &str) -> Option<Event> {
        let removed = self
            .peers
            .get_mut(&endpoint)
            .map(|set| set.remove(peer))
            .unwrap_or(false);
        (removed && !self.is_related(endpoint)).then_some(Event::RelationBroken(endpoint))
    }

    /// Begin a relist; peers are collected until [`PeerTracker::relist_done`]
    pub fn relist_started(&mut self) {
        self.pending = Some(BTreeMap::new());
    }

    /// Record a peer seen during a relist
    pub fn relisted(&mut self, endpoint: RelationEndpoint, peer: &str) {
        if let Some(pending) = self.pending.as_mut() {
            pending.entry(endpoint).or_default().insert(peer.to_string());
        }
    }

    /// Finish a relist and report endpoints whose presence changed
    pub fn relist_done(&mut self) -> Vec<Event> {
        let Some(fresh) = self.pending.take() else {
            return Vec::new();
        };
        let previous = std::mem::replace(&mut self.peers, fresh);

        RelationEndpoint::ALL
            .into_iter()
            .filter_map(|endpoint| {
                let was = previous.get(&endpoint).is_some_and(|s| !s.is_empty());
                let now = self.is_related(endpoint);
                match (was, now) {
                    (false, true) => Some(Event::RelationJoined(endpoint)),
                    (true, false) => Some(Event::RelationBroken(endpoint)),
                    _ => None,
                }
            })
            .collect()
    }

    fn is_related(&self, endpoint: RelationEndpoint) -> bool {
        self.peers.get(&endpoint).is_some_and(|s| !s.is_empty())
    }
}

fn endpoint_of(cm: &ConfigMap) -> Option<RelationEndpoint> {
    let label = cm.labels().get(RELATION_LABEL_KEY)?;
    match label.parse() {
        Ok(endpoint) => Some(endpoint),
        Err(e) => {
            warn!(configmap = %cm.name_any(), error = %e, "Ignoring relation ConfigMap");
            None
        }
    }
}

/// Run the controller until interrupted
pub async fn run(client: Client, config: RunnerConfig) -> anyhow::Result<()> {
    let cm_api: Api<ConfigMap> = Api::namespaced(client.clone(), &config.namespace);

    let sink = Arc::new(ConfigMapStatusSink::new(
        client.clone(),
        &config.status_config_map,
        &config.namespace,
        OPERATOR_VERSION,
    ));
    let recorded = match sink.recorded_version().await {
        Ok(version) => version,
        Err(e) => {
            warn!(error = %e, "Failed to read recorded version, assuming fresh install");
            None
        }
    };
    let first_event = startup_event(recorded.as_deref(), OPERATOR_VERSION);

    let mut raw_namespaces =
        initial_namespaces(cm_api.get_opt(&config.config_map).await, &config.config_map);

    let mut reconciler = Reconciler::new(
        Arc::new(KubeClusterFacts::new(client.clone())),
        Arc::new(ConfigMapRelations::new(client.clone(), &config.namespace)),
        sink,
        config.settings.clone(),
    );

    let config_watcher = watcher::watcher(
        cm_api.clone(),
        watcher::Config::default().fields(&format!("metadata.name={}", config.config_map)),
    )
    .default_backoff();
    let relation_watcher = watcher::watcher(
        cm_api,
        watcher::Config::default().labels(RELATION_LABEL_KEY),
    )
    .default_backoff();

    let mut config_watcher = std::pin::pin!(config_watcher);
    let mut relation_watcher = std::pin::pin!(relation_watcher);

    let period = config.update_status_interval;
    let mut update_status = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    update_status.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut peers = PeerTracker::default();
    let shutdown = tokio::signal::ctrl_c();
    let mut shutdown = std::pin::pin!(shutdown);

    info!(
        namespace = %config.namespace,
        event = %first_event,
        interval_secs = period.as_secs(),
        "Infra backup controller started"
    );
    reconciler.reconcile(first_event, &raw_namespaces).await;

    loop {
        let events: Vec<Event> = tokio::select! {
            Some(event) = config_watcher.next() => match event {
                Ok(WatchEvent::Apply(cm)) | Ok(WatchEvent::InitApply(cm)) => {
                    config_change(&mut raw_namespaces, namespaces_from(Some(&cm)))
                }
                Ok(WatchEvent::Delete(_)) => {
                    config_change(&mut raw_namespaces, namespaces_from(None))
                }
                Ok(WatchEvent::Init) | Ok(WatchEvent::InitDone) => Vec::new(),
                Err(e) => {
                    warn!(error = %e, "Config watch error");
                    Vec::new()
                }
            },
            Some(event) = relation_watcher.next() => match event {
                Ok(WatchEvent::Apply(cm)) => endpoint_of(&cm)
                    .map(|endpoint| peers.applied(endpoint, &cm.name_any()))
                    .unwrap_or_default(),
                Ok(WatchEvent::Delete(cm)) => endpoint_of(&cm)
                    .and_then(|endpoint| peers.deleted(endpoint, &cm.name_any()))
                    .into_iter()
                    .collect(),
                Ok(WatchEvent::Init) => {
                    peers.relist_started();
                    Vec::new()
                }
                Ok(WatchEvent::InitApply(cm)) => {
                    if let Some(endpoint) = endpoint_of(&cm) {
                        peers.relisted(endpoint, &cm.name_any());
                    }
                    Vec::new()
                }
                Ok(WatchEvent::InitDone) => peers.relist_done(),
                Err(e) => {
                    warn!(error = %e, "Relation watch error");
                    Vec::new()
                }
            },
            _ = update_status.tick() => vec![Event::UpdateStatus],
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping controller");
                return Ok(());
            }
        };

        for event in events {
            reconciler.reconcile(event, &raw_namespaces).await;
        }
    }
}

fn config_change(current: &mut String, next: String) -> Vec<Event> {
    if *current == next {
        debug!("Namespace selection unchanged");
        return Vec::new();
    }
    info!(namespaces = %next, "Namespace selection changed");
    *current = next;
    vec![Event::ConfigChanged]
}
