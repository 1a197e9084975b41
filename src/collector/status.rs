//! Status-reconciliation collector set
//!
//! Follows a cluster-wide watch over AzureConfigs and turns the cluster
//! conditions on each object into gauge series. Series for conditions that
//! disappear (or clusters that are deleted) are reset to 0 so dashboards do
//! not keep showing stale state.
//!
//! When an object is marked for deletion but its latest condition is not
//! `Deleting`, the set appends that condition to the object's status.

use std::collections::{BTreeSet, HashMap};
use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CollectorSet, STATUS_SET};
use crate::client::StatusWriter;
use crate::crd::{AzureConfig, StatusClusterCondition, CONDITION_DELETING, CONDITION_TRUE};
use crate::metrics::{self, Outcome};
use crate::Error;

/// Watcher timeout (seconds), must stay below the client read timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Identity of one AzureConfig's series: cluster IDs are only unique per namespace
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterKey {
    /// Namespace of the AzureConfig
    pub namespace: String,
    /// Tenant cluster ID
    pub cluster_id: String,
}

impl ClusterKey {
    /// Create a key
    pub fn new(namespace: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            cluster_id: cluster_id.into(),
        }
    }

    /// Key of an AzureConfig
    pub fn of(cfg: &AzureConfig) -> Self {
        Self::new(cfg.namespace().unwrap_or_default(), cfg.cluster_id())
    }
}

/// A condition series value to record
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConditionSample {
    /// Namespace of the AzureConfig
    pub namespace: String,
    /// Tenant cluster ID
    pub cluster_id: String,
    /// Condition type
    pub condition: String,
    /// Condition status
    pub status: String,
    /// Whether the condition is present
    pub present: bool,
}

type ConditionKey = (String, String);

/// Condition series recorded so far, per AzureConfig
///
/// Lives inside a single watch loop, so it needs no locking.
#[derive(Debug, Default)]
pub struct StatusState {
    recorded: HashMap<ClusterKey, BTreeSet<ConditionKey>>,
    resync: Option<BTreeSet<ClusterKey>>,
}

impl StatusState {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects with recorded series, sorted
    pub fn clusters(&self) -> Vec<ClusterKey> {
        let mut clusters: Vec<ClusterKey> = self.recorded.keys().cloned().collect();
        clusters.sort();
        clusters
    }

    /// Record an applied object, returning the series to write
    pub fn observe(&mut self, cfg: &AzureConfig) -> Vec<ConditionSample> {
        let key = ClusterKey::of(cfg);
        if let Some(seen) = self.resync.as_mut() {
            seen.insert(key.clone());
        }

        let current: BTreeSet<ConditionKey> = cfg
            .conditions()
            .iter()
            .map(|c| (c.type_.clone(), c.status.clone()))
            .collect();
        let previous = self.recorded.insert(key.clone(), current.clone());

        let mut samples: Vec<ConditionSample> = previous
            .unwrap_or_default()
            .difference(&current)
            .map(|(condition, status)| sample(&key, condition, status, false))
            .collect();
        samples.extend(
            current
                .iter()
                .map(|(condition, status)| sample(&key, condition, status, true)),
        );
        samples
    }

    /// Forget a deleted object, returning the series to reset
    pub fn forget(&mut self, key: &ClusterKey) -> Vec<ConditionSample> {
        self.recorded
            .remove(key)
            .unwrap_or_default()
            .into_iter()
            .map(|(condition, status)| sample(key, &condition, &status, false))
            .collect()
    }

    /// Start tracking which objects a relist reports
    pub fn begin_resync(&mut self) {
        self.resync = Some(BTreeSet::new());
    }

    /// Finish a relist, forgetting objects it did not report
    ///
    /// Returns the forgotten keys and the series to reset.
    pub fn finish_resync(&mut self) -> (Vec<ClusterKey>, Vec<ConditionSample>) {
        let Some(seen) = self.resync.take() else {
            return (Vec::new(), Vec::new());
        };

        let stale: Vec<ClusterKey> = self
            .clusters()
            .into_iter()
            .filter(|key| !seen.contains(key))
            .collect();
        let samples = stale.iter().flat_map(|key| self.forget(key)).collect();
        (stale, samples)
    }
}

fn sample(key: &ClusterKey, condition: &str, status: &str, present: bool) -> ConditionSample {
    ConditionSample {
        namespace: key.namespace.clone(),
        cluster_id: key.cluster_id.clone(),
        condition: condition.to_string(),
        status: status.to_string(),
        present,
    }
}

/// Status merge patch appending a `Deleting` condition, when one is needed
///
/// The patch carries the full condition list: a merge patch replaces arrays.
pub fn deleting_patch(cfg: &AzureConfig) -> Option<serde_json::Value> {
    if !cfg.is_deleting() {
        return None;
    }
    if cfg
        .latest_condition()
        .is_some_and(|c| c.type_ == CONDITION_DELETING)
    {
        return None;
    }

    let mut conditions = cfg.conditions().to_vec();
    conditions.push(StatusClusterCondition::new(CONDITION_DELETING, CONDITION_TRUE));
    Some(serde_json::json!({
        "status": { "cluster": { "conditions": conditions } }
    }))
}

fn record(samples: &[ConditionSample]) {
    for s in samples {
        metrics::set_cluster_condition(
            &s.namespace,
            &s.cluster_id,
            &s.condition,
            &s.status,
            s.present,
        );
    }
}

/// Watches every AzureConfig and derives status metrics
pub struct StatusCollectorSet {
    api: Api<AzureConfig>,
    writer: Arc<dyn StatusWriter>,
}

impl StatusCollectorSet {
    /// Create the set over a cluster-wide AzureConfig API
    pub fn new(api: Api<AzureConfig>, writer: Arc<dyn StatusWriter>) -> Self {
        Self { api, writer }
    }

    /// Apply one watch event to the state and the metrics
    pub async fn handle_event(&self, state: &mut StatusState, event: Event<AzureConfig>) {
        match event {
            Event::Apply(cfg) | Event::InitApply(cfg) => self.observe(state, &cfg).await,
            Event::Delete(cfg) => {
                let key = ClusterKey::of(&cfg);
                debug!(namespace = %key.namespace, cluster = %key.cluster_id, "AzureConfig deleted");
                record(&state.forget(&key));
                metrics::set_cluster_deleting(&key.namespace, &key.cluster_id, false);
            }
            Event::Init => {
                debug!("AzureConfig watch relisting");
                state.begin_resync();
            }
            Event::InitDone => {
                let (stale, samples) = state.finish_resync();
                record(&samples);
                for key in &stale {
                    metrics::set_cluster_deleting(&key.namespace, &key.cluster_id, false);
                }
                debug!(
                    clusters = state.clusters().len(),
                    stale = stale.len(),
                    "AzureConfig relist complete"
                );
            }
        }
    }

    async fn observe(&self, state: &mut StatusState, cfg: &AzureConfig) {
        let cluster_id = cfg.cluster_id();
        let namespace = cfg.namespace().unwrap_or_default();
        record(&state.observe(cfg));
        metrics::set_cluster_deleting(&namespace, &cluster_id, cfg.is_deleting());

        let Some(patch) = deleting_patch(cfg) else {
            return;
        };
        let name = cfg.name_any();
        match self.writer.patch_status(&namespace, &name, patch).await {
            Ok(()) => {
                metrics::record_status_write(Outcome::Success);
                info!(cluster = %cluster_id, "Set Deleting condition on AzureConfig");
            }
            Err(e) => {
                metrics::record_status_write(Outcome::Error);
                warn!(cluster = %cluster_id, error = %e, "Failed to set Deleting condition");
            }
        }
    }
}

#[async_trait]
impl CollectorSet for StatusCollectorSet {
    fn name(&self) -> &str {
        STATUS_SET
    }

    async fn boot(&self, cancel: CancellationToken) -> Result<(), Error> {
        info!(set = STATUS_SET, "Starting AzureConfig status watch");

        let config = watcher::Config::default().timeout(WATCH_TIMEOUT_SECS);
        let mut stream = pin!(watcher::watcher(self.api.clone(), config).default_backoff());
        let mut state = StatusState::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(set = STATUS_SET, "AzureConfig status watch stopped");
                    return Ok(());
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => self.handle_event(&mut state, event).await,
                Some(Err(e)) => warn!(error = %e, "AzureConfig watch error"),
                None => return Err(Error::collection(STATUS_SET, "watch stream ended")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockStatusWriter;
    use mockall::predicate::eq;

    fn key(cluster_id: &str) -> ClusterKey {
        ClusterKey::new("default", cluster_id)
    }

    fn condition(cluster_id: &str, condition: &str, status: &str, present: bool) -> ConditionSample {
        sample(&key(cluster_id), condition, status, present)
    }

    fn azure_config(name: &str, conditions: &[(&str, &str)], deleting: bool) -> AzureConfig {
        azure_config_in("default", name, conditions, deleting)
    }

    fn azure_config_in(
        namespace: &str,
        name: &str,
        conditions: &[(&str, &str)],
        deleting: bool,
    ) -> AzureConfig {
        let conditions: Vec<serde_json::Value> = conditions
            .iter()
            .map(|(t, s)| serde_json::json!({ "type": t, "status": s }))
            .collect();
        let mut metadata = serde_json::json!({ "name": name, "namespace": namespace });
        if deleting {
            metadata["deletionTimestamp"] = serde_json::json!("2024-01-01T00:00:00Z");
        }
        serde_json::from_value(serde_json::json!({
            "apiVersion": "provider.giantswarm.io/v1alpha1",
            "kind": "AzureConfig",
            "metadata": metadata,
            "spec": { "cluster": { "id": name } },
            "status": { "cluster": { "conditions": conditions } }
        }))
        .unwrap()
    }

    fn offline_api() -> Api<AzureConfig> {
        crate::client::install_crypto_provider();
        let config = kube::Config::new("http://127.0.0.1:6443".parse().unwrap());
        Api::all(kube::Client::try_from(config).unwrap())
    }

    // ==========================================================================
    // Story: Condition series follow object state
    // ==========================================================================

    #[test]
    fn first_observation_records_every_condition() {
        let mut state = StatusState::new();
        let samples = state.observe(&azure_config("a1", &[("Creating", "True"), ("Created", "True")], false));

        assert_eq!(samples.len(), 2);
        assert!(samples
            .iter()
            .all(|s| s.present && s.cluster_id == "a1" && s.namespace == "default"));
        assert_eq!(state.clusters(), vec![key("a1")]);
    }

    #[test]
    fn vanished_condition_is_reset() {
        let mut state = StatusState::new();
        state.observe(&azure_config("a1", &[("Updating", "True")], false));
        let samples = state.observe(&azure_config("a1", &[("Updated", "True")], false));

        assert!(samples.contains(&condition("a1", "Updating", "True", false)));
        assert!(samples.contains(&condition("a1", "Updated", "True", true)));
    }

    #[test]
    fn forgetting_a_cluster_resets_its_series() {
        let mut state = StatusState::new();
        state.observe(&azure_config("a1", &[("Created", "True")], false));

        assert_eq!(state.forget(&key("a1")), vec![condition("a1", "Created", "True", false)]);
        assert!(state.clusters().is_empty());
        assert!(state.forget(&key("a1")).is_empty());
    }

    #[test]
    fn resync_drops_clusters_missing_from_relist() {
        let mut state = StatusState::new();
        state.observe(&azure_config("a1", &[("Created", "True")], false));
        state.observe(&azure_config("b2", &[("Created", "True")], false));

        state.begin_resync();
        state.observe(&azure_config("b2", &[("Created", "True")], false));
        let (stale, samples) = state.finish_resync();

        assert_eq!(stale, vec![key("a1")]);
        assert_eq!(samples, vec![condition("a1", "Created", "True", false)]);
        assert_eq!(state.clusters(), vec![key("b2")]);
    }

    #[test]
    fn same_cluster_id_in_two_namespaces_is_tracked_separately() {
        let mut state = StatusState::new();
        state.observe(&azure_config_in("org-a", "a1", &[("Created", "True")], false));
        let samples = state.observe(&azure_config_in("org-b", "a1", &[("Updating", "True")], false));

        // org-b's conditions do not reset org-a's series
        assert_eq!(
            samples,
            vec![sample(&ClusterKey::new("org-b", "a1"), "Updating", "True", true)]
        );
        assert_eq!(
            state.clusters(),
            vec![ClusterKey::new("org-a", "a1"), ClusterKey::new("org-b", "a1")]
        );

        let reset = state.forget(&ClusterKey::new("org-b", "a1"));
        assert_eq!(
            reset,
            vec![sample(&ClusterKey::new("org-b", "a1"), "Updating", "True", false)]
        );
        assert_eq!(state.clusters(), vec![ClusterKey::new("org-a", "a1")]);
    }

    #[test]
    fn finish_without_begin_is_a_no_op() {
        let mut state = StatusState::new();
        state.observe(&azure_config("a1", &[], false));
        assert_eq!(state.finish_resync(), (Vec::new(), Vec::new()));
    }

    // ==========================================================================
    // Story: Deleting condition write-back
    // ==========================================================================

    #[test]
    fn live_object_needs_no_patch() {
        assert!(deleting_patch(&azure_config("a1", &[("Created", "True")], false)).is_none());
    }

    #[test]
    fn deleting_object_gets_condition_appended() {
        let patch = deleting_patch(&azure_config("a1", &[("Created", "True")], true)).unwrap();
        let conditions = patch["status"]["cluster"]["conditions"].as_array().unwrap();

        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0]["type"], "Created");
        assert_eq!(conditions[1]["type"], "Deleting");
        assert_eq!(conditions[1]["status"], "True");
    }

    #[test]
    fn already_deleting_object_is_left_alone() {
        let cfg = azure_config("a1", &[("Created", "True"), ("Deleting", "True")], true);
        assert!(deleting_patch(&cfg).is_none());
    }

    #[tokio::test]
    async fn apply_of_deleting_object_writes_status() {
        let mut writer = MockStatusWriter::new();
        writer
            .expect_patch_status()
            .with(eq("default"), eq("a1"), mockall::predicate::always())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let set = StatusCollectorSet::new(offline_api(), Arc::new(writer));
        let mut state = StatusState::new();
        set.handle_event(&mut state, Event::Apply(azure_config("a1", &[("Created", "True")], true)))
            .await;

        assert_eq!(state.clusters(), vec![key("a1")]);
    }

    #[tokio::test]
    async fn failed_write_back_does_not_lose_state() {
        let mut writer = MockStatusWriter::new();
        writer
            .expect_patch_status()
            .returning(|_, _, _| Err(Error::collection("status", "conflict")));

        let set = StatusCollectorSet::new(offline_api(), Arc::new(writer));
        let mut state = StatusState::new();
        set.handle_event(&mut state, Event::InitApply(azure_config("a1", &[], true)))
            .await;

        assert_eq!(state.clusters(), vec![key("a1")]);
    }

    #[tokio::test]
    async fn delete_event_forgets_the_cluster() {
        let mut writer = MockStatusWriter::new();
        writer.expect_patch_status().never();

        let set = StatusCollectorSet::new(offline_api(), Arc::new(writer));
        let mut state = StatusState::new();
        let cfg = azure_config("a1", &[("Created", "True")], false);
        set.handle_event(&mut state, Event::Apply(cfg.clone())).await;
        set.handle_event(&mut state, Event::Delete(cfg)).await;

        assert!(state.clusters().is_empty());
    }

    #[tokio::test]
    async fn relist_events_prune_stale_clusters() {
        let mut writer = MockStatusWriter::new();
        writer.expect_patch_status().never();

        let set = StatusCollectorSet::new(offline_api(), Arc::new(writer));
        let mut state = StatusState::new();
        set.handle_event(&mut state, Event::Apply(azure_config("a1", &[], false))).await;
        set.handle_event(&mut state, Event::Init).await;
        set.handle_event(&mut state, Event::InitApply(azure_config("b2", &[], false))).await;
        set.handle_event(&mut state, Event::InitDone).await;

        assert_eq!(state.clusters(), vec![key("b2")]);
    }

    #[tokio::test]
    async fn boot_returns_once_cancelled() {
        let set = StatusCollectorSet::new(offline_api(), Arc::new(MockStatusWriter::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(set.boot(cancel).await.is_ok());
    }
}
