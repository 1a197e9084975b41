//! Collector sets and the collectors inside them
//!
//! A [`CollectorSet`] is the unit the service starts: it runs until its
//! cancellation token fires. Two kinds exist:
//! - [`PollingSet`] drives a fixed list of [`Collector`]s on an interval
//! - [`StatusCollectorSet`] follows a watch stream over AzureConfigs
//!
//! Sets own their error handling. Nothing they return is observed by the
//! service beyond a log line.

mod builder;
mod cluster;
mod credential;
mod status;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::{CollectionTimer, Outcome};
use crate::Error;

pub use builder::{CollectorSetBuilder, INFRASTRUCTURE_SET, STATUS_SET};
pub use cluster::{cluster_infos, ClusterCollector, ClusterInfo};
pub use credential::{credential_health, CredentialCollector, CredentialHealth, CredentialSeries};
pub use status::{deleting_patch, ClusterKey, ConditionSample, StatusCollectorSet, StatusState};

/// Label sets that were recorded before but are missing from `current`
pub fn stale_series<K: Ord + Clone>(previous: &BTreeSet<K>, current: &BTreeSet<K>) -> Vec<K> {
    previous.difference(current).cloned().collect()
}

/// Label sets a gauge collector wrote on its last successful pass
///
/// Gauges keep their last value forever, so a series whose object went away
/// must be set to 0 explicitly.
#[derive(Debug)]
pub struct SeriesTracker<K> {
    recorded: Mutex<BTreeSet<K>>,
}

impl<K: Ord + Clone> Default for SeriesTracker<K> {
    fn default() -> Self {
        Self {
            recorded: Mutex::new(BTreeSet::new()),
        }
    }
}

impl<K: Ord + Clone> SeriesTracker<K> {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Store this pass's label sets, returning the ones that disappeared
    pub fn replace(&self, current: BTreeSet<K>) -> Vec<K> {
        let mut recorded = self.recorded.lock();
        let stale = stale_series(&recorded, &current);
        *recorded = current;
        stale
    }
}

/// A single infrastructure signal source, sampled once per pass
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Collector: Send + Sync {
    /// Name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Sample the source and record metric values
    async fn collect(&self) -> Result<(), Error>;
}

/// A long-running unit started by the service
#[async_trait]
pub trait CollectorSet: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run until `cancel` fires
    async fn boot(&self, cancel: CancellationToken) -> Result<(), Error>;
}

/// Runs every collector once per interval tick
pub struct PollingSet {
    name: String,
    interval: Duration,
    collectors: Vec<Box<dyn Collector>>,
}

impl PollingSet {
    /// Create a polling set; the interval must be non-zero
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        collectors: Vec<Box<dyn Collector>>,
    ) -> Result<Self, Error> {
        let name = name.into();
        if interval.is_zero() {
            return Err(Error::collector_assembly(name, "collect interval must be non-zero"));
        }
        Ok(Self {
            name,
            interval,
            collectors,
        })
    }

    /// Names of the collectors in this set, in order
    pub fn collector_names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Run one pass over every collector concurrently
    ///
    /// Returns the number of collectors that failed.
    pub async fn collect_once(&self) -> usize {
        let results = join_all(self.collectors.iter().map(|collector| async move {
            let timer = CollectionTimer::start(collector.name());
            match collector.collect().await {
                Ok(()) => {
                    timer.finish(Outcome::Success);
                    debug!(collector = collector.name(), "Collection pass completed");
                    true
                }
                Err(e) => {
                    timer.finish(Outcome::Error);
                    warn!(collector = collector.name(), error = %e, "Collection pass failed");
                    false
                }
            }
        }))
        .await;

        results.into_iter().filter(|ok| !ok).count()
    }
}

#[async_trait]
impl CollectorSet for PollingSet {
    fn name(&self) -> &str {
        &self.name
    }

    async fn boot(&self, cancel: CancellationToken) -> Result<(), Error> {
        info!(set = %self.name, interval = ?self.interval, collectors = ?self.collector_names(), "Starting polling collector set");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(set = %self.name, "Polling collector set stopped");
                    return Ok(());
                }
                _ = async {
                    ticker.tick().await;
                    self.collect_once().await
                } => {}
            }
        }
    }
}
