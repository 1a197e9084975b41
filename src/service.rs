//! Service construction and boot orchestration

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::client::build_client;
use crate::collector::{CollectorSet, CollectorSetBuilder};
use crate::config::ServiceConfig;
use crate::connection;
use crate::metrics;
use crate::version::{project_bundle, VersionInfo};
use crate::Error;

/// Root object owning the collector sets of one process
pub struct Service {
    version: VersionInfo,
    sets: Vec<Arc<dyn CollectorSet>>,
    booted: AtomicBool,
    tasks: Arc<TaskCounts>,
    span: tracing::Span,
}

#[derive(Debug, Default)]
struct TaskCounts {
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl Service {
    /// Validate the config and assemble every collector set
    ///
    /// No request reaches the API server here; a bad address or credential
    /// only surfaces once the sets run.
    pub async fn new(config: ServiceConfig) -> Result<Self, Error> {
        let ServiceConfig {
            span,
            kubernetes,
            provider,
            identity,
            collect_interval,
        } = config;

        identity.validate()?;

        let resolved = connection::resolve(&kubernetes).await?;
        let client = build_client(resolved).await?;
        let sets = CollectorSetBuilder::new(client, provider, collect_interval).build()?;

        let bundle = project_bundle(&identity);
        let version = VersionInfo::new(identity, vec![bundle])?;

        span.in_scope(|| {
            info!(
                version = %version.identity().version,
                git_commit = %version.identity().git_commit,
                sets = sets.len(),
                "Service constructed"
            )
        });

        Ok(Self::from_parts(version, sets, span))
    }

    /// Assemble a service from pre-built sets
    pub fn from_parts(
        version: VersionInfo,
        sets: Vec<Arc<dyn CollectorSet>>,
        span: tracing::Span,
    ) -> Self {
        Self {
            version,
            sets,
            booted: AtomicBool::new(false),
            tasks: Arc::new(TaskCounts::default()),
            span,
        }
    }

    /// Start every collector set, once
    ///
    /// Each set runs as a detached task under a child of `cancel`; the tasks
    /// are never joined, so callers observe them only through side effects.
    /// Calls after the first return immediately. Set failures are logged by
    /// their task and never reach the caller.
    pub fn boot(&self, cancel: &CancellationToken) {
        if self
            .booted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.span
                .in_scope(|| debug!("Service already booted, ignoring boot request"));
            return;
        }

        self.span
            .in_scope(|| info!(sets = ?self.collector_set_names(), "Booting collector sets"));

        for set in &self.sets {
            let set = Arc::clone(set);
            let token = cancel.child_token();
            let name = set.name().to_string();
            let span = info_span!(parent: &self.span, "collector_set", set = %name);
            let tasks = Arc::clone(&self.tasks);

            tokio::spawn(
                async move {
                    tasks.started.fetch_add(1, Ordering::AcqRel);
                    metrics::record_set_started(&name);
                    match set.boot(token).await {
                        Ok(()) => info!("Collector set finished"),
                        Err(e) => error!(error = %e, "Collector set failed"),
                    }
                    tasks.finished.fetch_add(1, Ordering::AcqRel);
                }
                .instrument(span),
            );
        }
    }

    /// Whether [`Service::boot`] has started the sets
    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }

    /// Set tasks that have started running
    pub fn started_sets(&self) -> usize {
        self.tasks.started.load(Ordering::Acquire)
    }

    /// Set tasks that have returned, with or without an error
    ///
    /// A panicking set is never counted here.
    pub fn finished_sets(&self) -> usize {
        self.tasks.finished.load(Ordering::Acquire)
    }

    /// Names of the owned sets, in start order
    pub fn collector_set_names(&self) -> Vec<&str> {
        self.sets.iter().map(|s| s.name()).collect()
    }

    /// Version descriptor
    pub fn version(&self) -> &VersionInfo {
        &self.version
    }
}
