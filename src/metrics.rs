//! Metrics registry for azure-collector
//!
//! Provides OpenTelemetry instruments for:
//! - Infrastructure signals (cluster inventory, credential health)
//! - Reconciliation status (cluster conditions, deletion)
//! - The collectors themselves (pass duration, errors, set starts)

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{global, KeyValue};

/// Global meter for collector metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("azure-collector"));

// ============================================================================
// Infrastructure Metrics
// ============================================================================

/// Gauge of AzureConfigs known to the installation
///
/// Labels:
/// - `location`: installation location
/// - `resource_group`: control plane resource group
pub static CLUSTERS: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("azure_collector_clusters")
        .with_description("Number of tenant clusters described by AzureConfigs")
        .with_unit("{clusters}")
        .build()
});

/// Info gauge, 1 per listed tenant cluster, 0 once its labels go away
///
/// Labels:
/// - `cluster_id`: tenant cluster ID
/// - `location`: installation location
/// - `release_version`: release label, `unknown` when absent
pub static CLUSTER_INFO: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("azure_collector_cluster_info")
        .with_description("Tenant cluster information")
        .build()
});

/// Whether a cluster's credential secret exists and is complete
///
/// Labels:
/// - `cluster_id`: tenant cluster ID
/// - `secret`: namespace/name of the credential secret
pub static CREDENTIAL_VALID: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("azure_collector_credential_valid")
        .with_description("1 when the cluster credential secret is complete")
        .build()
});

/// Whether a cluster's credentials belong to the installation tenant
///
/// Labels:
/// - `cluster_id`: tenant cluster ID
pub static CREDENTIAL_TENANT_MATCH: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("azure_collector_credential_tenant_match")
        .with_description("1 when the credential tenant equals the installation tenant")
        .build()
});

// ============================================================================
// Status Metrics
// ============================================================================

/// One series per cluster condition, 1 while the condition is present
///
/// Labels:
/// - `namespace`: AzureConfig namespace
/// - `cluster_id`: tenant cluster ID
/// - `condition`: condition type
/// - `status`: condition status
pub static CLUSTER_CONDITION: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("azure_collector_cluster_condition")
        .with_description("Cluster status conditions observed on AzureConfigs")
        .build()
});

/// Whether the AzureConfig is marked for deletion
///
/// Labels:
/// - `namespace`: AzureConfig namespace
/// - `cluster_id`: tenant cluster ID
pub static CLUSTER_DELETING: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("azure_collector_cluster_deleting")
        .with_description("1 while the AzureConfig carries a deletion timestamp")
        .build()
});

/// Counter of status write-backs
///
/// Labels:
/// - `result`: success, error
pub static STATUS_WRITES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("azure_collector_status_writes_total")
        .with_description("Total number of status condition write-backs")
        .with_unit("{writes}")
        .build()
});

// ============================================================================
// Collector Metrics
// ============================================================================

/// Histogram of collection pass duration
///
/// Labels:
/// - `collector`: collector name
/// - `result`: success, error
pub static COLLECTION_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("azure_collector_collection_duration_seconds")
        .with_description("Duration of a collector pass in seconds")
        .with_unit("s")
        .build()
});

/// Counter of failed collection passes
///
/// Labels:
/// - `collector`: collector name
pub static COLLECTION_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("azure_collector_collection_errors_total")
        .with_description("Total number of failed collector passes")
        .with_unit("{errors}")
        .build()
});

/// Counter of collector set starts
///
/// Labels:
/// - `set`: collector set name
pub static COLLECTOR_SETS_STARTED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("azure_collector_collector_sets_started_total")
        .with_description("Total number of collector sets started")
        .build()
});

// ============================================================================
// Helper Types
// ============================================================================

/// Outcome label for timed operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Operation succeeded
    Success,
    /// Operation failed
    Error,
}

impl Outcome {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

fn bool_value(value: bool) -> i64 {
    i64::from(value)
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Times one collector pass
pub struct CollectionTimer {
    collector: &'static str,
    start: std::time::Instant,
}

impl CollectionTimer {
    /// Start timing a pass
    pub fn start(collector: &'static str) -> Self {
        Self {
            collector,
            start: std::time::Instant::now(),
        }
    }

    /// Record the pass outcome
    pub fn finish(self, outcome: Outcome) {
        let duration = self.start.elapsed().as_secs_f64();
        COLLECTION_DURATION.record(
            duration,
            &[
                KeyValue::new("collector", self.collector),
                KeyValue::new("result", outcome.as_str()),
            ],
        );
        if outcome == Outcome::Error {
            COLLECTION_ERRORS.add(1, &[KeyValue::new("collector", self.collector)]);
        }
    }
}

/// Record the cluster count for the installation
pub fn set_cluster_count(location: &str, resource_group: &str, count: i64) {
    CLUSTERS.record(
        count,
        &[
            KeyValue::new("location", location.to_string()),
            KeyValue::new("resource_group", resource_group.to_string()),
        ],
    );
}

/// Record a cluster info series
pub fn set_cluster_info(cluster_id: &str, location: &str, release_version: &str, present: bool) {
    CLUSTER_INFO.record(
        bool_value(present),
        &[
            KeyValue::new("cluster_id", cluster_id.to_string()),
            KeyValue::new("location", location.to_string()),
            KeyValue::new("release_version", release_version.to_string()),
        ],
    );
}

/// Record credential health for a cluster
pub fn set_credential_health(cluster_id: &str, secret: &str, valid: bool, tenant_match: bool) {
    set_credential_valid(cluster_id, secret, valid);
    set_credential_tenant_match(cluster_id, tenant_match);
}

/// Record whether a cluster's credential secret is complete
pub fn set_credential_valid(cluster_id: &str, secret: &str, valid: bool) {
    CREDENTIAL_VALID.record(
        bool_value(valid),
        &[
            KeyValue::new("cluster_id", cluster_id.to_string()),
            KeyValue::new("secret", secret.to_string()),
        ],
    );
}

/// Record whether a cluster's credentials match the installation tenant
pub fn set_credential_tenant_match(cluster_id: &str, tenant_match: bool) {
    CREDENTIAL_TENANT_MATCH.record(
        bool_value(tenant_match),
        &[KeyValue::new("cluster_id", cluster_id.to_string())],
    );
}

/// Record presence of a cluster condition
pub fn set_cluster_condition(
    namespace: &str,
    cluster_id: &str,
    condition: &str,
    status: &str,
    present: bool,
) {
    CLUSTER_CONDITION.record(
        bool_value(present),
        &[
            KeyValue::new("namespace", namespace.to_string()),
            KeyValue::new("cluster_id", cluster_id.to_string()),
            KeyValue::new("condition", condition.to_string()),
            KeyValue::new("status", status.to_string()),
        ],
    );
}

/// Record whether a cluster is being deleted
pub fn set_cluster_deleting(namespace: &str, cluster_id: &str, deleting: bool) {
    CLUSTER_DELETING.record(
        bool_value(deleting),
        &[
            KeyValue::new("namespace", namespace.to_string()),
            KeyValue::new("cluster_id", cluster_id.to_string()),
        ],
    );
}

/// Count a status write-back
pub fn record_status_write(outcome: Outcome) {
    STATUS_WRITES.add(1, &[KeyValue::new("result", outcome.as_str())]);
}

/// Count a collector set start
pub fn record_set_started(set: &str) {
    COLLECTOR_SETS_STARTED.add(1, &[KeyValue::new("set", set.to_string())]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_as_str() {
        assert_eq!(Outcome::Success.as_str(), "success");
        assert_eq!(Outcome::Error.as_str(), "error");
    }

    #[test]
    fn test_bool_value() {
        assert_eq!(bool_value(true), 1);
        assert_eq!(bool_value(false), 0);
    }

    #[test]
    fn test_collection_timer() {
        let timer = CollectionTimer::start("cluster");
        assert_eq!(timer.collector, "cluster");
        // Just ensure it doesn't panic without a meter provider
        timer.finish(Outcome::Error);
    }

    #[test]
    fn test_recording_helpers_without_provider() {
        set_cluster_count("westeurope", "rg1", 3);
        set_cluster_info("h7d2k", "westeurope", "13.0.1", true);
        set_credential_valid("h7d2k", "giantswarm/credential-default", false);
        set_credential_health("h7d2k", "giantswarm/credential-default", true, false);
        set_cluster_condition("default", "h7d2k", "Created", "True", true);
        set_cluster_deleting("default", "h7d2k", false);
        record_status_write(Outcome::Success);
        record_set_started("status");
    }
}
