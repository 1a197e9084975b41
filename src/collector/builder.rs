//! Assembly of the fixed collector sets
//!
//! Builds every collector up front. If any constructor fails the whole build
//! fails; callers never see a partial list.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::{
    ClusterCollector, Collector, CollectorSet, CredentialCollector, PollingSet, StatusCollectorSet,
};
use crate::client::{ClusterSource, ProviderClient};
use crate::config::ProviderParams;
use crate::Error;

/// Name of the polling set holding the infrastructure collectors
pub const INFRASTRUCTURE_SET: &str = "infrastructure";
/// Name of the status-reconciliation set
pub const STATUS_SET: &str = "status";

/// Builds the collector sets against one shared client
pub struct CollectorSetBuilder {
    client: ProviderClient,
    provider: ProviderParams,
    interval: Duration,
}

impl CollectorSetBuilder {
    /// Create a builder
    pub fn new(client: ProviderClient, provider: ProviderParams, interval: Duration) -> Self {
        Self {
            client,
            provider,
            interval,
        }
    }

    /// Build every set, infrastructure first, then status
    pub fn build(self) -> Result<Vec<Arc<dyn CollectorSet>>, Error> {
        let source: Arc<dyn ClusterSource> = Arc::new(self.client.clone());

        let infrastructure: Vec<Box<dyn Collector>> = vec![
            Box::new(ClusterCollector::new(source.clone(), &self.provider)?),
            Box::new(CredentialCollector::new(source, &self.provider)?),
        ];
        let infrastructure = PollingSet::new(INFRASTRUCTURE_SET, self.interval, infrastructure)?;
        info!(
            set = INFRASTRUCTURE_SET,
            collectors = ?infrastructure.collector_names(),
            resource_group = %self.provider.resource_group,
            location = %self.provider.location,
            "Assembled infrastructure collectors"
        );

        let status = StatusCollectorSet::new(self.client.azure_configs(), Arc::new(self.client));
        info!(set = STATUS_SET, "Assembled status collector");

        Ok(vec![Arc::new(infrastructure), Arc::new(status)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{build_client, ProviderClient};
    use crate::connection::ResolvedConnection;

    async fn offline_client() -> ProviderClient {
        let config = kube::Config::new("http://127.0.0.1:6443".parse().unwrap());
        build_client(ResolvedConnection::Rest(Box::new(config)))
            .await
            .unwrap()
    }

    fn provider() -> ProviderParams {
        ProviderParams {
            resource_group: "rg1".to_string(),
            location: "westeurope".to_string(),
            tenant_id: "t1".to_string(),
        }
    }

    #[tokio::test]
    async fn complete_parameters_yield_both_sets_in_order() {
        let sets = CollectorSetBuilder::new(offline_client().await, provider(), Duration::from_secs(60))
            .build()
            .unwrap();

        let names: Vec<&str> = sets.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec![INFRASTRUCTURE_SET, STATUS_SET]);
    }

    #[tokio::test]
    async fn one_bad_collector_fails_the_whole_build() {
        let mut params = provider();
        params.tenant_id.clear();

        let err = CollectorSetBuilder::new(offline_client().await, params, Duration::from_secs(60))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::CollectorAssembly { ref collector, .. } if collector == "credential"));
    }

    #[tokio::test]
    async fn zero_interval_fails_the_build() {
        let err = CollectorSetBuilder::new(offline_client().await, provider(), Duration::ZERO)
            .build()
            .err()
            .unwrap();
        assert_eq!(err.stage(), "collectors");
    }
}
