//! Tenant cluster inventory collector

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Collector, SeriesTracker};
use crate::client::ClusterSource;
use crate::config::ProviderParams;
use crate::crd::AzureConfig;
use crate::metrics;
use crate::Error;

const NAME: &str = "cluster";

/// Label value when a cluster has no release label
const UNKNOWN_RELEASE: &str = "unknown";

/// One tenant cluster as reported by the info gauge
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClusterInfo {
    /// Tenant cluster ID
    pub cluster_id: String,
    /// Release version label value
    pub release_version: String,
}

/// Derive info series from the listed AzureConfigs
pub fn cluster_infos(configs: &[AzureConfig]) -> Vec<ClusterInfo> {
    let mut infos: Vec<ClusterInfo> = configs
        .iter()
        .map(|cfg| ClusterInfo {
            cluster_id: cfg.cluster_id(),
            release_version: cfg.release_version().unwrap_or(UNKNOWN_RELEASE).to_string(),
        })
        .collect();
    infos.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
    infos
}

/// Counts tenant clusters in the installation's resource group and location
pub struct ClusterCollector {
    source: Arc<dyn ClusterSource>,
    location: String,
    resource_group: String,
    info_series: SeriesTracker<ClusterInfo>,
}

impl ClusterCollector {
    /// Create the collector; location and resource group are required
    pub fn new(source: Arc<dyn ClusterSource>, provider: &ProviderParams) -> Result<Self, Error> {
        if provider.resource_group.is_empty() {
            return Err(Error::collector_assembly(NAME, "resource group must not be empty"));
        }
        if provider.location.is_empty() {
            return Err(Error::collector_assembly(NAME, "location must not be empty"));
        }
        Ok(Self {
            source,
            location: provider.location.clone(),
            resource_group: provider.resource_group.clone(),
            info_series: SeriesTracker::new(),
        })
    }

    /// Write info series for this pass and zero the ones that went away
    ///
    /// Returns the retired series: deleted clusters and superseded releases.
    fn record_infos(&self, infos: &[ClusterInfo]) -> Vec<ClusterInfo> {
        for info in infos {
            metrics::set_cluster_info(&info.cluster_id, &self.location, &info.release_version, true);
        }

        let current: BTreeSet<ClusterInfo> = infos.iter().cloned().collect();
        let stale = self.info_series.replace(current);
        for info in &stale {
            metrics::set_cluster_info(&info.cluster_id, &self.location, &info.release_version, false);
        }
        stale
    }
}

#[async_trait]
impl Collector for ClusterCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn collect(&self) -> Result<(), Error> {
        let configs = self.source.list_azure_configs().await?;
        let infos = cluster_infos(&configs);

        metrics::set_cluster_count(&self.location, &self.resource_group, infos.len() as i64);
        self.record_infos(&infos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClusterSource;

    fn azure_config(name: &str, release: Option<&str>) -> AzureConfig {
        let mut labels = serde_json::Map::new();
        if let Some(release) = release {
            labels.insert(
                crate::crd::RELEASE_VERSION_LABEL.to_string(),
                serde_json::Value::String(release.to_string()),
            );
        }
        serde_json::from_value(serde_json::json!({
            "apiVersion": "provider.giantswarm.io/v1alpha1",
            "kind": "AzureConfig",
            "metadata": { "name": name, "namespace": "default", "labels": labels },
            "spec": { "cluster": { "id": name } }
        }))
        .unwrap()
    }

    fn provider() -> ProviderParams {
        ProviderParams {
            resource_group: "rg1".to_string(),
            location: "westeurope".to_string(),
            tenant_id: "t1".to_string(),
        }
    }

    #[test]
    fn infos_are_sorted_and_default_the_release() {
        let infos = cluster_infos(&[
            azure_config("zz9", Some("13.0.1")),
            azure_config("aa1", None),
        ]);
        assert_eq!(
            infos,
            vec![
                ClusterInfo {
                    cluster_id: "aa1".to_string(),
                    release_version: "unknown".to_string()
                },
                ClusterInfo {
                    cluster_id: "zz9".to_string(),
                    release_version: "13.0.1".to_string()
                },
            ]
        );
    }

    #[test]
    fn missing_location_fails_assembly() {
        let mut params = provider();
        params.location.clear();
        let err = ClusterCollector::new(Arc::new(MockClusterSource::new()), &params)
            .err()
            .unwrap();
        assert!(matches!(err, Error::CollectorAssembly { ref collector, .. } if collector == "cluster"));
        assert!(err.to_string().contains("location"));
    }

    #[test]
    fn missing_resource_group_fails_assembly() {
        let mut params = provider();
        params.resource_group.clear();
        assert!(ClusterCollector::new(Arc::new(MockClusterSource::new()), &params).is_err());
    }

    #[tokio::test]
    async fn collect_lists_azure_configs_once() {
        let mut source = MockClusterSource::new();
        source
            .expect_list_azure_configs()
            .times(1)
            .returning(|| Ok(vec![azure_config("h7d2k", Some("13.0.1"))]));

        let collector = ClusterCollector::new(Arc::new(source), &provider()).unwrap();
        assert!(collector.collect().await.is_ok());
    }

    // ==========================================================================
    // Story: Info series of vanished clusters and old releases go to 0
    // ==========================================================================

    #[test]
    fn release_bump_and_deletion_retire_old_info_series() {
        let collector = ClusterCollector::new(Arc::new(MockClusterSource::new()), &provider()).unwrap();

        let first = cluster_infos(&[azure_config("a1", Some("13.0.1")), azure_config("b2", None)]);
        assert!(collector.record_infos(&first).is_empty());

        let second = cluster_infos(&[azure_config("a1", Some("13.1.0"))]);
        assert_eq!(
            collector.record_infos(&second),
            vec![
                ClusterInfo {
                    cluster_id: "a1".to_string(),
                    release_version: "13.0.1".to_string()
                },
                ClusterInfo {
                    cluster_id: "b2".to_string(),
                    release_version: "unknown".to_string()
                },
            ]
        );

        assert!(collector.record_infos(&second).is_empty());
    }

    #[tokio::test]
    async fn collect_passes_feed_the_series_tracker() {
        let mut passes = vec![
            vec![azure_config("a1", Some("13.1.0"))],
            vec![azure_config("a1", Some("13.0.1"))],
        ];
        let mut source = MockClusterSource::new();
        source
            .expect_list_azure_configs()
            .times(2)
            .returning(move || Ok(passes.pop().unwrap_or_default()));

        let collector = ClusterCollector::new(Arc::new(source), &provider()).unwrap();
        collector.collect().await.unwrap();
        collector.collect().await.unwrap();

        assert_eq!(
            collector.record_infos(&[]),
            vec![ClusterInfo {
                cluster_id: "a1".to_string(),
                release_version: "13.1.0".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn failed_listing_keeps_previous_series() {
        let mut calls = 0;
        let mut source = MockClusterSource::new();
        source.expect_list_azure_configs().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(vec![azure_config("a1", Some("13.0.1"))])
            } else {
                Err(Error::collection("cluster", "apiserver unavailable"))
            }
        });

        let collector = ClusterCollector::new(Arc::new(source), &provider()).unwrap();
        collector.collect().await.unwrap();
        assert!(collector.collect().await.is_err());

        assert_eq!(
            collector.record_infos(&[]),
            vec![ClusterInfo {
                cluster_id: "a1".to_string(),
                release_version: "13.0.1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn list_failure_propagates() {
        let mut source = MockClusterSource::new();
        source
            .expect_list_azure_configs()
            .returning(|| Err(Error::collection("cluster", "apiserver unavailable")));

        let collector = ClusterCollector::new(Arc::new(source), &provider()).unwrap();
        let err = collector.collect().await.unwrap_err();
        assert!(err.to_string().contains("apiserver unavailable"));
    }
}
