//! Credential secret health collector
//!
//! Every AzureConfig points at a Secret holding the service principal the
//! azure-operator uses for that cluster. A secret missing any of the keys
//! below leaves the cluster unmanageable.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use tracing::warn;

use super::{Collector, SeriesTracker};
use crate::client::ClusterSource;
use crate::config::ProviderParams;
use crate::crd::AzureConfig;
use crate::metrics;
use crate::Error;

const NAME: &str = "credential";

/// Secret key holding the service principal client ID
pub const CLIENT_ID_KEY: &str = "azure.azureoperator.clientid";
/// Secret key holding the service principal secret
pub const CLIENT_SECRET_KEY: &str = "azure.azureoperator.clientsecret";
/// Secret key holding the subscription ID
pub const SUBSCRIPTION_ID_KEY: &str = "azure.azureoperator.subscriptionid";
/// Secret key holding the tenant ID
pub const TENANT_ID_KEY: &str = "azure.azureoperator.tenantid";

const REQUIRED_KEYS: [&str; 4] = [
    CLIENT_ID_KEY,
    CLIENT_SECRET_KEY,
    SUBSCRIPTION_ID_KEY,
    TENANT_ID_KEY,
];

/// Health of one cluster's credential secret
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CredentialHealth {
    /// Secret exists and holds every required key
    pub valid: bool,
    /// Secret tenant equals the installation tenant
    pub tenant_match: bool,
}

/// Evaluate a credential secret against the installation tenant
pub fn credential_health(secret: Option<&Secret>, tenant_id: &str) -> CredentialHealth {
    let Some(data) = secret.and_then(|s| s.data.as_ref()) else {
        return CredentialHealth::default();
    };

    let valid = REQUIRED_KEYS
        .iter()
        .all(|key| data.get(*key).is_some_and(|value| !value.0.is_empty()));
    let tenant_match = data
        .get(TENANT_ID_KEY)
        .is_some_and(|value| String::from_utf8_lossy(&value.0).trim() == tenant_id);

    CredentialHealth {
        valid,
        tenant_match,
    }
}

/// Labels of one credential validity series
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CredentialSeries {
    /// Tenant cluster ID
    pub cluster_id: String,
    /// `namespace/name` of the referenced secret, empty without a reference
    pub secret: String,
}

impl CredentialSeries {
    /// Series an AzureConfig reports on
    pub fn of(cfg: &AzureConfig) -> Self {
        let secret = cfg
            .spec
            .azure
            .credential_secret
            .as_ref()
            .map(|r| format!("{}/{}", r.namespace, r.name))
            .unwrap_or_default();
        Self {
            cluster_id: cfg.cluster_id(),
            secret,
        }
    }
}

/// Checks the credential secret behind every AzureConfig
pub struct CredentialCollector {
    source: Arc<dyn ClusterSource>,
    tenant_id: String,
    series: SeriesTracker<CredentialSeries>,
}

impl CredentialCollector {
    /// Create the collector; the tenant ID is required
    pub fn new(source: Arc<dyn ClusterSource>, provider: &ProviderParams) -> Result<Self, Error> {
        if provider.tenant_id.is_empty() {
            return Err(Error::collector_assembly(NAME, "tenant ID must not be empty"));
        }
        Ok(Self {
            source,
            tenant_id: provider.tenant_id.clone(),
            series: SeriesTracker::new(),
        })
    }

    /// Zero the series of clusters and secret refs missing from this pass
    ///
    /// A lookup failure does not retire a series: its object is still listed.
    fn retire_series(&self, configs: &[AzureConfig]) -> Vec<CredentialSeries> {
        let current: BTreeSet<CredentialSeries> = configs.iter().map(CredentialSeries::of).collect();
        let clusters: BTreeSet<&str> = current.iter().map(|s| s.cluster_id.as_str()).collect();
        let stale = self.series.replace(current.clone());

        for series in &stale {
            metrics::set_credential_valid(&series.cluster_id, &series.secret, false);
            if !clusters.contains(series.cluster_id.as_str()) {
                metrics::set_credential_tenant_match(&series.cluster_id, false);
            }
        }
        stale
    }

    async fn check(&self, cfg: &AzureConfig) -> Result<(), Error> {
        let cluster_id = cfg.cluster_id();
        let Some(secret_ref) = cfg.spec.azure.credential_secret.as_ref() else {
            metrics::set_credential_health(&cluster_id, "", false, false);
            return Ok(());
        };

        let secret = self
            .source
            .get_secret(&secret_ref.namespace, &secret_ref.name)
            .await?;
        let health = credential_health(secret.as_ref(), &self.tenant_id);
        metrics::set_credential_health(
            &cluster_id,
            &format!("{}/{}", secret_ref.namespace, secret_ref.name),
            health.valid,
            health.tenant_match,
        );
        Ok(())
    }
}

#[async_trait]
impl Collector for CredentialCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn collect(&self) -> Result<(), Error> {
        let configs = self.source.list_azure_configs().await?;

        let mut failed = 0usize;
        for cfg in &configs {
            if let Err(e) = self.check(cfg).await {
                failed += 1;
                warn!(cluster = %cfg.cluster_id(), error = %e, "Credential secret lookup failed");
            }
        }
        self.retire_series(&configs);

        if failed > 0 {
            return Err(Error::collection(
                NAME,
                format!("{failed} of {} credential lookups failed", configs.len()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClusterSource;
    use k8s_openapi::ByteString;
    use mockall::predicate::eq;
    use std::collections::BTreeMap;

    fn secret(entries: &[(&str, &str)]) -> Secret {
        let data: BTreeMap<String, ByteString> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
            .collect();
        Secret {
            data: Some(data),
            ..Default::default()
        }
    }

    fn full_secret(tenant: &str) -> Secret {
        secret(&[
            (CLIENT_ID_KEY, "id"),
            (CLIENT_SECRET_KEY, "secret"),
            (SUBSCRIPTION_ID_KEY, "sub"),
            (TENANT_ID_KEY, tenant),
        ])
    }

    fn azure_config(name: &str, with_secret: bool) -> AzureConfig {
        let azure = if with_secret {
            serde_json::json!({ "credentialSecret": { "name": "credential-default", "namespace": "giantswarm" } })
        } else {
            serde_json::json!({})
        };
        serde_json::from_value(serde_json::json!({
            "apiVersion": "provider.giantswarm.io/v1alpha1",
            "kind": "AzureConfig",
            "metadata": { "name": name, "namespace": "default" },
            "spec": { "cluster": { "id": name }, "azure": azure }
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

    // ==========================================================================
    // Story: Credential health derivation
    // ==========================================================================

    #[test]
    fn complete_secret_in_installation_tenant_is_healthy() {
        let health = credential_health(Some(&full_secret("t1")), "t1");
        assert_eq!(
            health,
            CredentialHealth {
                valid: true,
                tenant_match: true
            }
        );
    }

    #[test]
    fn customer_tenant_is_valid_but_not_matching() {
        let health = credential_health(Some(&full_secret("customer")), "t1");
        assert!(health.valid);
        assert!(!health.tenant_match);
    }

    #[test]
    fn missing_key_makes_secret_invalid() {
        let s = secret(&[(CLIENT_ID_KEY, "id"), (TENANT_ID_KEY, "t1")]);
        let health = credential_health(Some(&s), "t1");
        assert!(!health.valid);
        assert!(health.tenant_match);
    }

    #[test]
    fn empty_value_makes_secret_invalid() {
        let s = secret(&[
            (CLIENT_ID_KEY, ""),
            (CLIENT_SECRET_KEY, "secret"),
            (SUBSCRIPTION_ID_KEY, "sub"),
            (TENANT_ID_KEY, "t1"),
        ]);
        assert!(!credential_health(Some(&s), "t1").valid);
    }

    #[test]
    fn absent_secret_is_unhealthy() {
        assert_eq!(credential_health(None, "t1"), CredentialHealth::default());
    }

    #[test]
    fn empty_tenant_fails_assembly() {
        let mut params = provider();
        params.tenant_id.clear();
        let err = CredentialCollector::new(Arc::new(MockClusterSource::new()), &params)
            .err()
            .unwrap();
        assert!(err.to_string().contains("tenant ID"));
    }

    // ==========================================================================
    // Story: Collection pass
    // ==========================================================================

    #[tokio::test]
    async fn collect_fetches_each_referenced_secret() {
        let mut source = MockClusterSource::new();
        source
            .expect_list_azure_configs()
            .returning(|| Ok(vec![azure_config("h7d2k", true), azure_config("x1y2z", false)]));
        source
            .expect_get_secret()
            .with(eq("giantswarm"), eq("credential-default"))
            .times(1)
            .returning(|_, _| Ok(Some(full_secret("t1"))));

        let collector = CredentialCollector::new(Arc::new(source), &provider()).unwrap();
        assert!(collector.collect().await.is_ok());
    }

    // ==========================================================================
    // Story: Credential series of vanished clusters and old refs go to 0
    // ==========================================================================

    #[test]
    fn series_labels_follow_the_secret_reference() {
        assert_eq!(
            CredentialSeries::of(&azure_config("h7d2k", true)),
            CredentialSeries {
                cluster_id: "h7d2k".to_string(),
                secret: "giantswarm/credential-default".to_string()
            }
        );
        assert!(CredentialSeries::of(&azure_config("x1y2z", false)).secret.is_empty());
    }

    #[test]
    fn changed_reference_and_deleted_cluster_are_retired() {
        let collector = CredentialCollector::new(Arc::new(MockClusterSource::new()), &provider()).unwrap();

        assert!(collector
            .retire_series(&[azure_config("a1", true), azure_config("b2", true)])
            .is_empty());

        // a1 lost its secret reference, b2 was deleted
        let stale = collector.retire_series(&[azure_config("a1", false)]);
        assert_eq!(
            stale,
            vec![
                CredentialSeries {
                    cluster_id: "a1".to_string(),
                    secret: "giantswarm/credential-default".to_string()
                },
                CredentialSeries {
                    cluster_id: "b2".to_string(),
                    secret: "giantswarm/credential-default".to_string()
                },
            ]
        );
        assert!(collector.retire_series(&[azure_config("a1", false)]).is_empty());
    }

    #[tokio::test]
    async fn failed_lookups_keep_their_series() {
        let mut source = MockClusterSource::new();
        source
            .expect_list_azure_configs()
            .returning(|| Ok(vec![azure_config("a1", true)]));
        source
            .expect_get_secret()
            .returning(|_, _| Err(Error::collection("credential", "forbidden")));

        let collector = CredentialCollector::new(Arc::new(source), &provider()).unwrap();
        assert!(collector.collect().await.is_err());

        let stale = collector.retire_series(&[]);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].cluster_id, "a1");
    }

    #[tokio::test]
    async fn lookup_failures_are_reported_after_all_clusters() {
        let mut source = MockClusterSource::new();
        source
            .expect_list_azure_configs()
            .returning(|| Ok(vec![azure_config("a", true), azure_config("b", true)]));
        source
            .expect_get_secret()
            .times(2)
            .returning(|_, _| Err(Error::collection("credential", "forbidden")));

        let collector = CredentialCollector::new(Arc::new(source), &provider()).unwrap();
        let err = collector.collect().await.unwrap_err();
        assert!(err.to_string().contains("2 of 2"));
    }
}
