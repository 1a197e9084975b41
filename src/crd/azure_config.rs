//! AzureConfig CRD as published by the azure-operator
//!
//! Only the fields the collectors read are modelled; unknown fields are
//! ignored on deserialisation.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CredentialSecret, StatusClusterCondition, StatusClusterVersion};

/// Label carrying the release a tenant cluster runs
pub const RELEASE_VERSION_LABEL: &str = "release.giantswarm.io/version";

/// AzureConfig describes one tenant cluster on Azure.
///
/// Example:
/// ```yaml
/// apiVersion: provider.giantswarm.io/v1alpha1
/// kind: AzureConfig
/// metadata:
///   name: h7d2k
///   namespace: default
/// spec:
///   cluster:
///     id: h7d2k
///   azure:
///     credentialSecret:
///       name: credential-default
///       namespace: giantswarm
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "provider.giantswarm.io",
    version = "v1alpha1",
    kind = "AzureConfig",
    namespaced,
    status = "AzureConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AzureConfigSpec {
    /// Generic cluster settings
    #[serde(default)]
    pub cluster: ClusterSpec,

    /// Azure specific settings
    #[serde(default)]
    pub azure: AzureSpec,
}

/// Generic cluster settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Tenant cluster ID
    #[serde(default)]
    pub id: String,
}

/// Azure specific settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AzureSpec {
    /// Secret holding the service principal for this cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_secret: Option<CredentialSecret>,
}

/// AzureConfig status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AzureConfigStatus {
    /// Cluster level status
    #[serde(default)]
    pub cluster: StatusCluster,
}

/// Cluster level status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCluster {
    /// Observed conditions, oldest first
    #[serde(default)]
    pub conditions: Vec<StatusClusterCondition>,

    /// Release versions the cluster ran
    #[serde(default)]
    pub versions: Vec<StatusClusterVersion>,
}

impl AzureConfig {
    /// Tenant cluster ID, falling back to the object name
    pub fn cluster_id(&self) -> String {
        if self.spec.cluster.id.is_empty() {
            self.name_any()
        } else {
            self.spec.cluster.id.clone()
        }
    }

    /// Release version from the object labels
    pub fn release_version(&self) -> Option<&str> {
        self.labels().get(RELEASE_VERSION_LABEL).map(String::as_str)
    }

    /// Conditions reported in status, empty when status is missing
    pub fn conditions(&self) -> &[StatusClusterCondition] {
        self.status
            .as_ref()
            .map(|s| s.cluster.conditions.as_slice())
            .unwrap_or_default()
    }

    /// Most recently appended condition
    pub fn latest_condition(&self) -> Option<&StatusClusterCondition> {
        self.conditions().last()
    }

    /// Whether the object is marked for deletion
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
