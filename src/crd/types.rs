//! Supporting types for the AzureConfig CRD

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type set by the operator while a cluster is being deleted
pub const CONDITION_DELETING: &str = "Deleting";

/// Condition status value for a condition that holds
pub const CONDITION_TRUE: &str = "True";

/// Reference to a Secret in a specific namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct CredentialSecret {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
}

/// Cluster-level status condition as written by the azure-operator
///
/// Status is kept as a plain string: objects in the wild carry values other
/// than the usual True/False/Unknown.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusClusterCondition {
    /// Condition type (Creating, Created, Updating, Updated, Deleting)
    #[serde(default, rename = "type")]
    pub type_: String,

    /// Condition status
    #[serde(default)]
    pub status: String,

    /// Last time the condition transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl StatusClusterCondition {
    /// Create a condition with the current timestamp
    pub fn new(type_: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            status: status.into(),
            last_transition_time: Some(Utc::now()),
        }
    }
}

/// Release version the cluster ran at some point in time
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusClusterVersion {
    /// When the version was reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,

    /// Semantic version
    #[serde(default)]
    pub semver: String,
}
