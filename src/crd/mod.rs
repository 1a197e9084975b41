//! Custom Resource Definitions read by the collectors
//!
//! The collector does not own these CRDs; it only reads and watches them and
//! patches cluster conditions in status.

mod azure_config;
mod types;

pub use azure_config::{
    AzureConfig, AzureConfigSpec, AzureConfigStatus, AzureSpec, ClusterSpec, StatusCluster,
    RELEASE_VERSION_LABEL,
};
pub use types::{
    CredentialSecret, StatusClusterCondition, StatusClusterVersion, CONDITION_DELETING,
    CONDITION_TRUE,
};
