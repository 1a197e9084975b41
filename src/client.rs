//! Typed Kubernetes client construction
//!
//! [`build_client`] turns a [`ResolvedConnection`] into a [`ProviderClient`].
//! The collectors never touch `kube::Api` directly; they read through
//! [`ClusterSource`] and write through [`StatusWriter`] so their logic can be
//! tested without a cluster.

use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::connection::{ResolvedConnection, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::crd::AzureConfig;
use crate::Error;

/// Install the aws-lc-rs rustls provider for this process
///
/// Safe to call repeatedly; only the first call installs anything.
pub fn install_crypto_provider() {
    // Err only means a provider is already installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Build a typed client from a resolved connection
///
/// Does not contact the API server.
pub async fn build_client(connection: ResolvedConnection) -> Result<ProviderClient, Error> {
    install_crypto_provider();

    let config = match connection {
        ResolvedConnection::Rest(config) => *config,
        ResolvedConnection::KubeconfigPath(path) => load_kubeconfig(&path).await?,
    };

    debug!(cluster_url = %config.cluster_url, "Building Kubernetes client");
    let client = Client::try_from(config)
        .map_err(|e| Error::client_construction(format!("failed to create client: {e}")))?;
    Ok(ProviderClient::new(client))
}

async fn load_kubeconfig(path: &Path) -> Result<Config, Error> {
    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        Error::client_construction(format!(
            "failed to read kubeconfig {}: {}",
            path.display(),
            e
        ))
    })?;
    let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::client_construction(format!("failed to load kubeconfig: {e}")))?;
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Ok(config)
}

/// Read access the infrastructure collectors need
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// List AzureConfigs in all namespaces
    async fn list_azure_configs(&self) -> Result<Vec<AzureConfig>, Error>;

    /// Fetch a Secret, `None` when it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;
}

/// Write access the status collector needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Merge-patch the status subresource of an AzureConfig
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<(), Error>;
}

/// Kubernetes client with typed access to the provider's resources
///
/// Cloning is cheap; every clone shares the same connection pool.
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
}

impl ProviderClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Generic object access
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// AzureConfigs across all namespaces, used for list and watch
    pub fn azure_configs(&self) -> Api<AzureConfig> {
        Api::all(self.client.clone())
    }

    /// AzureConfigs in one namespace
    pub fn azure_configs_in(&self, namespace: &str) -> Api<AzureConfig> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Secrets in one namespace
    pub fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterSource for ProviderClient {
    async fn list_azure_configs(&self) -> Result<Vec<AzureConfig>, Error> {
        let list = self.azure_configs().list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        Ok(self.secrets(namespace).get_opt(name).await?)
    }
}

#[async_trait]
impl StatusWriter for ProviderClient {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<(), Error> {
        self.azure_configs_in(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
