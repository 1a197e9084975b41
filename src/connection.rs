//! Kubernetes connection resolution
//!
//! Turns the raw connection parameters into exactly one [`ConnectionStrategy`]
//! and then into a [`ResolvedConnection`]. Strategy selection is a pure check
//! and runs before any I/O; only the address and in-cluster strategies read
//! files while materialising their REST config.
//!
//! An inline kubeconfig, when given alongside the address or in-cluster
//! strategy, supplies the cluster and credentials instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::debug;

use crate::config::{KubernetesParams, TlsFiles};
use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// The single way this process reaches the API server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStrategy {
    /// Explicit API server address
    Address(String),
    /// Service account discovery inside a pod
    InCluster,
    /// Local kubeconfig file
    KubeconfigPath(PathBuf),
}

impl ConnectionStrategy {
    /// Pick the strategy from raw parameters
    ///
    /// Exactly one of address, in-cluster and kubeconfig path must be defined.
    pub fn from_params(params: &KubernetesParams) -> Result<Self, Error> {
        let mut defined = Vec::with_capacity(3);
        if !params.address.is_empty() {
            defined.push(Self::Address(params.address.clone()));
        }
        if params.in_cluster {
            defined.push(Self::InCluster);
        }
        if !params.kubeconfig_path.is_empty() {
            defined.push(Self::KubeconfigPath(PathBuf::from(&params.kubeconfig_path)));
        }

        match defined.len() {
            0 => Err(Error::invalid_config(
                "address or inCluster or kubeConfigPath must be defined",
            )),
            1 => Ok(defined.remove(0)),
            _ => Err(Error::invalid_config(
                "address and inCluster and kubeConfigPath must not be defined at the same time",
            )),
        }
    }

    /// Label used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Address(_) => "address",
            Self::InCluster => "in-cluster",
            Self::KubeconfigPath(_) => "kubeconfig",
        }
    }
}

/// Output of resolution: a REST config or a kubeconfig to load later
#[derive(Clone, Debug)]
pub enum ResolvedConnection {
    /// Fully populated REST connection descriptor
    Rest(Box<kube::Config>),
    /// Kubeconfig file reference, passed through verbatim
    KubeconfigPath(PathBuf),
}

/// Resolve the connection parameters into a connection descriptor
///
/// Async only because kube-rs loads kubeconfigs asynchronously; nothing here
/// contacts the API server.
pub async fn resolve(params: &KubernetesParams) -> Result<ResolvedConnection, Error> {
    let strategy = ConnectionStrategy::from_params(params)?;
    debug!(strategy = strategy.as_str(), "Resolved Kubernetes connection strategy");

    let mut config = match strategy {
        ConnectionStrategy::KubeconfigPath(path) => {
            return Ok(ResolvedConnection::KubeconfigPath(path));
        }
        strategy if !params.kubeconfig.is_empty() => {
            inline_kubeconfig_config(strategy.as_str(), &params.kubeconfig).await?
        }
        ConnectionStrategy::Address(address) => address_config(&address, &params.tls)?,
        ConnectionStrategy::InCluster => kube::Config::incluster()
            .map_err(|e| Error::connection_build("in-cluster", e.to_string()))?,
    };

    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Ok(ResolvedConnection::Rest(Box::new(config)))
}

/// Build a REST config from kubeconfig YAML content
async fn inline_kubeconfig_config(strategy: &str, yaml: &str) -> Result<kube::Config, Error> {
    let kubeconfig = Kubeconfig::from_yaml(yaml).map_err(|e| {
        Error::connection_build(strategy, format!("invalid inline kubeconfig: {e}"))
    })?;
    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| {
            Error::connection_build(strategy, format!("failed to load inline kubeconfig: {e}"))
        })
}

/// Build a REST config for an explicit address and its TLS files
fn address_config(address: &str, tls: &TlsFiles) -> Result<kube::Config, Error> {
    let uri: http::Uri = address
        .parse()
        .map_err(|e| Error::connection_build("address", format!("invalid address {address}: {e}")))?;
    let mut config = kube::Config::new(uri);

    if let Some(ca_file) = &tls.ca_file {
        config.root_cert = Some(read_ca_bundle(ca_file)?);
    }

    match (&tls.crt_file, &tls.key_file) {
        (Some(crt), Some(key)) => {
            ensure_readable(crt)?;
            ensure_readable(key)?;
            config.auth_info.client_certificate = Some(crt.to_string_lossy().to_string());
            config.auth_info.client_key = Some(key.to_string_lossy().to_string());
        }
        (None, None) => {}
        (Some(_), None) => {
            return Err(Error::connection_build(
                "address",
                "TLS crt file is set but key file is missing",
            ))
        }
        (None, Some(_)) => {
            return Err(Error::connection_build(
                "address",
                "TLS key file is set but crt file is missing",
            ))
        }
    }

    Ok(config)
}

/// Read a PEM CA bundle into DER certificates
fn read_ca_bundle(path: &Path) -> Result<Vec<Vec<u8>>, Error> {
    let data = read_file(path)?;
    let blocks = pem::parse_many(&data).map_err(|e| {
        Error::connection_build(
            "address",
            format!("invalid PEM in CA file {}: {}", path.display(), e),
        )
    })?;

    let certs: Vec<Vec<u8>> = blocks
        .into_iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(|block| block.contents().to_vec())
        .collect();

    if certs.is_empty() {
        return Err(Error::connection_build(
            "address",
            format!("no certificates found in CA file {}", path.display()),
        ));
    }
    Ok(certs)
}

fn ensure_readable(path: &Path) -> Result<(), Error> {
    read_file(path).map(|_| ())
}

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| {
        Error::connection_build(
            "address",
            format!("failed to read TLS file {}: {}", path.display(), e),
        )
    })
}
