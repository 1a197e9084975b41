//! Service configuration bundle
//!
//! `ServiceConfig` is assembled once by process main from CLI flags and
//! environment and handed to [`crate::service::Service::new`].

use std::path::PathBuf;
use std::time::Duration;

use crate::Error;

/// Default poll period for the infrastructure collector set
pub const DEFAULT_COLLECT_INTERVAL: Duration = Duration::from_secs(60);

/// Paths to TLS material for the explicit address strategy
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsFiles {
    /// CA bundle used to verify the API server
    pub ca_file: Option<PathBuf>,
    /// Client certificate
    pub crt_file: Option<PathBuf>,
    /// Client private key
    pub key_file: Option<PathBuf>,
}

/// Raw Kubernetes connection parameters, exactly one of which may be set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KubernetesParams {
    /// Explicit API server address
    pub address: String,
    /// Discover the API server from the service account environment
    pub in_cluster: bool,
    /// Path to a kubeconfig file
    pub kubeconfig_path: String,
    /// Inline kubeconfig YAML; replaces address and TLS files when set
    ///
    /// Not a strategy of its own: it only applies together with the address
    /// or in-cluster strategy.
    pub kubeconfig: String,
    /// TLS material for the address strategy
    pub tls: TlsFiles,
}

/// Provider-side scope the infrastructure collectors report on
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderParams {
    /// Control plane resource group
    pub resource_group: String,
    /// Azure location (e.g. westeurope)
    pub location: String,
    /// Tenant owning the installation's service principal
    pub tenant_id: String,
}

/// Identity metadata published through the version descriptor
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    /// Human readable project description
    pub description: String,
    /// Commit the binary was built from
    pub git_commit: String,
    /// Project name
    pub project_name: String,
    /// Source repository URL
    pub source: String,
    /// Project version
    pub version: String,
}

impl Identity {
    /// Identity of this binary as recorded at build time
    pub fn from_build(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            git_commit: env!("AZURE_COLLECTOR_GIT_COMMIT").to_string(),
            project_name: env!("CARGO_PKG_NAME").to_string(),
            source: env!("CARGO_PKG_REPOSITORY").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Reject empty identity fields, naming the first one found
    pub fn validate(&self) -> Result<(), Error> {
        let fields = [
            ("description", &self.description),
            ("git_commit", &self.git_commit),
            ("project_name", &self.project_name),
            ("source", &self.source),
            ("version", &self.version),
        ];

        for (name, value) in fields {
            if value.is_empty() {
                return Err(Error::invalid_field(
                    name,
                    format!("{name} must not be empty"),
                ));
            }
        }
        Ok(())
    }
}

/// Immutable input bundle for service construction
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Parent span for every log line the service emits
    pub span: tracing::Span,
    /// Kubernetes connection parameters
    pub kubernetes: KubernetesParams,
    /// Provider scope for the infrastructure collectors
    pub provider: ProviderParams,
    /// Version identity
    pub identity: Identity,
    /// Poll period of the infrastructure collector set
    pub collect_interval: Duration,
}

impl ServiceConfig {
    /// Create a config with the default interval, logging under the current span
    pub fn new(kubernetes: KubernetesParams, provider: ProviderParams, identity: Identity) -> Self {
        Self {
            span: tracing::Span::current(),
            kubernetes,
            provider,
            identity,
            collect_interval: DEFAULT_COLLECT_INTERVAL,
        }
    }

    /// Override the poll interval
    pub fn with_collect_interval(mut self, interval: Duration) -> Self {
        self.collect_interval = interval;
        self
    }

    /// Override the logging span
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }
}
