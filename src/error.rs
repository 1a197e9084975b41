//! Error types for the azure-collector service
//!
//! Construction errors carry the stage that produced them so process main can
//! log a precise reason before exiting. Runtime errors stay inside the
//! collector sets that raise them.

use thiserror::Error;

/// Main error type for azure-collector operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required field is missing or the connection strategy is ambiguous
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// The offending field, when the error concerns a single field
        field: Option<String>,
        /// Description of what's invalid
        message: String,
    },

    /// Materialising the REST connection descriptor failed
    #[error("connection build error [{strategy}]: {message}")]
    ConnectionBuild {
        /// Strategy being resolved (address, in-cluster)
        strategy: String,
        /// Description of what failed
        message: String,
    },

    /// Building the typed API client failed
    #[error("client construction error: {message}")]
    ClientConstruction {
        /// Description of what failed
        message: String,
    },

    /// A collector could not be constructed
    #[error("collector assembly error [{collector}]: {message}")]
    CollectorAssembly {
        /// Name of the collector that failed
        collector: String,
        /// Description of what failed
        message: String,
    },

    /// Kubernetes API error raised while collecting
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A collector failed during a collection pass
    #[error("collection error [{collector}]: {message}")]
    Collection {
        /// Name of the collector that failed
        collector: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create an invalid configuration error not tied to a single field
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: None,
            message: msg.into(),
        }
    }

    /// Create an invalid configuration error for a specific field
    pub fn invalid_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: Some(field.into()),
            message: msg.into(),
        }
    }

    /// Create a connection build error for the given strategy
    pub fn connection_build(strategy: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ConnectionBuild {
            strategy: strategy.into(),
            message: msg.into(),
        }
    }

    /// Create a client construction error
    pub fn client_construction(msg: impl Into<String>) -> Self {
        Self::ClientConstruction {
            message: msg.into(),
        }
    }

    /// Create a collector assembly error
    pub fn collector_assembly(collector: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CollectorAssembly {
            collector: collector.into(),
            message: msg.into(),
        }
    }

    /// Create a runtime collection error
    pub fn collection(collector: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Collection {
            collector: collector.into(),
            message: msg.into(),
        }
    }

    /// Stage of the service that produced this error
    pub fn stage(&self) -> &'static str {
        match self {
            Error::InvalidConfiguration { .. } => "configuration",
            Error::ConnectionBuild { .. } => "connection",
            Error::ClientConstruction { .. } => "client",
            Error::CollectorAssembly { .. } => "collectors",
            Error::Kube { .. } | Error::Collection { .. } => "runtime",
        }
    }

    /// The configuration field this error names, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::InvalidConfiguration { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Whether this error is fatal to startup
    ///
    /// Every construction-phase error is fatal; runtime errors are handled by
    /// the collector set that raised them.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Kube { .. } | Error::Collection { .. })
    }
}
