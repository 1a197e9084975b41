//! azure-collector - metrics collector for Azure-backed Kubernetes installations
//!
//! The service watches the AzureConfig resources of a control plane cluster
//! and exports tenant cluster inventory, credential health and cluster
//! condition metrics.
//!
//! # Modules
//!
//! - [`connection`] - Kubernetes connection strategy resolution
//! - [`client`] - Typed client construction and the collector-facing seams
//! - [`collector`] - Collector sets and concrete collectors
//! - [`service`] - Service construction and idempotent boot
//! - [`config`] - Service configuration bundle
//! - [`crd`] - AzureConfig custom resource
//! - [`version`] - Version descriptor
//! - [`metrics`] - OpenTelemetry instruments
//! - [`telemetry`] - Logging and OTLP export setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod client;
pub mod collector;
pub mod config;
pub mod connection;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod service;
pub mod telemetry;
pub mod version;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
