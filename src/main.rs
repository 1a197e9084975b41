//! azure-collector - metrics for Azure-backed Kubernetes installations

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use azure_collector::client::install_crypto_provider;
use azure_collector::config::{
    Identity, KubernetesParams, ProviderParams, ServiceConfig, TlsFiles,
};
use azure_collector::service::Service;
use azure_collector::telemetry::{init_telemetry, TelemetryConfig};
use azure_collector::version::{project_bundle, VersionInfo};

/// Time given to collector sets to observe cancellation before exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const DEFAULT_DESCRIPTION: &str =
    "Collects tenant cluster, credential and condition metrics from AzureConfig resources.";

/// azure-collector - metrics collector for Azure-backed Kubernetes installations
#[derive(Parser, Debug)]
#[command(name = "azure-collector", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    daemon: DaemonArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the collector (default mode)
    Daemon(DaemonArgs),

    /// Print version information as JSON and exit
    Version,
}

/// Daemon mode arguments
#[derive(Args, Debug, Clone)]
struct DaemonArgs {
    /// Kubernetes API server address
    #[arg(long, env = "KUBERNETES_ADDRESS", default_value = "")]
    kubernetes_address: String,

    /// Discover the API server from the pod's service account
    #[arg(
        long,
        env = "KUBERNETES_IN_CLUSTER",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    kubernetes_in_cluster: bool,

    /// Inline kubeconfig content, used with the address or in-cluster mode
    #[arg(long, env = "KUBERNETES_KUBECONFIG", default_value = "", hide_env_values = true)]
    kubernetes_kubeconfig: String,

    /// Path to a kubeconfig file
    #[arg(long, env = "KUBECONFIG_PATH", default_value = "")]
    kubernetes_kubeconfig_path: String,

    /// CA bundle for the API server (address mode only)
    #[arg(long, env = "KUBERNETES_TLS_CA_FILE")]
    kubernetes_tls_ca_file: Option<PathBuf>,

    /// Client certificate (address mode only)
    #[arg(long, env = "KUBERNETES_TLS_CRT_FILE")]
    kubernetes_tls_crt_file: Option<PathBuf>,

    /// Client private key (address mode only)
    #[arg(long, env = "KUBERNETES_TLS_KEY_FILE")]
    kubernetes_tls_key_file: Option<PathBuf>,

    /// Control plane resource group
    #[arg(long, env = "AZURE_RESOURCE_GROUP", default_value = "")]
    resource_group: String,

    /// Azure location of the installation
    #[arg(long, env = "AZURE_LOCATION", default_value = "")]
    location: String,

    /// Tenant of the installation's service principal
    #[arg(long, env = "AZURE_TENANT_ID", default_value = "")]
    tenant_id: String,

    /// Poll period of the infrastructure collectors, in seconds
    #[arg(long, env = "COLLECT_INTERVAL_SECS", default_value_t = 60)]
    collect_interval_secs: u64,

    /// Project description published in version information
    #[arg(long, env = "PROJECT_DESCRIPTION", default_value = DEFAULT_DESCRIPTION)]
    description: String,
}

impl DaemonArgs {
    fn provider(&self) -> ProviderParams {
        ProviderParams {
            resource_group: self.resource_group.clone(),
            location: self.location.clone(),
            tenant_id: self.tenant_id.clone(),
        }
    }

    fn into_service_config(self) -> ServiceConfig {
        let provider = self.provider();
        let kubernetes = KubernetesParams {
            address: self.kubernetes_address,
            in_cluster: self.kubernetes_in_cluster,
            kubeconfig_path: self.kubernetes_kubeconfig_path,
            kubeconfig: self.kubernetes_kubeconfig,
            tls: TlsFiles {
                ca_file: self.kubernetes_tls_ca_file,
                crt_file: self.kubernetes_tls_crt_file,
                key_file: self.kubernetes_tls_key_file,
            },
        };

        ServiceConfig::new(kubernetes, provider, Identity::from_build(self.description))
            .with_collect_interval(Duration::from_secs(self.collect_interval_secs))
            .with_span(tracing::info_span!("azure_collector"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => print_version(cli.daemon.description),
        Some(Commands::Daemon(args)) => run_daemon(args).await,
        None => run_daemon(cli.daemon).await,
    }
}

fn print_version(description: String) -> anyhow::Result<()> {
    let identity = Identity::from_build(description);
    let bundle = project_bundle(&identity);
    let info = VersionInfo::new(identity, vec![bundle])?;
    println!("{}", serde_json::to_string_pretty(&info.response())?);
    Ok(())
}

async fn run_daemon(args: DaemonArgs) -> anyhow::Result<()> {
    install_crypto_provider();
    init_telemetry(&TelemetryConfig::for_provider(args.provider()))?;

    let service = match Service::new(args.into_service_config()).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(stage = e.stage(), error = %e, "Failed to construct service");
            return Err(anyhow::Error::new(e)).context("service construction failed");
        }
    };

    let cancel = CancellationToken::new();
    service.boot(&cancel);

    wait_for_shutdown().await?;
    tracing::info!(grace = ?SHUTDOWN_GRACE, "Shutdown requested, stopping collector sets");
    cancel.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("failed to listen for SIGINT")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")
}
