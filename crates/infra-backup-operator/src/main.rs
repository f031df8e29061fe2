//! Infra backup operator - publishes cluster infrastructure backup specs

mod runner;

use std::collections::BTreeSet;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use kube::Client;

use infra_backup::config::DEFAULT_NAMESPACES;
use infra_backup::{build_specs, validate, ReconcileSettings, RelationEndpoint};
use infra_backup_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use infra_backup_common::DEFAULT_OPERATOR_NAMESPACE;

use crate::runner::RunnerConfig;

/// Infra backup operator - decides what cluster infrastructure to back up
#[derive(Parser, Debug)]
#[command(name = "infra-backup-operator", version, about, long_about = None)]
struct Cli {
    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormatArg::Json, global = true)]
    log_format: LogFormatArg,

    #[command(flatten)]
    deployment: DeploymentArgs,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches the config and relation ConfigMaps, refreshes status
    /// periodically, and publishes backup specs to joined peers.
    Run,

    /// Print the specs that would be published, without cluster access
    Render(RenderArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogFormatArg {
    Json,
    Text,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Text => LogFormat::Text,
        }
    }
}

/// Which specs this deployment publishes
#[derive(Args, Debug)]
struct DeploymentArgs {
    /// Relation endpoints to publish specs on
    #[arg(
        long,
        env = "INFRA_BACKUP_ENDPOINTS",
        value_delimiter = ',',
        default_value = "cluster-infra-backup,namespaced-infra-backup",
        global = true
    )]
    endpoints: Vec<RelationEndpoint>,

    /// Also back up Cilium network policies
    #[arg(long, env = "INFRA_BACKUP_INCLUDE_CILIUM_POLICIES", global = true)]
    include_cilium_policies: bool,
}

impl DeploymentArgs {
    fn settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            endpoints: self.endpoints.iter().copied().collect(),
            include_cilium: self.include_cilium_policies,
        }
    }
}

/// Controller settings
#[derive(Args, Debug)]
struct RunArgs {
    /// Namespace holding the operator's ConfigMaps
    #[arg(long, env = "POD_NAMESPACE", default_value = DEFAULT_OPERATOR_NAMESPACE)]
    namespace: String,

    /// ConfigMap holding the `namespaces` selection
    #[arg(long, env = "INFRA_BACKUP_CONFIG_MAP", default_value = "infra-backup-config")]
    config_map: String,

    /// ConfigMap the operator writes its status to
    #[arg(long, env = "INFRA_BACKUP_STATUS_CONFIG_MAP", default_value = "infra-backup-status")]
    status_config_map: String,

    /// Seconds between periodic status refreshes
    #[arg(long, env = "INFRA_BACKUP_UPDATE_STATUS_INTERVAL", default_value_t = 300)]
    update_status_interval: u64,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Namespaces present in the cluster
    #[arg(long, value_delimiter = ',', required = true)]
    cluster_namespaces: Vec<String>,

    /// Namespace selection, as it would appear in the config ConfigMap
    #[arg(long, default_value = DEFAULT_NAMESPACES)]
    namespaces: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        format: cli.log_format.into(),
        ..Default::default()
    })?;

    match cli.command {
        Some(Commands::Render(args)) => render(&args, &cli.deployment.settings()),
        Some(Commands::Run) | None => {
            let client = Client::try_default().await?;
            runner::run(
                client,
                RunnerConfig {
                    namespace: cli.run.namespace,
                    config_map: cli.run.config_map,
                    status_config_map: cli.run.status_config_map,
                    update_status_interval: Duration::from_secs(cli.run.update_status_interval),
                    settings: cli.deployment.settings(),
                },
            )
            .await
        }
    }
}

fn render(args: &RenderArgs, settings: &ReconcileSettings) -> anyhow::Result<()> {
    let configured = validate(&args.namespaces)?;
    let cluster: BTreeSet<String> = args
        .cluster_namespaces
        .iter()
        .map(|ns| ns.trim().to_string())
        .filter(|ns| !ns.is_empty())
        .collect();

    let specs = build_specs(settings, &cluster, &configured);
    println!("{}", serde_json::to_string_pretty(&specs)?);
    Ok(())
}
