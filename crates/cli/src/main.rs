//! Workload balance CLI
//!
//! A command-line tool for asking the scheduler extender to rank hosts and
//! checking its health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use balance_lib::models::WorkloadInstance;
use clap::{Parser, Subcommand};
use commands::{configure, health, prioritize};

const DEFAULT_EXTENDER_URL: &str = "http://localhost:8888";

/// Workload balance CLI
#[derive(Parser)]
#[command(name = "wbctl")]
#[command(author, version, about = "CLI for the workload balance scheduler extender", long_about = None)]
pub struct Cli {
    /// Extender endpoint URL (can also be set via WBCTL_EXTENDER_URL env var)
    #[arg(long, env = "WBCTL_EXTENDER_URL")]
    pub extender_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rank candidate hosts for a workload instance
    Prioritize {
        /// Namespace of the instance
        #[arg(long, short)]
        namespace: Option<String>,

        /// Instance name
        #[arg(long, short)]
        instance: String,

        /// Instance label as key=value (repeatable)
        #[arg(long = "label", short, value_parser = prioritize::parse_label)]
        labels: Vec<(String, String)>,

        /// Candidate host (repeatable)
        #[arg(long = "host", short = 'H', required = true)]
        hosts: Vec<String>,

        /// Cycle deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Show extender health and readiness
    Health,

    /// Show or change persisted defaults
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the current configuration
    Show,

    /// Update configuration values
    Set {
        /// Default extender URL
        #[arg(long)]
        extender_url: Option<String>,

        /// Default namespace
        #[arg(long)]
        namespace: Option<String>,

        /// Default output format
        #[arg(long)]
        format: Option<output::OutputFormat>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::from_name)
        })
        .unwrap_or_default();

    let extender_url = cli
        .extender_url
        .clone()
        .or_else(|| config.extender_url.clone())
        .unwrap_or_else(|| DEFAULT_EXTENDER_URL.to_string());

    match cli.command {
        Commands::Prioritize {
            namespace,
            instance,
            labels,
            hosts,
            timeout_ms,
        } => {
            let namespace = namespace
                .or_else(|| config.default_namespace.clone())
                .unwrap_or_else(|| "default".to_string());
            let instance = labels
                .into_iter()
                .fold(WorkloadInstance::new(instance, namespace), |i, (k, v)| {
                    i.with_label(k, v)
                });

            let client = client::ApiClient::new(&extender_url)?;
            prioritize::prioritize(&client, instance, hosts, timeout_ms, format).await?;
        }
        Commands::Health => {
            let client = client::ApiClient::new(&extender_url)?;
            health::show_health(&client, format).await?;
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => configure::show_config(&config)?,
            ConfigCommands::Set {
                extender_url,
                namespace,
                format,
            } => configure::set_config(config, extender_url, namespace, format)?,
        },
    }

    Ok(())
}
