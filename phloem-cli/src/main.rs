use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use phloem_cli::completions;
use phloem_cli::config::ProfileConfig;
use phloem_cli::output::ExperimentResults;
use phloem_core::Engine;
use phloem_protocols::{TcpConnector, TcpOptions};
use schemars::schema_for;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Phloem: reproducible key-value load generation
///
/// Phloem uses TOML configuration files (profiles) to define experiments: which commands to
/// send with which ratios and key patterns, traffic-log replay, cursor iteration, pipelining,
/// rate limits and reconnection.
///
/// Example usage:
///   phloem run -P profiles/get-set-zipfian.toml
///   phloem run -P profiles/scan-incremental.toml --set target.address=10.0.0.5:6379
///   phloem run -P profiles/monitor-replay.toml --set workload.replay.pattern=random
///   phloem completions bash > ~/.local/share/bash-completion/completions/phloem
///
/// Override any config value using dot notation:
///   --set run.threads=8
///   --set workload.commands.0.ratio=10
///   --set 'workload.commands.+={command="DEL __key__"}'
#[derive(Parser)]
#[command(name = "phloem")]
#[command(version, about = "Key-value load generator with config-first design", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment
    Run {
        /// Path to TOML profile configuration file
        #[arg(short = 'P', long, required = true)]
        profile: PathBuf,

        /// Override any configuration value using dot notation (repeatable)
        ///
        /// Examples:
        ///   --set target.address=127.0.0.1:6379
        ///   --set run.duration=30s
        ///   --set experiment.seed=999
        ///   --set connection.reconnect.enabled=true
        ///   --set output.file=/tmp/results.json
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate JSON Schema for configuration files
    Schema,

    /// List all valid config paths for --set flag (used by shell completions)
    #[command(hide = true)]
    CompletePaths,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Completions { shell } => {
            let bin_name = "phloem";
            match shell {
                Shell::Bash => println!("{}", completions::generate_bash_completion(bin_name)),
                _ => {
                    let mut cmd = Cli::command();
                    generate(shell, &mut cmd, bin_name.to_string(), &mut io::stdout());
                }
            }
            Ok(())
        }
        Commands::Schema => {
            let schema = schema_for!(ProfileConfig);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Commands::CompletePaths => {
            for path in completions::get_config_paths() {
                println!("{path}");
            }
            Ok(())
        }
        Commands::Run { profile, set } => run_experiment(profile, set),
    }
}

fn run_experiment(profile: PathBuf, set: Vec<String>) -> anyhow::Result<()> {
    tracing::info!("Loading profile: {}", profile.display());
    let config = ProfileConfig::from_file_with_overrides(&profile, &set)?;

    tracing::info!("=== Experiment Configuration ===");
    tracing::info!("Name: {}", config.experiment.name);
    if let Some(desc) = &config.experiment.description {
        tracing::info!("Description: {}", desc);
    }
    tracing::info!("Target: {}", config.target_address());
    tracing::info!("================================");

    // Every configuration error surfaces here, before any connection is opened
    let plan = config.engine_config().validate().context("Invalid configuration")?;

    let options = TcpOptions {
        connect_timeout: config.target.connect_timeout,
        io_timeout: config.target.io_timeout,
        ..TcpOptions::default()
    };
    let connector = TcpConnector::new(config.target_address(), options)?;
    tracing::info!("Resolved target to {}", connector.addr());

    let report = Engine::new(plan, connector).run()?;
    let results =
        ExperimentResults::from_report(&config.experiment.name, config.target_address(), &report);

    match (config.output.format.as_str(), &config.output.file) {
        (_, Some(path)) => {
            results.write_json(path)?;
            tracing::info!("Results written to: {}", path.display());
            if config.output.format == "text" {
                results.print_human();
            }
        }
        ("json", None) => println!("{}", results.to_json()?),
        _ => results.print_human(),
    }

    if !results.success {
        anyhow::bail!(
            "Run failed: {} connection(s) failed, {} did not complete their requests",
            results.failed_connections.len(),
            results.incomplete_connections.len()
        );
    }
    Ok(())
}
