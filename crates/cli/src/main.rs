//! DevStack CLI - Main Entry Point

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use devstack_cli::client::ApiClient;
use devstack_cli::commands::{container, environment, service, status, terminal, watch};
use devstack_cli::config::CliConfig;
use devstack_cli::output;

/// DevStack CLI - manage containerized development environments
#[derive(Parser)]
#[command(name = "devstack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Backend URL; overrides the config file
    #[arg(long, env = "DEVSTACK_BACKEND_URL", global = true)]
    backend_url: Option<String>,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage nanobox containers
    #[command(subcommand)]
    Container(container::ContainerCommands),

    /// Manage development environments
    #[command(subcommand, alias = "env")]
    Environment(environment::EnvironmentCommands),

    /// Manage environment services
    #[command(subcommand)]
    Service(service::ServiceCommands),

    /// Open a shell in a container
    Terminal(terminal::TerminalArgs),

    /// Live dashboard
    Watch(watch::WatchArgs),

    /// Show host health and metrics
    Status,

    /// Write the effective configuration to the config file
    InitConfig,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stderr keeps stdout clean for output and raw terminals
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(devstack_common::default_config_path);
    let mut config = CliConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    config.validate()?;

    let client = ApiClient::new(config.endpoints()?, config.request_timeout())?;

    match cli.command {
        Commands::Container(cmd) => container::execute(cmd, client, cli.format).await?,
        Commands::Environment(cmd) => environment::execute(cmd, client, cli.format).await?,
        Commands::Service(cmd) => service::execute(cmd, client, cli.format).await?,
        Commands::Terminal(args) => terminal::execute(args, client, &config, cli.format).await?,
        Commands::Watch(args) => watch::execute(args, client, &config).await?,
        Commands::Status => {
            if let Err(e) = status::execute(client, cli.format).await {
                output::print_error(&format!("Backend is not responding at {}: {}", config.backend_url, e));
                std::process::exit(1);
            }
        }
        Commands::InitConfig => {
            config.save(&config_path)?;
            output::print_success(&format!("Configuration written to {}", config_path.display()));
        }
        Commands::Version => {
            println!("DevStack CLI v{}", devstack_common::VERSION);
            println!("Backend: {}", config.backend_url);
        }
    }

    Ok(())
}
