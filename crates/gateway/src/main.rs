//! podterm Gateway
//!
//! WebSocket gateway for interactive terminals and log streams in cluster
//! containers.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gateway::config::{default_config_path, Config};
use gateway::orchestrator::GatewayOrchestrator;
use tracing_subscriber::EnvFilter;

/// podterm Gateway - terminals into cluster containers over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "podterm-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the gateway.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the gateway server
    Serve {
        /// Address to listen on, overriding the config file
        #[arg(long, short, value_name = "ADDR")]
        listen: Option<String>,

        /// Emit logs as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Serve { listen, json } => {
            let mut config = Config::load(&config_path)?;
            config.apply_env_overrides();
            if let Some(listen) = listen {
                config.server.listen_addr = listen;
            }
            config.validate()?;

            init_tracing(&config, cli.verbose, json);
            tracing::info!(config = %config_path.display(), "podterm gateway starting...");

            serve(config).await?;
        }
        Commands::Config(ConfigCommands::Show) => {
            let mut config = Config::load(&config_path)?;
            config.apply_env_overrides();
            print!("{}", config.to_toml()?);
        }
        Commands::Config(ConfigCommands::Init { force }) => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            Config::default()
                .save(&config_path)
                .with_context(|| format!("Failed to initialise {}", config_path.display()))?;
            println!("Wrote default configuration to {}", config_path.display());
        }
    }

    Ok(())
}

/// Initialise the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level; `--verbose` wins over both.
fn init_tracing(config: &Config, verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.to_lowercase()))
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the server until a shutdown signal arrives.
async fn serve(config: Config) -> anyhow::Result<()> {
    let orchestrator = GatewayOrchestrator::new(config)?;
    let shutdown = orchestrator.shutdown_token();

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Received shutdown signal");
        shutdown.cancel();
    });

    orchestrator.run().await
}

/// Wait for a shutdown signal (SIGTERM or Ctrl-C).
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT");
        }
    }
}

/// Wait for a shutdown signal (Ctrl-C).
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
