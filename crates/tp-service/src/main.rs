//! tunplane service daemon
//!
//! `run` brings the tunnel up and keeps the control plane alive until a
//! shutdown signal arrives. The other subcommands issue a single control
//! plane call against the configured engine and print the result as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tp_core::config::{self, ServiceConfig};
use tp_core::model::{
    ConfigurationOverride, LogLevel, LogMessage, OverrideSlot, ProviderType, ProxySort,
};
use tp_core::traits::LogObserver;
use tp_core::ServiceMode;
use tp_service::ServiceHost;

#[derive(Parser)]
#[command(name = "tp-service")]
#[command(about = "tunplane tunnel service")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Service mode (overrides config)
    #[arg(long, global = true)]
    mode: Option<ServiceModeArg>,

    /// Run with verbose output
    #[arg(short, long, global = true)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ServiceModeArg {
    Vpn,
    Tun,
}

impl From<ServiceModeArg> for ServiceMode {
    fn from(arg: ServiceModeArg) -> Self {
        match arg {
            ServiceModeArg::Vpn => ServiceMode::Vpn,
            ServiceModeArg::Tun => ServiceMode::Tun,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Start the tunnel and run until interrupted
    Run {
        /// Re-emit engine log records through the service log
        #[arg(long)]
        follow_logs: bool,
    },
    /// Show the engine's tunnel mode
    State,
    /// Show total traffic in bytes
    Traffic,
    /// List proxy groups
    Groups {
        /// Include groups that cannot be selected
        #[arg(long)]
        all: bool,
    },
    /// Show one proxy group
    Group {
        name: String,
        /// Member order: default, title or delay
        #[arg(long, default_value = "default")]
        sort: ProxySort,
    },
    /// Select a proxy within a group
    Select { group: String, name: String },
    /// Show the effective configuration
    Config,
    /// List proxy and rule providers
    Providers,
    /// Refresh a provider
    UpdateProvider {
        /// proxy or rule
        provider_type: ProviderType,
        name: String,
    },
    /// Re-test latency of a group's members
    HealthCheck { group: String },
    /// Show an override layer (persist or session)
    Override { slot: OverrideSlot },
    /// Replace an override layer with JSON read from a file
    PatchOverride { slot: OverrideSlot, file: PathBuf },
    /// Empty an override layer
    ClearOverride { slot: OverrideSlot },
    /// Write the effective configuration to the config file
    InitConfig {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = load_config(args.config.as_ref())?;
    if let Some(mode) = args.mode {
        config.service_mode = mode.into();
    }

    let command = args.command.unwrap_or(Command::Run { follow_logs: false });
    if let Command::InitConfig { force } = command {
        let path = args.config.unwrap_or_else(config::default_config_path);
        if path.exists() && !force {
            anyhow::bail!("{:?} already exists (use --force to replace it)", path);
        }
        config::save_config(&path, &config)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        tracing::info!("Wrote configuration to {:?}", path);
        return Ok(());
    }

    let host = ServiceHost::from_config(&config).context("Failed to set up service")?;
    let plane = host.plane();

    match command {
        Command::Run { follow_logs } => run(&host, follow_logs).await?,
        Command::State => print_json(&plane.query_tunnel_state().await?)?,
        Command::Traffic => print_json(&plane.query_traffic_total().await?)?,
        Command::Groups { all } => print_json(&plane.query_group_names(!all).await?)?,
        Command::Group { name, sort } => print_json(&plane.query_group(&name, sort).await?)?,
        Command::Select { group, name } => {
            let accepted = plane.patch_selector(&group, &name).await;
            print_json(&serde_json::json!({ "accepted": accepted }))?;
        }
        Command::Config => print_json(&plane.query_configuration().await?)?,
        Command::Providers => print_json(&plane.query_providers().await?)?,
        Command::UpdateProvider {
            provider_type,
            name,
        } => plane.update_provider(provider_type, &name).await?,
        Command::HealthCheck { group } => plane.health_check(&group).await?,
        Command::Override { slot } => print_json(&plane.query_override(slot).await?)?,
        Command::PatchOverride { slot, file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let configuration: ConfigurationOverride = serde_json::from_str(&content)
                .with_context(|| format!("Invalid override in {:?}", file))?;
            plane.patch_override(slot, &configuration).await?;
        }
        Command::ClearOverride { slot } => plane.clear_override(slot).await?,
        Command::InitConfig { .. } => {}
    }

    plane.shutdown().await;
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<ServiceConfig> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            ServiceConfig::default()
        }))
    } else {
        tracing::info!("Using default configuration");
        Ok(ServiceConfig::default())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(host: &ServiceHost, follow_logs: bool) -> Result<()> {
    tracing::info!("tunplane service starting...");
    host.start().await.context("Failed to start tunnel")?;

    let relay_task = if follow_logs {
        let (tx, mut rx) = mpsc::channel::<LogMessage>(256);
        host.plane()
            .set_log_observer(Some(Arc::new(tx) as Arc<dyn LogObserver>))
            .await
            .context("Failed to subscribe to engine logs")?;

        Some(tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                relay(&message);
            }
        }))
    } else {
        None
    };

    shutdown_signal().await?;

    host.shutdown().await;
    if let Some(relay_task) = relay_task {
        let _ = relay_task.await;
    }

    tracing::info!("tunplane service shutdown complete");
    Ok(())
}

/// Re-emit an engine log record at its own level
fn relay(message: &LogMessage) {
    match message.level {
        LogLevel::Debug => tracing::debug!(target: "engine", time = message.time, "{}", message.message),
        LogLevel::Info => tracing::info!(target: "engine", time = message.time, "{}", message.message),
        LogLevel::Warning => tracing::warn!(target: "engine", time = message.time, "{}", message.message),
        LogLevel::Error => tracing::error!(target: "engine", time = message.time, "{}", message.message),
        LogLevel::Silent => {}
    }
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        let mut signal =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to install signal handler")?;
        signal.recv().await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result.context("Failed to listen for Ctrl+C")?;
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        result = terminate => {
            result?;
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }

    Ok(())
}
