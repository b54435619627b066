//! Managed tunnel service driven by external commands

use std::io;

use async_trait::async_trait;
use tokio::process::Command;

use tp_core::config::ManagedTunnelConfig;
use tp_core::traits::ManagedTunnel;

/// Starts and stops the tunnel service by running configured commands
#[derive(Debug, Clone)]
pub struct CommandTunnel {
    start: Vec<String>,
    stop: Vec<String>,
}

impl CommandTunnel {
    pub fn new(start: Vec<String>, stop: Vec<String>) -> Self {
        Self { start, stop }
    }

    pub fn from_config(config: &ManagedTunnelConfig) -> Self {
        Self::new(config.start_command.clone(), config.stop_command.clone())
    }
}

async fn run(argv: &[String], action: &str) -> io::Result<()> {
    let Some((program, args)) = argv.split_first() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no {} command configured", action),
        ));
    };

    tracing::debug!("Running tunnel {} command: {:?}", action, argv);
    let status = Command::new(program).args(args).status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "tunnel {} command '{}' exited with {}",
            action, program, status
        )))
    }
}

#[async_trait]
impl ManagedTunnel for CommandTunnel {
    async fn start(&self) -> io::Result<()> {
        run(&self.start, "start").await
    }

    async fn stop(&self) -> io::Result<()> {
        run(&self.stop, "stop").await
    }
}
