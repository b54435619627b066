//! Tunnel bring-up and teardown
//!
//! In tun mode the service configures the kernel tunnel itself: forwarding
//! rules are installed through a root shell and the engine is told, via
//! the session override layer, to open the tunnel device. In every other
//! mode the externally managed tunnel service is started and stopped.
//!
//! The service mode is read on each call, so stop always undoes whatever
//! the current mode implies.

use std::sync::Arc;

use tp_core::model::{ConfigurationOverride, OverrideSlot, TunConfiguration, TunStack};
use tp_core::traits::{ManagedTunnel, PrivilegedExecutor, ServiceStore};
use tp_core::ServiceMode;

use crate::error::PlaneError;
use crate::plane::ControlPlane;

/// Kernel tunnel device used in tun mode
pub const TUN_DEVICE: &str = "tun0";

/// Whether forwarding rules are being added or removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Insert,
    Delete,
}

impl RuleAction {
    fn flag(self) -> &'static str {
        match self {
            RuleAction::Insert => "-I",
            RuleAction::Delete => "-D",
        }
    }
}

/// The two FORWARD rules letting traffic out of and into `device`
pub fn forward_rules(action: RuleAction, device: &str) -> Vec<String> {
    let flag = action.flag();
    vec![
        format!("iptables -w 100 {} FORWARD -o {} -j ACCEPT", flag, device),
        format!("iptables -w 100 {} FORWARD -i {} -j ACCEPT", flag, device),
    ]
}

/// Session override that makes the engine open the tun device
pub fn tun_session_override() -> ConfigurationOverride {
    ConfigurationOverride::with_tun(TunConfiguration {
        enable: Some(true),
        device: Some(TUN_DEVICE.to_string()),
        stack: Some(TunStack::GVisor),
        dns_hijack: Some(Vec::new()),
        auto_route: Some(true),
        auto_detect_interface: Some(true),
    })
}

/// Starts and stops traffic capture according to the service mode
pub struct ServiceOrchestrator {
    plane: Arc<ControlPlane>,
    store: Arc<dyn ServiceStore>,
    executor: Arc<dyn PrivilegedExecutor>,
    tunnel: Arc<dyn ManagedTunnel>,
}

impl ServiceOrchestrator {
    pub fn new(
        plane: Arc<ControlPlane>,
        store: Arc<dyn ServiceStore>,
        executor: Arc<dyn PrivilegedExecutor>,
        tunnel: Arc<dyn ManagedTunnel>,
    ) -> Self {
        Self {
            plane,
            store,
            executor,
            tunnel,
        }
    }

    /// Bring traffic capture up.
    ///
    /// In tun mode a failure to install forwarding rules is logged and the
    /// override is patched anyway; only an engine rejection of the override
    /// is returned. Calling this twice without [`Self::stop`] installs the
    /// rules twice.
    pub async fn start(&self) -> Result<(), PlaneError> {
        let mode = self.store.service_mode();
        tracing::info!("Starting tunnel in {} mode", mode);

        match mode {
            ServiceMode::Tun => {
                if !self
                    .exec_privileged(forward_rules(RuleAction::Insert, TUN_DEVICE))
                    .await
                {
                    tracing::error!("Failed to install forwarding rules for {}", TUN_DEVICE);
                }
                self.plane
                    .patch_override(OverrideSlot::Session, &tun_session_override())
                    .await?;
            }
            ServiceMode::Vpn => self.tunnel.start().await?,
        }

        Ok(())
    }

    /// Bring traffic capture down, mirroring [`Self::start`]
    pub async fn stop(&self) -> Result<(), PlaneError> {
        let mode = self.store.service_mode();
        tracing::info!("Stopping tunnel in {} mode", mode);

        match mode {
            ServiceMode::Tun => {
                if !self
                    .exec_privileged(forward_rules(RuleAction::Delete, TUN_DEVICE))
                    .await
                {
                    tracing::warn!("Failed to remove forwarding rules for {}", TUN_DEVICE);
                }
                self.plane.clear_override(OverrideSlot::Session).await?;
            }
            ServiceMode::Vpn => self.tunnel.stop().await?,
        }

        Ok(())
    }

    async fn exec_privileged(&self, commands: Vec<String>) -> bool {
        let executor = Arc::clone(&self.executor);
        match tokio::task::spawn_blocking(move || executor.exec(&commands)).await {
            Ok(succeeded) => succeeded,
            Err(e) => {
                tracing::error!("Privileged executor task failed: {}", e);
                false
            }
        }
    }
}
