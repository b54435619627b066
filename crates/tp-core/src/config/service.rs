//! Service configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::types::{ProfileId, ServiceMode};

/// Configuration for the tunplane service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// How traffic is brought into the engine
    pub service_mode: ServiceMode,

    /// Profile currently loaded into the engine
    pub active_profile: Option<ProfileId>,

    /// Where user proxy selections are persisted
    pub selections_path: PathBuf,

    /// Engine external controller
    pub controller: ControllerConfig,

    /// Privileged shell used in tun mode
    pub root: RootConfig,

    /// Managed tunnel service used outside tun mode
    pub tunnel: ManagedTunnelConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_mode: ServiceMode::default(),
            active_profile: None,
            selections_path: super::default_config_dir().join("selections.json"),
            controller: ControllerConfig::default(),
            root: RootConfig::default(),
            tunnel: ManagedTunnelConfig::default(),
        }
    }
}

/// Engine external-controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Base URL of the controller API
    pub address: String,

    /// Bearer secret, if the controller requires one
    pub secret: Option<String>,

    /// Timeout for ordinary requests
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// URL probed by group health checks
    pub health_check_url: String,

    /// Per-proxy timeout for group health checks
    #[serde(with = "duration_secs")]
    pub health_check_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:9090".to_string(),
            secret: None,
            timeout: Duration::from_secs(10),
            health_check_url: "https://www.gstatic.com/generate_204".to_string(),
            health_check_timeout: Duration::from_secs(5),
        }
    }
}

/// Privileged shell settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    /// Program that opens an elevated shell reading commands from stdin
    pub shell: String,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            shell: "su".to_string(),
        }
    }
}

/// Entry points of the managed tunnel service (argv vectors)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedTunnelConfig {
    pub start_command: Vec<String>,
    pub stop_command: Vec<String>,
}
