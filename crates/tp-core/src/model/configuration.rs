//! Effective engine configuration summary

use serde::{Deserialize, Serialize};

use super::{LogLevel, TunnelMode};

/// The engine's effective configuration, as shown to users
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UiConfiguration {
    pub mode: TunnelMode,
    pub log_level: LogLevel,
    pub mixed_port: u16,
    pub allow_lan: bool,
    pub ipv6: bool,
}
