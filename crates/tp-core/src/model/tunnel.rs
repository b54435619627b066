//! Tunnel runtime state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine routing mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    /// Everything goes out directly
    #[serde(alias = "Direct")]
    Direct,
    /// Everything goes through the global selector
    #[serde(alias = "Global")]
    Global,
    /// Traffic is matched against rules
    #[default]
    #[serde(alias = "Rule")]
    Rule,
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelMode::Direct => write!(f, "direct"),
            TunnelMode::Global => write!(f, "global"),
            TunnelMode::Rule => write!(f, "rule"),
        }
    }
}

/// Runtime status reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelState {
    /// Current routing mode
    pub mode: TunnelMode,
}
