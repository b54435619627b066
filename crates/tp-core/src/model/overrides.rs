//! Layered configuration overrides
//!
//! An override is sparse: every field is optional and an unset field leaves
//! the layer underneath unchanged. Overrides are stored per [`OverrideSlot`];
//! the engine applies `Persist` first and `Session` on top of it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::{LogLevel, TunnelMode};

/// Which override layer a patch applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideSlot {
    /// Survives restarts
    Persist,
    /// Ephemeral, cleared when the service stops
    Session,
}

impl OverrideSlot {
    /// All slots in the order the engine applies them
    pub const LAYERED: [OverrideSlot; 2] = [OverrideSlot::Persist, OverrideSlot::Session];
}

impl fmt::Display for OverrideSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideSlot::Persist => write!(f, "persist"),
            OverrideSlot::Session => write!(f, "session"),
        }
    }
}

impl FromStr for OverrideSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "persist" => Ok(OverrideSlot::Persist),
            "session" => Ok(OverrideSlot::Session),
            other => Err(format!("unknown override slot '{}'", other)),
        }
    }
}

/// Userspace network stack backing the tunnel device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TunStack {
    #[serde(rename = "gvisor")]
    GVisor,
    #[serde(rename = "system")]
    System,
}

/// Kernel-level tunnel settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TunConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<TunStack>,
    /// Address patterns whose DNS traffic is answered by the engine, in order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_hijack: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_route: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_detect_interface: Option<bool>,
}

impl TunConfiguration {
    /// Lay `upper` over `self`, field by field
    pub fn overlay(&self, upper: &TunConfiguration) -> TunConfiguration {
        TunConfiguration {
            enable: pick(&upper.enable, &self.enable),
            device: pick(&upper.device, &self.device),
            stack: pick(&upper.stack, &self.stack),
            dns_hijack: pick(&upper.dns_hijack, &self.dns_hijack),
            auto_route: pick(&upper.auto_route, &self.auto_route),
            auto_detect_interface: pick(&upper.auto_detect_interface, &self.auto_detect_interface),
        }
    }

    /// Own values of the fields `mask` sets
    pub fn restricted_to(&self, mask: &TunConfiguration) -> TunConfiguration {
        TunConfiguration {
            enable: keep(&self.enable, &mask.enable),
            device: keep(&self.device, &mask.device),
            stack: keep(&self.stack, &mask.stack),
            dns_hijack: keep(&self.dns_hijack, &mask.dns_hijack),
            auto_route: keep(&self.auto_route, &mask.auto_route),
            auto_detect_interface: keep(&self.auto_detect_interface, &mask.auto_detect_interface),
        }
    }
}

/// DNS settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DnsOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nameserver: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Vec<String>>,
}

impl DnsOverride {
    /// Lay `upper` over `self`, field by field
    pub fn overlay(&self, upper: &DnsOverride) -> DnsOverride {
        DnsOverride {
            enable: pick(&upper.enable, &self.enable),
            listen: pick(&upper.listen, &self.listen),
            ipv6: pick(&upper.ipv6, &self.ipv6),
            enhanced_mode: pick(&upper.enhanced_mode, &self.enhanced_mode),
            nameserver: pick(&upper.nameserver, &self.nameserver),
            fallback: pick(&upper.fallback, &self.fallback),
        }
    }

    /// Own values of the fields `mask` sets
    pub fn restricted_to(&self, mask: &DnsOverride) -> DnsOverride {
        DnsOverride {
            enable: keep(&self.enable, &mask.enable),
            listen: keep(&self.listen, &mask.listen),
            ipv6: keep(&self.ipv6, &mask.ipv6),
            enhanced_mode: keep(&self.enhanced_mode, &mask.enhanced_mode),
            nameserver: keep(&self.nameserver, &mask.nameserver),
            fallback: keep(&self.fallback, &mask.fallback),
        }
    }
}

/// A sparse set of configuration fields applied on top of the engine's profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConfigurationOverride {
    #[serde(rename = "port", skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socks_port: Option<u16>,
    #[serde(rename = "redir-port", skip_serializing_if = "Option::is_none")]
    pub redirect_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tproxy_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixed_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_lan: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<TunnelMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_controller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_controller_tls: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tun: Option<TunConfiguration>,
}

impl ConfigurationOverride {
    /// An override that only carries tunnel settings
    pub fn with_tun(tun: TunConfiguration) -> Self {
        Self {
            tun: Some(tun),
            ..Self::default()
        }
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Lay `upper` over `self`. Nested groups are merged field by field.
    pub fn overlay(&self, upper: &ConfigurationOverride) -> ConfigurationOverride {
        ConfigurationOverride {
            http_port: pick(&upper.http_port, &self.http_port),
            socks_port: pick(&upper.socks_port, &self.socks_port),
            redirect_port: pick(&upper.redirect_port, &self.redirect_port),
            tproxy_port: pick(&upper.tproxy_port, &self.tproxy_port),
            mixed_port: pick(&upper.mixed_port, &self.mixed_port),
            authentication: pick(&upper.authentication, &self.authentication),
            allow_lan: pick(&upper.allow_lan, &self.allow_lan),
            bind_address: pick(&upper.bind_address, &self.bind_address),
            mode: pick(&upper.mode, &self.mode),
            log_level: pick(&upper.log_level, &self.log_level),
            ipv6: pick(&upper.ipv6, &self.ipv6),
            hosts: pick(&upper.hosts, &self.hosts),
            dns: match (&self.dns, &upper.dns) {
                (Some(lower), Some(upper)) => Some(lower.overlay(upper)),
                (lower, upper) => pick(upper, lower),
            },
            external_controller: pick(&upper.external_controller, &self.external_controller),
            external_controller_tls: pick(
                &upper.external_controller_tls,
                &self.external_controller_tls,
            ),
            secret: pick(&upper.secret, &self.secret),
            tun: match (&self.tun, &upper.tun) {
                (Some(lower), Some(upper)) => Some(lower.overlay(upper)),
                (lower, upper) => pick(upper, lower),
            },
        }
    }

    /// Own values of exactly the fields `mask` sets.
    ///
    /// Applied to a snapshot of the running configuration, this yields what
    /// the engine held before `mask` was patched in.
    pub fn restricted_to(&self, mask: &ConfigurationOverride) -> ConfigurationOverride {
        ConfigurationOverride {
            http_port: keep(&self.http_port, &mask.http_port),
            socks_port: keep(&self.socks_port, &mask.socks_port),
            redirect_port: keep(&self.redirect_port, &mask.redirect_port),
            tproxy_port: keep(&self.tproxy_port, &mask.tproxy_port),
            mixed_port: keep(&self.mixed_port, &mask.mixed_port),
            authentication: keep(&self.authentication, &mask.authentication),
            allow_lan: keep(&self.allow_lan, &mask.allow_lan),
            bind_address: keep(&self.bind_address, &mask.bind_address),
            mode: keep(&self.mode, &mask.mode),
            log_level: keep(&self.log_level, &mask.log_level),
            ipv6: keep(&self.ipv6, &mask.ipv6),
            hosts: keep(&self.hosts, &mask.hosts),
            dns: match (&self.dns, &mask.dns) {
                (Some(own), Some(mask)) => Some(own.restricted_to(mask)),
                _ => None,
            },
            external_controller: keep(&self.external_controller, &mask.external_controller),
            external_controller_tls: keep(
                &self.external_controller_tls,
                &mask.external_controller_tls,
            ),
            secret: keep(&self.secret, &mask.secret),
            tun: match (&self.tun, &mask.tun) {
                (Some(own), Some(mask)) => Some(own.restricted_to(mask)),
                _ => None,
            },
        }
    }
}

fn keep<T: Clone, M>(own: &Option<T>, mask: &Option<M>) -> Option<T> {
    mask.as_ref().and(own.clone())
}

fn pick<T: Clone>(upper: &Option<T>, lower: &Option<T>) -> Option<T> {
    upper.clone().or_else(|| lower.clone())
}
