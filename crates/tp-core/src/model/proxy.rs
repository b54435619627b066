//! Proxy groups

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Ordering requested for the members of a proxy group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxySort {
    /// Engine order
    #[default]
    Default,
    /// By name
    Title,
    /// Fastest first, untested last
    Delay,
}

impl FromStr for ProxySort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(ProxySort::Default),
            "title" => Ok(ProxySort::Title),
            "delay" => Ok(ProxySort::Delay),
            other => Err(format!("unknown proxy sort '{}'", other)),
        }
    }
}

/// Kind of proxy or group, as named by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProxyType {
    Direct,
    Reject,
    Shadowsocks,
    ShadowsocksR,
    Snell,
    Socks5,
    Http,
    Vmess,
    Vless,
    Trojan,
    Hysteria,
    Hysteria2,
    Tuic,
    WireGuard,
    Relay,
    Selector,
    Fallback,
    URLTest,
    LoadBalance,
    #[serde(other)]
    Unknown,
}

impl ProxyType {
    /// Groups whose member can be chosen by the user
    pub fn is_selectable(&self) -> bool {
        matches!(self, ProxyType::Selector)
    }

    /// True for group kinds, false for leaf proxies
    pub fn is_group(&self) -> bool {
        matches!(
            self,
            ProxyType::Relay
                | ProxyType::Selector
                | ProxyType::Fallback
                | ProxyType::URLTest
                | ProxyType::LoadBalance
        )
    }
}

/// A member of a proxy group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub name: String,
    pub proxy_type: ProxyType,
    /// Last measured delay in milliseconds, `None` if untested or timed out
    pub delay: Option<u32>,
}

/// A named proxy group and its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyGroup {
    pub name: String,
    pub group_type: ProxyType,
    /// Currently selected member
    pub now: String,
    pub proxies: Vec<Proxy>,
}

impl ProxyGroup {
    /// Reorder members in place
    pub fn sort(&mut self, order: ProxySort) {
        match order {
            ProxySort::Default => {}
            ProxySort::Title => self.proxies.sort_by(|a, b| a.name.cmp(&b.name)),
            ProxySort::Delay => self
                .proxies
                .sort_by_key(|p| (p.delay.is_none(), p.delay.unwrap_or(u32::MAX))),
        }
    }
}
