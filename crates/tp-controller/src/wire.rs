//! Controller JSON documents

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use tp_core::model::{
    ConfigurationOverride, LogLevel, Proxy, ProxyGroup, ProxyType, TunConfiguration, TunStack,
    TunnelMode, VehicleType,
};
use tp_core::EngineError;

/// Name of the engine's built-in top-level selector
pub const GLOBAL_GROUP: &str = "GLOBAL";

#[derive(Debug, Deserialize)]
pub struct ConnectionsResponse {
    #[serde(rename = "downloadTotal", default)]
    pub download_total: u64,
    #[serde(rename = "uploadTotal", default)]
    pub upload_total: u64,
}

#[derive(Debug, Deserialize)]
pub struct ProxiesResponse {
    #[serde(default)]
    pub proxies: BTreeMap<String, ProxyEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ProxyEntry {
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    #[serde(default)]
    pub now: Option<String>,
    #[serde(default)]
    pub all: Option<Vec<String>>,
    #[serde(default)]
    pub history: Vec<DelayRecord>,
}

#[derive(Debug, Deserialize)]
pub struct DelayRecord {
    pub delay: u32,
}

impl ProxyEntry {
    /// Most recent delay; the engine records a timeout as 0
    pub fn last_delay(&self) -> Option<u32> {
        self.history.last().map(|h| h.delay).filter(|d| *d > 0)
    }
}

impl ProxiesResponse {
    /// Group names in the order the top-level selector lists them.
    ///
    /// Groups the top-level selector does not mention follow, by name. The
    /// top-level selector itself is never listed.
    pub fn group_names(&self, exclude_not_selectable: bool) -> Vec<String> {
        let is_wanted = |name: &str| {
            self.proxies.get(name).is_some_and(|entry| {
                name != GLOBAL_GROUP
                    && entry.all.is_some()
                    && (!exclude_not_selectable || entry.proxy_type.is_selectable())
            })
        };

        let mut names: Vec<String> = self
            .proxies
            .get(GLOBAL_GROUP)
            .and_then(|global| global.all.as_ref())
            .map(|all| all.iter().filter(|n| is_wanted(n.as_str())).cloned().collect())
            .unwrap_or_default();

        for name in self.proxies.keys() {
            if is_wanted(name.as_str()) && !names.contains(name) {
                names.push(name.clone());
            }
        }

        names
    }

    /// Build a group with its members resolved against the full proxy table
    pub fn group(&self, name: &str) -> Result<ProxyGroup, EngineError> {
        let entry = self
            .proxies
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("proxy group '{}'", name)))?;

        let members = entry
            .all
            .as_ref()
            .ok_or_else(|| EngineError::NotFound(format!("'{}' is not a proxy group", name)))?;

        let proxies = members
            .iter()
            .map(|member| match self.proxies.get(member) {
                Some(m) => Proxy {
                    name: member.clone(),
                    proxy_type: m.proxy_type.clone(),
                    delay: m.last_delay(),
                },
                None => Proxy {
                    name: member.clone(),
                    proxy_type: ProxyType::Unknown,
                    delay: None,
                },
            })
            .collect();

        Ok(ProxyGroup {
            name: name.to_string(),
            group_type: entry.proxy_type.clone(),
            now: entry.now.clone().unwrap_or_default(),
            proxies,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ProvidersResponse {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    #[serde(rename = "vehicleType")]
    pub vehicle_type: VehicleType,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
}

/// The running configuration as `GET /configs` reports it.
///
/// Only fields an override can set are read. The engine spells stacks in
/// mixed case (`gVisor`), so the stack is matched loosely.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunningConfig {
    pub port: Option<u16>,
    pub socks_port: Option<u16>,
    pub redir_port: Option<u16>,
    pub tproxy_port: Option<u16>,
    pub mixed_port: Option<u16>,
    pub authentication: Option<Vec<String>>,
    pub allow_lan: Option<bool>,
    pub bind_address: Option<String>,
    pub mode: Option<TunnelMode>,
    pub log_level: Option<LogLevel>,
    pub ipv6: Option<bool>,
    pub tun: Option<RunningTun>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunningTun {
    pub enable: Option<bool>,
    pub device: Option<String>,
    pub stack: Option<String>,
    pub dns_hijack: Option<Vec<String>>,
    pub auto_route: Option<bool>,
    pub auto_detect_interface: Option<bool>,
}

impl From<RunningConfig> for ConfigurationOverride {
    fn from(running: RunningConfig) -> Self {
        ConfigurationOverride {
            http_port: running.port,
            socks_port: running.socks_port,
            redirect_port: running.redir_port,
            tproxy_port: running.tproxy_port,
            mixed_port: running.mixed_port,
            authentication: running.authentication,
            allow_lan: running.allow_lan,
            bind_address: running.bind_address,
            mode: running.mode,
            log_level: running.log_level,
            ipv6: running.ipv6,
            tun: running.tun.map(|tun| TunConfiguration {
                enable: tun.enable,
                device: tun.device,
                stack: tun.stack.as_deref().and_then(|stack| {
                    match stack.to_ascii_lowercase().as_str() {
                        "gvisor" => Some(TunStack::GVisor),
                        "system" => Some(TunStack::System),
                        _ => None,
                    }
                }),
                dns_hijack: tun.dns_hijack,
                auto_route: tun.auto_route,
                auto_detect_interface: tun.auto_detect_interface,
            }),
            ..ConfigurationOverride::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogLine {
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub payload: String,
}

#[derive(Debug, Serialize)]
pub struct SelectRequest<'a> {
    pub name: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ProxiesResponse {
        serde_json::from_value(serde_json::json!({
            "proxies": {
                "GLOBAL": { "type": "Selector", "now": "Proxy", "all": ["Proxy", "Auto", "DIRECT"] },
                "Proxy": { "type": "Selector", "now": "hk-1", "all": ["hk-1", "jp-1", "Auto"] },
                "Auto": { "type": "URLTest", "now": "jp-1", "all": ["hk-1", "jp-1"] },
                "Streaming": { "type": "Selector", "now": "jp-1", "all": ["jp-1"] },
                "hk-1": { "type": "Shadowsocks", "history": [{ "delay": 120 }, { "delay": 95 }] },
                "jp-1": { "type": "Vmess", "history": [{ "delay": 0 }] },
                "DIRECT": { "type": "Direct" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_group_names_follow_global_order() {
        assert_eq!(table().group_names(false), ["Proxy", "Auto", "Streaming"]);
    }

    #[test]
    fn test_group_names_exclude_not_selectable() {
        assert_eq!(table().group_names(true), ["Proxy", "Streaming"]);
    }

    #[test]
    fn test_group_resolves_member_delays() {
        let group = table().group("Proxy").unwrap();
        assert_eq!(group.now, "hk-1");
        assert_eq!(group.group_type, ProxyType::Selector);
        assert_eq!(group.proxies[0].delay, Some(95));
        assert_eq!(group.proxies[1].delay, None);
        assert_eq!(group.proxies[2].proxy_type, ProxyType::URLTest);
    }

    #[test]
    fn test_group_of_leaf_proxy_is_not_found() {
        assert!(matches!(table().group("hk-1"), Err(EngineError::NotFound(_))));
        assert!(matches!(table().group("nope"), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_running_config_becomes_baseline() {
        let running: RunningConfig = serde_json::from_value(serde_json::json!({
            "port": 0,
            "mixed-port": 7890,
            "allow-lan": false,
            "mode": "rule",
            "tun": { "enable": false, "stack": "gVisor", "dns-hijack": ["any:53"] },
            "tuic-server": { "enable": false }
        }))
        .unwrap();

        let base = ConfigurationOverride::from(running);
        assert_eq!(base.http_port, Some(0));
        assert_eq!(base.mixed_port, Some(7890));
        assert_eq!(base.mode, Some(TunnelMode::Rule));
        assert!(base.secret.is_none());

        let tun = base.tun.unwrap();
        assert_eq!(tun.enable, Some(false));
        assert_eq!(tun.stack, Some(TunStack::GVisor));
        assert_eq!(tun.dns_hijack, Some(vec!["any:53".to_string()]));
    }

    #[test]
    fn test_log_line_decodes() {
        let line: LogLine =
            serde_json::from_str(r#"{"type":"warning","payload":"dial tcp: timeout"}"#).unwrap();
        assert_eq!(line.level, LogLevel::Warning);
        assert_eq!(line.payload, "dial tcp: timeout");
    }
}
