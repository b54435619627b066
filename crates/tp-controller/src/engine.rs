//! `Engine` implementation over the controller API

use async_trait::async_trait;
use futures::{future, StreamExt};
use reqwest::Method;
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use tp_core::config::ControllerConfig;
use tp_core::model::{
    ConfigurationOverride, LogMessage, OverrideSlot, Provider, ProviderList, ProviderType,
    ProxyGroup, ProxySort, TunnelState, UiConfiguration,
};
use tp_core::time::current_time_millis;
use tp_core::traits::{Engine, LogFeed};
use tp_core::EngineError;

use crate::client::ControllerClient;
use crate::codec::LogLineCodec;
use crate::layers::OverrideLayers;
use crate::wire::{
    ConnectionsResponse, LogLine, ProvidersResponse, ProxiesResponse, RunningConfig, SelectRequest,
};

/// Drives a routing engine through its HTTP external controller
pub struct ControllerEngine {
    client: ControllerClient,
    /// Held across the patch request so layer state and engine state move together
    layers: Mutex<OverrideLayers>,
}

impl ControllerEngine {
    /// Create an engine adapter for the controller described by `config`
    pub fn new(config: &ControllerConfig) -> Result<Self, EngineError> {
        Ok(Self {
            client: ControllerClient::new(config)?,
            layers: Mutex::new(OverrideLayers::new()),
        })
    }

    /// The underlying HTTP client
    pub fn client(&self) -> &ControllerClient {
        &self.client
    }

    async fn proxies(&self) -> Result<ProxiesResponse, EngineError> {
        self.client.get_json(&["proxies"]).await
    }

    async fn providers(&self, provider_type: ProviderType) -> Result<Vec<Provider>, EngineError> {
        let response: ProvidersResponse = self
            .client
            .get_json(&["providers", provider_path(provider_type)])
            .await?;

        Ok(response
            .providers
            .into_values()
            .map(|entry| Provider {
                name: entry.name,
                provider_type,
                vehicle_type: entry.vehicle_type,
                updated_at: entry.updated_at,
            })
            .collect())
    }

    async fn patch_configs(&self, patch: &ConfigurationOverride) -> Result<(), EngineError> {
        if patch.is_empty() {
            return Ok(());
        }

        tracing::debug!("Patching running configuration: {:?}", patch);
        self.client
            .send(self.client.request(Method::PATCH, &["configs"]).json(patch))
            .await?;
        Ok(())
    }
}

fn provider_path(provider_type: ProviderType) -> &'static str {
    match provider_type {
        ProviderType::Proxy => "proxies",
        ProviderType::Rule => "rules",
    }
}

fn decode_log_line(line: &str) -> Option<LogMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<LogLine>(line) {
        Ok(entry) => Some(LogMessage::new(
            entry.level,
            entry.payload,
            current_time_millis(),
        )),
        Err(e) => {
            tracing::debug!("Skipping undecodable log line: {}", e);
            None
        }
    }
}

#[async_trait]
impl Engine for ControllerEngine {
    async fn query_tunnel_state(&self) -> Result<TunnelState, EngineError> {
        let config: UiConfiguration = self.client.get_json(&["configs"]).await?;
        Ok(TunnelState { mode: config.mode })
    }

    async fn query_traffic_total(&self) -> Result<u64, EngineError> {
        let connections: ConnectionsResponse = self.client.get_json(&["connections"]).await?;
        Ok(connections
            .upload_total
            .saturating_add(connections.download_total))
    }

    async fn query_group_names(
        &self,
        exclude_not_selectable: bool,
    ) -> Result<Vec<String>, EngineError> {
        Ok(self.proxies().await?.group_names(exclude_not_selectable))
    }

    async fn query_group(&self, name: &str, sort: ProxySort) -> Result<ProxyGroup, EngineError> {
        let mut group = self.proxies().await?.group(name)?;
        group.sort(sort);
        Ok(group)
    }

    async fn query_configuration(&self) -> Result<UiConfiguration, EngineError> {
        self.client.get_json(&["configs"]).await
    }

    async fn query_providers(&self) -> Result<ProviderList, EngineError> {
        let mut providers = self.providers(ProviderType::Proxy).await?;

        // Older engines have no rule providers endpoint
        match self.providers(ProviderType::Rule).await {
            Ok(rules) => providers.extend(rules),
            Err(EngineError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        Ok(ProviderList(providers))
    }

    async fn query_override(
        &self,
        slot: OverrideSlot,
    ) -> Result<ConfigurationOverride, EngineError> {
        Ok(self.layers.lock().await.get(slot))
    }

    async fn patch_selector(&self, group: &str, name: &str) -> bool {
        let request = self
            .client
            .request(Method::PUT, &["proxies", group])
            .json(&SelectRequest { name });

        match self.client.send(request).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Engine refused selecting '{}' in '{}': {}", name, group, e);
                false
            }
        }
    }

    async fn patch_override(
        &self,
        slot: OverrideSlot,
        configuration: &ConfigurationOverride,
    ) -> Result<(), EngineError> {
        let mut layers = self.layers.lock().await;
        if layers.needs_base() {
            let running: RunningConfig = self.client.get_json(&["configs"]).await?;
            layers.set_base(running.into());
        }

        let previous = layers.get(slot);
        layers.set(slot, configuration.clone());

        if let Err(e) = self.patch_configs(&layers.merged()).await {
            layers.set(slot, previous);
            return Err(e);
        }

        Ok(())
    }

    async fn clear_override(&self, slot: OverrideSlot) -> Result<(), EngineError> {
        let mut layers = self.layers.lock().await;
        let removed = layers.clear(slot);
        if removed.is_empty() {
            return Ok(());
        }

        let patch = layers.patch_after_clear(&removed);
        if let Err(e) = self.patch_configs(&patch).await {
            layers.set(slot, removed);
            return Err(e);
        }

        layers.release_base_if_idle();
        Ok(())
    }

    async fn health_check(&self, group: &str) -> Result<(), EngineError> {
        let config = self.client.config();
        let timeout_ms = config.health_check_timeout.as_millis().to_string();

        let request = self
            .client
            .request(Method::GET, &["group", group, "delay"])
            .query(&[
                ("url", config.health_check_url.as_str()),
                ("timeout", timeout_ms.as_str()),
            ])
            .timeout(config.health_check_timeout + config.timeout);

        self.client.send(request).await?;
        Ok(())
    }

    async fn update_provider(
        &self,
        provider_type: ProviderType,
        name: &str,
    ) -> Result<(), EngineError> {
        let request = self
            .client
            .request(Method::PUT, &["providers", provider_path(provider_type), name]);
        self.client.send(request).await?;
        Ok(())
    }

    async fn subscribe_logs(&self) -> Result<LogFeed, EngineError> {
        let request = self
            .client
            .streaming_request(Method::GET, &["logs"])
            .query(&[("level", "debug")]);
        let response = self.client.send(request).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let lines = FramedRead::new(StreamReader::new(body), LogLineCodec::new());

        // Only a transport failure ends the feed; bad records are skipped
        let feed = lines
            .take_while(|line| {
                if let Err(e) = line {
                    tracing::debug!("Log stream interrupted: {}", e);
                }
                future::ready(line.is_ok())
            })
            .filter_map(|line| future::ready(line.ok().and_then(|l| decode_log_line(&l))));

        Ok(feed.boxed())
    }

    async fn reclaim_resources(&self) {
        let request = self.client.request(Method::PUT, &["debug", "gc"]);
        if let Err(e) = self.client.send(request).await {
            tracing::debug!("Engine did not run garbage collection: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tp_core::model::LogLevel;

    #[test]
    fn test_decode_log_line() {
        let msg = decode_log_line(r#"{"type":"info","payload":"[TCP] 10.0.0.2 --> example.com"}"#)
            .unwrap();
        assert_eq!(msg.level, LogLevel::Info);
        assert_eq!(msg.message, "[TCP] 10.0.0.2 --> example.com");
        assert!(msg.time > 0);
    }

    #[test]
    fn test_decode_skips_blank_and_garbage() {
        assert!(decode_log_line("   ").is_none());
        assert!(decode_log_line("{not json").is_none());
    }
}
