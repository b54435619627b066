//! Routing engine trait

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::EngineError;
use crate::model::{
    ConfigurationOverride, LogMessage, OverrideSlot, ProviderList, ProviderType, ProxyGroup,
    ProxySort, TunnelState, UiConfiguration,
};

/// An ordered feed of engine log records.
///
/// Dropping the feed cancels the subscription on the engine side; resources
/// tied to it are only guaranteed to be released after
/// [`Engine::reclaim_resources`] has been called.
pub type LogFeed = BoxStream<'static, LogMessage>;

/// The external packet-routing engine, seen from the control plane
#[async_trait]
pub trait Engine: Send + Sync {
    /// Current runtime status
    async fn query_tunnel_state(&self) -> Result<TunnelState, EngineError>;

    /// Total bytes moved (upload + download) since the engine started
    async fn query_traffic_total(&self) -> Result<u64, EngineError>;

    /// Names of all proxy groups, optionally only the user-selectable ones
    async fn query_group_names(&self, exclude_not_selectable: bool)
        -> Result<Vec<String>, EngineError>;

    /// A proxy group with its members in the requested order
    async fn query_group(&self, name: &str, sort: ProxySort) -> Result<ProxyGroup, EngineError>;

    /// Effective configuration summary
    async fn query_configuration(&self) -> Result<UiConfiguration, EngineError>;

    /// Every provider known to the engine
    async fn query_providers(&self) -> Result<ProviderList, EngineError>;

    /// Contents of one override layer
    async fn query_override(&self, slot: OverrideSlot)
        -> Result<ConfigurationOverride, EngineError>;

    /// Select `name` within `group`.
    ///
    /// Returns false when the engine refuses (unknown group, group not
    /// selectable, unknown member, engine unreachable).
    async fn patch_selector(&self, group: &str, name: &str) -> bool;

    /// Replace the contents of an override layer
    async fn patch_override(
        &self,
        slot: OverrideSlot,
        configuration: &ConfigurationOverride,
    ) -> Result<(), EngineError>;

    /// Remove every value stored in an override layer
    async fn clear_override(&self, slot: OverrideSlot) -> Result<(), EngineError>;

    /// Re-test the latency of every member of a group
    async fn health_check(&self, group: &str) -> Result<(), EngineError>;

    /// Refresh a provider from its source
    async fn update_provider(&self, provider_type: ProviderType, name: &str)
        -> Result<(), EngineError>;

    /// Open a new subscription to the engine's log feed
    async fn subscribe_logs(&self) -> Result<LogFeed, EngineError>;

    /// Ask the engine to free whatever cancelled subscriptions left behind
    async fn reclaim_resources(&self);
}
