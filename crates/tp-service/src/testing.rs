//! In-memory collaborators
//!
//! Stand-ins for the routing engine, the selection store, the privileged
//! executor and the managed tunnel. Compiled for this crate's tests, and
//! for dependents that enable the `testing` feature.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::channel::mpsc;
use futures::StreamExt;

use tp_core::model::{
    ConfigurationOverride, LogMessage, OverrideSlot, Provider, ProviderList, ProviderType, Proxy,
    ProxyGroup, ProxySort, ProxyType, TunnelMode, TunnelState, UiConfiguration,
};
use tp_core::traits::{Engine, LogFeed, ManagedTunnel, PrivilegedExecutor, SelectionStore};
use tp_core::{EngineError, ProfileId, Selection, StoreError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a selector group whose first member is selected
pub fn selector(name: &str, members: &[&str]) -> ProxyGroup {
    group(name, ProxyType::Selector, members)
}

/// Build a group of the given kind whose first member is selected
pub fn group(name: &str, group_type: ProxyType, members: &[&str]) -> ProxyGroup {
    ProxyGroup {
        name: name.to_string(),
        group_type,
        now: members.first().map(|m| m.to_string()).unwrap_or_default(),
        proxies: members
            .iter()
            .map(|m| Proxy {
                name: m.to_string(),
                proxy_type: ProxyType::Shadowsocks,
                delay: None,
            })
            .collect(),
    }
}

/// Decrements the in-flight counter when the call's future is dropped
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A routing engine held entirely in memory
#[derive(Default)]
pub struct MemoryEngine {
    mode: Mutex<TunnelMode>,
    configuration: Mutex<UiConfiguration>,
    traffic: AtomicU64,
    groups: Mutex<BTreeMap<String, ProxyGroup>>,
    providers: Mutex<Vec<Provider>>,
    overrides: Mutex<BTreeMap<OverrideSlot, ConfigurationOverride>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<LogMessage>>>,
    subscriptions: AtomicUsize,
    reclaims: AtomicUsize,
    health_checks: Mutex<Vec<String>>,
    provider_updates: Mutex<Vec<(ProviderType, String)>>,
    unavailable: AtomicBool,
    stall_health_checks: AtomicBool,
    in_flight: Arc<AtomicUsize>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a proxy group
    pub fn with_group(self, group: ProxyGroup) -> Self {
        lock(&self.groups).insert(group.name.clone(), group);
        self
    }

    /// Add a provider
    pub fn with_provider(self, provider: Provider) -> Self {
        lock(&self.providers).push(provider);
        self
    }

    /// Set the reported traffic total
    pub fn set_traffic(&self, total: u64) {
        self.traffic.store(total, Ordering::SeqCst);
    }

    /// Set the reported tunnel mode
    pub fn set_mode(&self, mode: TunnelMode) {
        *lock(&self.mode) = mode;
        lock(&self.configuration).mode = mode;
    }

    /// Make every fallible call fail with [`EngineError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make health checks hang until their caller gives up
    pub fn stall_health_checks(&self, stall: bool) {
        self.stall_health_checks.store(stall, Ordering::SeqCst);
    }

    /// Push a record to every open log feed; returns how many feeds took it
    pub fn emit(&self, message: LogMessage) -> usize {
        let mut feeds = lock(&self.feeds);
        feeds.retain(|feed| feed.unbounded_send(message.clone()).is_ok());
        feeds.len()
    }

    /// End every open log feed from the engine side
    pub fn close_feeds(&self) {
        lock(&self.feeds).clear();
    }

    /// Feeds whose subscriber has not dropped them yet
    pub fn live_feeds(&self) -> usize {
        let mut feeds = lock(&self.feeds);
        feeds.retain(|feed| !feed.is_closed());
        feeds.len()
    }

    /// Log subscriptions opened so far
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Reclamation requests received so far
    pub fn reclaims(&self) -> usize {
        self.reclaims.load(Ordering::SeqCst)
    }

    /// Health-check calls that have started and not yet finished or been dropped
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Groups passed to health checks, in call order
    pub fn health_checks(&self) -> Vec<String> {
        lock(&self.health_checks).clone()
    }

    /// Provider updates, in call order
    pub fn provider_updates(&self) -> Vec<(ProviderType, String)> {
        lock(&self.provider_updates).clone()
    }

    /// The member currently selected in `group`
    pub fn selected(&self, group: &str) -> Option<String> {
        lock(&self.groups).get(group).map(|g| g.now.clone())
    }

    fn check_available(&self) -> Result<(), EngineError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(EngineError::Unavailable("engine stopped".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn query_tunnel_state(&self) -> Result<TunnelState, EngineError> {
        self.check_available()?;
        Ok(TunnelState {
            mode: *lock(&self.mode),
        })
    }

    async fn query_traffic_total(&self) -> Result<u64, EngineError> {
        self.check_available()?;
        Ok(self.traffic.load(Ordering::SeqCst))
    }

    async fn query_group_names(
        &self,
        exclude_not_selectable: bool,
    ) -> Result<Vec<String>, EngineError> {
        self.check_available()?;
        Ok(lock(&self.groups)
            .values()
            .filter(|g| !exclude_not_selectable || g.group_type.is_selectable())
            .map(|g| g.name.clone())
            .collect())
    }

    async fn query_group(&self, name: &str, sort: ProxySort) -> Result<ProxyGroup, EngineError> {
        self.check_available()?;
        let mut group = lock(&self.groups)
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        group.sort(sort);
        Ok(group)
    }

    async fn query_configuration(&self) -> Result<UiConfiguration, EngineError> {
        self.check_available()?;
        Ok(lock(&self.configuration).clone())
    }

    async fn query_providers(&self) -> Result<ProviderList, EngineError> {
        self.check_available()?;
        Ok(ProviderList(lock(&self.providers).clone()))
    }

    async fn query_override(
        &self,
        slot: OverrideSlot,
    ) -> Result<ConfigurationOverride, EngineError> {
        self.check_available()?;
        Ok(lock(&self.overrides).get(&slot).cloned().unwrap_or_default())
    }

    async fn patch_selector(&self, group: &str, name: &str) -> bool {
        if self.check_available().is_err() {
            return false;
        }
        let mut groups = lock(&self.groups);
        match groups.get_mut(group) {
            Some(g) if g.group_type.is_selectable() && g.proxies.iter().any(|p| p.name == name) => {
                g.now = name.to_string();
                true
            }
            _ => false,
        }
    }

    async fn patch_override(
        &self,
        slot: OverrideSlot,
        configuration: &ConfigurationOverride,
    ) -> Result<(), EngineError> {
        self.check_available()?;
        lock(&self.overrides).insert(slot, configuration.clone());
        Ok(())
    }

    async fn clear_override(&self, slot: OverrideSlot) -> Result<(), EngineError> {
        self.check_available()?;
        lock(&self.overrides).remove(&slot);
        Ok(())
    }

    async fn health_check(&self, group: &str) -> Result<(), EngineError> {
        let _guard = InFlight::enter(&self.in_flight);
        self.check_available()?;
        lock(&self.health_checks).push(group.to_string());
        if self.stall_health_checks.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn update_provider(
        &self,
        provider_type: ProviderType,
        name: &str,
    ) -> Result<(), EngineError> {
        self.check_available()?;
        let known = lock(&self.providers)
            .iter()
            .any(|p| p.provider_type == provider_type && p.name == name);
        if !known {
            return Err(EngineError::NotFound(name.to_string()));
        }
        lock(&self.provider_updates).push((provider_type, name.to_string()));
        Ok(())
    }

    async fn subscribe_logs(&self) -> Result<LogFeed, EngineError> {
        self.check_available()?;
        let (tx, rx) = mpsc::unbounded();
        lock(&self.feeds).push(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(rx.boxed())
    }

    async fn reclaim_resources(&self) {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
        lock(&self.feeds).retain(|feed| !feed.is_closed());
    }
}

/// Selection store held in memory
#[derive(Default)]
pub struct MemorySelectionStore {
    entries: DashMap<(ProfileId, String), Selection>,
    fail_writes: AtomicBool,
}

impl MemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with an I/O error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Io {
                path: "memory".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        } else {
            Ok(())
        }
    }
}

impl SelectionStore for MemorySelectionStore {
    fn set_selected(&self, selection: Selection) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries
            .insert((selection.profile, selection.group.clone()), selection);
        Ok(())
    }

    fn remove_selected(&self, profile: &ProfileId, group: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries.remove(&(*profile, group.to_string()));
        Ok(())
    }

    fn selected(&self, profile: &ProfileId, group: &str) -> Option<Selection> {
        self.entries
            .get(&(*profile, group.to_string()))
            .map(|entry| entry.value().clone())
    }

    fn selections(&self, profile: &ProfileId) -> Vec<Selection> {
        let mut selections: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == *profile)
            .map(|entry| entry.value().clone())
            .collect();
        selections.sort_by(|a, b| a.group.cmp(&b.group));
        selections
    }
}

/// Records every command batch instead of running it
pub struct RecordingExecutor {
    calls: Mutex<Vec<Vec<String>>>,
    succeed: AtomicBool,
}

impl RecordingExecutor {
    /// Create an executor whose batches report `succeed`
    pub fn new(succeed: bool) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            succeed: AtomicBool::new(succeed),
        }
    }

    /// Every batch received, in call order
    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }
}

impl PrivilegedExecutor for RecordingExecutor {
    fn exec(&self, commands: &[String]) -> bool {
        lock(&self.calls).push(commands.to_vec());
        self.succeed.load(Ordering::SeqCst)
    }
}

/// Counts start and stop requests for the managed tunnel
#[derive(Default)]
pub struct RecordingTunnel {
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingTunnel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make start and stop fail
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn outcome(&self) -> std::io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(std::io::Error::other("tunnel service refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ManagedTunnel for RecordingTunnel {
    async fn start(&self) -> std::io::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }

    async fn stop(&self) -> std::io::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_patch_selector_requires_selectable_group_and_member() {
        let engine = MemoryEngine::new()
            .with_group(selector("Proxy", &["hk-1", "jp-1"]))
            .with_group(group("Auto", ProxyType::URLTest, &["hk-1"]));

        assert!(engine.patch_selector("Proxy", "jp-1").await);
        assert_eq!(engine.selected("Proxy").as_deref(), Some("jp-1"));
        assert!(!engine.patch_selector("Proxy", "us-1").await);
        assert!(!engine.patch_selector("Auto", "hk-1").await);
        assert!(!engine.patch_selector("Missing", "hk-1").await);
    }

    #[tokio::test]
    async fn test_feeds_track_subscribers() {
        let engine = MemoryEngine::new();
        let feed = engine.subscribe_logs().await.unwrap();
        assert_eq!(engine.live_feeds(), 1);
        drop(feed);
        assert_eq!(engine.live_feeds(), 0);
    }

    #[test]
    fn test_selection_store_is_keyed_by_profile_and_group() {
        let store = MemorySelectionStore::new();
        let profile = ProfileId::new();

        store.set_selected(Selection::new(profile, "Proxy", "hk-1")).unwrap();
        store.set_selected(Selection::new(profile, "Proxy", "jp-1")).unwrap();
        assert_eq!(store.selections(&profile).len(), 1);
        assert_eq!(store.selected(&profile, "Proxy").unwrap().name, "jp-1");
        assert!(store.selections(&ProfileId::new()).is_empty());
    }
}
