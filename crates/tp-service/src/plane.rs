//! Control plane
//!
//! The `ControlPlane` is the facade the user-facing layer talks to. Queries
//! and patches are forwarded to the routing engine, user proxy selections
//! are persisted against the active profile, and the engine log feed is
//! streamed to at most one observer at a time.
//!
//! # Scope
//!
//! The plane owns a cancellation token and a task tracker. Log consumers
//! are spawned on the tracker, and long-running engine operations race
//! against the token. [`ControlPlane::shutdown`] cancels the token and
//! waits for every tracked task to finish its cleanup. The wait runs on its
//! own task, so dropping the `shutdown` future does not abandon it.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tp_core::model::{
    ConfigurationOverride, OverrideSlot, ProviderList, ProviderType, ProxyGroup, ProxySort,
    TunnelState, UiConfiguration,
};
use tp_core::traits::{Engine, LogObserver, SelectionStore, ServiceStore};
use tp_core::{EngineError, Selection};

use crate::error::PlaneError;
use crate::logcat::LogMultiplexer;

/// Sent after an override layer has been patched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideChanged {
    pub slot: OverrideSlot,
}

/// Facade over the routing engine and the selection store
pub struct ControlPlane {
    engine: Arc<dyn Engine>,
    store: Arc<dyn ServiceStore>,
    selections: Arc<dyn SelectionStore>,
    override_tx: broadcast::Sender<OverrideChanged>,
    logs: Arc<LogMultiplexer>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl ControlPlane {
    /// Create a control plane with its own background scope
    pub fn new(
        engine: Arc<dyn Engine>,
        store: Arc<dyn ServiceStore>,
        selections: Arc<dyn SelectionStore>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let (override_tx, _) = broadcast::channel(16);

        Self {
            logs: Arc::new(LogMultiplexer::new(
                Arc::clone(&engine),
                cancel.clone(),
                tracker.clone(),
            )),
            engine,
            store,
            selections,
            override_tx,
            cancel,
            tracker,
        }
    }

    /// Token cancelled when the plane shuts down
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Receive a notification after every successful override patch
    pub fn subscribe_override_changes(&self) -> broadcast::Receiver<OverrideChanged> {
        self.override_tx.subscribe()
    }

    pub async fn query_tunnel_state(&self) -> Result<TunnelState, EngineError> {
        self.engine.query_tunnel_state().await
    }

    pub async fn query_traffic_total(&self) -> Result<u64, EngineError> {
        self.engine.query_traffic_total().await
    }

    pub async fn query_group_names(
        &self,
        exclude_not_selectable: bool,
    ) -> Result<Vec<String>, EngineError> {
        self.engine.query_group_names(exclude_not_selectable).await
    }

    pub async fn query_group(&self, name: &str, sort: ProxySort) -> Result<ProxyGroup, EngineError> {
        self.engine.query_group(name, sort).await
    }

    pub async fn query_configuration(&self) -> Result<UiConfiguration, EngineError> {
        self.engine.query_configuration().await
    }

    pub async fn query_providers(&self) -> Result<ProviderList, EngineError> {
        self.engine.query_providers().await
    }

    pub async fn query_override(
        &self,
        slot: OverrideSlot,
    ) -> Result<ConfigurationOverride, EngineError> {
        self.engine.query_override(slot).await
    }

    /// Ask the engine to select `name` in `group` and record the outcome.
    ///
    /// With an active profile, an accepted selection is stored and a refused
    /// one clears whatever was stored for the group. Store failures are
    /// logged; the engine's verdict is returned either way.
    pub async fn patch_selector(&self, group: &str, name: &str) -> bool {
        let accepted = self.engine.patch_selector(group, name).await;

        let Some(profile) = self.store.active_profile() else {
            return accepted;
        };

        let persisted = if accepted {
            self.selections
                .set_selected(Selection::new(profile, group, name))
        } else {
            self.selections.remove_selected(&profile, group)
        };

        if let Err(e) = persisted {
            tracing::warn!(
                "Failed to persist selection {}/{} for profile {}: {}",
                group,
                name,
                profile,
                e
            );
        }

        accepted
    }

    /// Replace an override layer and notify listeners
    pub async fn patch_override(
        &self,
        slot: OverrideSlot,
        configuration: &ConfigurationOverride,
    ) -> Result<(), EngineError> {
        self.engine.patch_override(slot, configuration).await?;

        // No listeners is fine
        let _ = self.override_tx.send(OverrideChanged { slot });
        Ok(())
    }

    pub async fn clear_override(&self, slot: OverrideSlot) -> Result<(), EngineError> {
        self.engine.clear_override(slot).await
    }

    /// Re-test the latency of a group's members.
    ///
    /// Dropping the returned future cancels the engine call. Fails with
    /// [`PlaneError::ShutDown`] if the plane shuts down first.
    pub async fn health_check(&self, group: &str) -> Result<(), PlaneError> {
        self.scoped(self.engine.health_check(group)).await
    }

    /// Refresh a provider. Cancellation behaves as for [`Self::health_check`].
    pub async fn update_provider(
        &self,
        provider_type: ProviderType,
        name: &str,
    ) -> Result<(), PlaneError> {
        self.scoped(self.engine.update_provider(provider_type, name))
            .await
    }

    /// Stream engine logs to `observer`, replacing any previous observer.
    ///
    /// `None` stops streaming. The previous subscription is fully torn down,
    /// engine resources reclaimed included, before this returns.
    pub async fn set_log_observer(
        &self,
        observer: Option<Arc<dyn LogObserver>>,
    ) -> Result<(), PlaneError> {
        self.logs.set_observer(observer).await
    }

    /// True while a log observer is receiving records
    pub async fn is_streaming_logs(&self) -> bool {
        self.logs.is_streaming().await
    }

    /// Cancel background work and wait for it to finish.
    ///
    /// The teardown is spawned before waiting. A caller that stops awaiting
    /// early (a timeout, a losing `select!` arm) leaves it running to
    /// completion.
    pub async fn shutdown(&self) {
        tracing::debug!("Control plane shutting down");
        self.cancel.cancel();

        let logs = Arc::clone(&self.logs);
        let tracker = self.tracker.clone();
        let teardown = tokio::spawn(async move {
            logs.close().await;
            tracker.close();
            tracker.wait().await;
        });

        if let Err(e) = teardown.await {
            tracing::warn!("Control plane teardown failed: {}", e);
        }
    }

    async fn scoped<T>(
        &self,
        operation: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, PlaneError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PlaneError::ShutDown),
            result = operation => result.map_err(PlaneError::from),
        }
    }
}

impl Drop for ControlPlane {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
