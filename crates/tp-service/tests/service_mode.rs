//! Tunnel bring-up in tun and managed-service modes

use std::sync::Arc;

use tp_core::model::OverrideSlot;
use tp_core::traits::{Engine, ManagedTunnel, PrivilegedExecutor};
use tp_core::{EngineError, ServiceMode};
use tp_service::orchestrator::{forward_rules, tun_session_override, RuleAction, TUN_DEVICE};
use tp_service::store::SharedServiceStore;
use tp_service::testing::{MemoryEngine, MemorySelectionStore, RecordingExecutor, RecordingTunnel};
use tp_service::{OverrideChanged, PlaneError, ServiceHost};

struct Fixture {
    engine: Arc<MemoryEngine>,
    executor: Arc<RecordingExecutor>,
    tunnel: Arc<RecordingTunnel>,
    host: ServiceHost,
}

fn fixture(mode: ServiceMode, executor_succeeds: bool) -> Fixture {
    let engine = Arc::new(MemoryEngine::new());
    let executor = Arc::new(RecordingExecutor::new(executor_succeeds));
    let tunnel = Arc::new(RecordingTunnel::new());
    let host = ServiceHost::new(
        Arc::clone(&engine) as Arc<dyn Engine>,
        Arc::new(SharedServiceStore::new(None, mode)),
        Arc::new(MemorySelectionStore::new()),
        Arc::clone(&executor) as Arc<dyn PrivilegedExecutor>,
        Arc::clone(&tunnel) as Arc<dyn ManagedTunnel>,
    );

    Fixture {
        engine,
        executor,
        tunnel,
        host,
    }
}

fn insert_rules() -> Vec<String> {
    forward_rules(RuleAction::Insert, TUN_DEVICE)
}

fn delete_rules() -> Vec<String> {
    forward_rules(RuleAction::Delete, TUN_DEVICE)
}

#[tokio::test]
async fn test_tun_start_installs_rules_and_patches_session() {
    let f = fixture(ServiceMode::Tun, true);
    let mut changes = f.host.plane().subscribe_override_changes();

    f.host.start().await.unwrap();

    assert_eq!(f.executor.calls(), vec![insert_rules()]);
    assert_eq!(
        f.host
            .plane()
            .query_override(OverrideSlot::Session)
            .await
            .unwrap(),
        tun_session_override()
    );
    assert_eq!(
        changes.recv().await.unwrap(),
        OverrideChanged {
            slot: OverrideSlot::Session
        }
    );
    assert_eq!(f.tunnel.starts(), 0);
}

#[tokio::test]
async fn test_tun_stop_removes_rules_and_clears_session() {
    let f = fixture(ServiceMode::Tun, true);

    f.host.start().await.unwrap();
    f.host.orchestrator().stop().await.unwrap();

    assert_eq!(f.executor.calls(), vec![insert_rules(), delete_rules()]);
    assert!(f
        .host
        .plane()
        .query_override(OverrideSlot::Session)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(f.tunnel.stops(), 0);
}

#[tokio::test]
async fn test_tun_start_continues_when_rules_fail() {
    let f = fixture(ServiceMode::Tun, false);

    f.host.start().await.unwrap();

    assert_eq!(f.executor.calls().len(), 1);
    assert_eq!(
        f.host
            .plane()
            .query_override(OverrideSlot::Session)
            .await
            .unwrap(),
        tun_session_override()
    );

    f.host.orchestrator().stop().await.unwrap();
    assert_eq!(f.executor.calls().len(), 2);
}

#[tokio::test]
async fn test_repeated_tun_start_installs_rules_again() {
    let f = fixture(ServiceMode::Tun, true);

    f.host.start().await.unwrap();
    f.host.start().await.unwrap();

    assert_eq!(f.executor.calls(), vec![insert_rules(), insert_rules()]);
}

#[tokio::test]
async fn test_tun_start_reports_override_rejection() {
    let f = fixture(ServiceMode::Tun, true);
    f.engine.set_unavailable(true);

    let result = f.host.start().await;
    assert!(matches!(
        result,
        Err(PlaneError::Engine(EngineError::Unavailable(_)))
    ));
    // Rules go in before the engine is asked
    assert_eq!(f.executor.calls(), vec![insert_rules()]);
}

#[tokio::test]
async fn test_vpn_mode_delegates_to_managed_tunnel() {
    let f = fixture(ServiceMode::Vpn, true);

    f.host.start().await.unwrap();
    assert_eq!(f.tunnel.starts(), 1);

    f.host.orchestrator().stop().await.unwrap();
    assert_eq!(f.tunnel.stops(), 1);

    assert!(f.executor.calls().is_empty());
    assert!(f
        .host
        .plane()
        .query_override(OverrideSlot::Session)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_managed_tunnel_failure_is_reported() {
    let f = fixture(ServiceMode::Vpn, true);
    f.tunnel.fail(true);

    let result = f.host.start().await;
    assert!(matches!(result, Err(PlaneError::Tunnel(_))));
}

#[tokio::test]
async fn test_stop_follows_current_mode() {
    let f = fixture(ServiceMode::Vpn, true);

    f.host.start().await.unwrap();
    f.host.settings().set_service_mode(ServiceMode::Tun);
    f.host.orchestrator().stop().await.unwrap();

    assert_eq!(f.tunnel.stops(), 0);
    assert_eq!(f.executor.calls(), vec![delete_rules()]);
}

#[tokio::test]
async fn test_host_shutdown_stops_tunnel_and_plane() {
    let f = fixture(ServiceMode::Tun, true);
    f.host.start().await.unwrap();

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel::<tp_core::model::LogMessage>();
    let observer: Arc<dyn tp_core::traits::LogObserver> = Arc::new(tx);
    f.host
        .plane()
        .set_log_observer(Some(Arc::clone(&observer)))
        .await
        .unwrap();

    f.host.shutdown().await;

    assert_eq!(f.executor.calls(), vec![insert_rules(), delete_rules()]);
    assert_eq!(f.engine.reclaims(), 1);
    assert!(f.host.plane().cancellation_token().is_cancelled());

    let result = f.host.plane().set_log_observer(Some(observer)).await;
    assert!(matches!(result, Err(PlaneError::ShutDown)));
}
