//! Service host
//!
//! Wires the control plane and the orchestrator to their collaborators and
//! owns the service lifetime.

use std::sync::Arc;

use tp_controller::ControllerEngine;
use tp_core::config::ServiceConfig;
use tp_core::traits::{Engine, ManagedTunnel, PrivilegedExecutor, SelectionStore};
use tp_core::TpError;

use crate::error::PlaneError;
use crate::orchestrator::ServiceOrchestrator;
use crate::plane::ControlPlane;
use crate::root::Root;
use crate::store::{JsonSelectionStore, SharedServiceStore};
use crate::tunnel::CommandTunnel;

/// A running tunnel service
pub struct ServiceHost {
    store: Arc<SharedServiceStore>,
    plane: Arc<ControlPlane>,
    orchestrator: ServiceOrchestrator,
}

impl ServiceHost {
    /// Assemble a host from explicit collaborators
    pub fn new(
        engine: Arc<dyn Engine>,
        store: Arc<SharedServiceStore>,
        selections: Arc<dyn SelectionStore>,
        executor: Arc<dyn PrivilegedExecutor>,
        tunnel: Arc<dyn ManagedTunnel>,
    ) -> Self {
        let plane = Arc::new(ControlPlane::new(engine, store.clone(), selections));
        let orchestrator =
            ServiceOrchestrator::new(Arc::clone(&plane), store.clone(), executor, tunnel);

        Self {
            store,
            plane,
            orchestrator,
        }
    }

    /// Assemble a host talking to the controller named in `config`
    pub fn from_config(config: &ServiceConfig) -> Result<Self, TpError> {
        let engine = ControllerEngine::new(&config.controller)?;
        let selections = JsonSelectionStore::open(&config.selections_path)?;

        tracing::debug!(
            "Controller at {}, selections in {:?}",
            config.controller.address,
            config.selections_path
        );

        Ok(Self::new(
            Arc::new(engine),
            Arc::new(SharedServiceStore::from_config(config)),
            Arc::new(selections),
            Arc::new(Root::from_config(&config.root)),
            Arc::new(CommandTunnel::from_config(&config.tunnel)),
        ))
    }

    pub fn plane(&self) -> &Arc<ControlPlane> {
        &self.plane
    }

    pub fn orchestrator(&self) -> &ServiceOrchestrator {
        &self.orchestrator
    }

    /// Runtime-mutable service settings
    pub fn settings(&self) -> &Arc<SharedServiceStore> {
        &self.store
    }

    /// Bring traffic capture up
    pub async fn start(&self) -> Result<(), PlaneError> {
        self.orchestrator.start().await
    }

    /// Stop traffic capture, then tear down the control plane
    pub async fn shutdown(&self) {
        if let Err(e) = self.orchestrator.stop().await {
            tracing::warn!("Failed to stop tunnel cleanly: {}", e);
        }
        self.plane.shutdown().await;
        tracing::info!("Service host stopped");
    }
}
