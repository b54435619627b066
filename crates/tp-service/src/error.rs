//! Service error types

use thiserror::Error;

use tp_core::EngineError;

/// Errors surfaced by the control plane and the orchestrator
#[derive(Error, Debug)]
pub enum PlaneError {
    /// Engine call failed; carried through unchanged
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Managed tunnel service could not be started or stopped
    #[error("Tunnel service error: {0}")]
    Tunnel(#[from] std::io::Error),

    /// The plane is being torn down
    #[error("Control plane is shutting down")]
    ShutDown,
}
