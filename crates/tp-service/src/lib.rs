//! tp-service: tunnel service control plane
//!
//! Mediates between a user-facing control layer and an external routing
//! engine. The [`ControlPlane`] forwards queries and patches to the engine
//! and persists user selections, the [`LogMultiplexer`] keeps at most one
//! engine log subscription alive, and the [`ServiceOrchestrator`] brings the
//! tunnel up either through a privileged root shell or through a managed
//! tunnel service.

pub mod error;
pub mod host;
pub mod logcat;
pub mod orchestrator;
pub mod plane;
pub mod root;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tunnel;

pub use error::PlaneError;
pub use host::ServiceHost;
pub use logcat::{ConsumerExit, LogMultiplexer};
pub use orchestrator::ServiceOrchestrator;
pub use plane::{ControlPlane, OverrideChanged};
pub use root::Root;
