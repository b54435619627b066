//! Core trait definitions

mod engine;
mod executor;
mod observer;
mod store;
mod tunnel;

pub use engine::{Engine, LogFeed};
pub use executor::PrivilegedExecutor;
pub use observer::{LogObserver, ObserverError};
pub use store::{SelectionStore, ServiceStore};
pub use tunnel::ManagedTunnel;
