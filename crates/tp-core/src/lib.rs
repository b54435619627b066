//! tp-core: Core abstractions and configuration for tunplane
//!
//! This crate provides the engine model, the collaborator traits the
//! control plane is written against, and the configuration structures
//! shared by the controller adapter and the service.

pub mod config;
pub mod error;
pub mod model;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{ConfigError, EngineError, StoreError, TpError};
pub use types::{ProfileId, Selection, ServiceMode};
