//! tp-controller: HTTP external-controller adapter
//!
//! Implements [`tp_core::traits::Engine`] on top of a routing engine's REST
//! controller. Override layers are kept here and the merged result is
//! patched into the engine's running configuration; the log feed is the
//! controller's streaming `/logs` endpoint.

mod client;
mod codec;
mod engine;
mod layers;
mod wire;

pub use client::ControllerClient;
pub use codec::{LogLineCodec, MAX_LOG_LINE};
pub use engine::ControllerEngine;
pub use layers::OverrideLayers;
