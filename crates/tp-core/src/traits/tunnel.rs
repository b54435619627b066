//! Managed tunnel service

use async_trait::async_trait;

/// The externally managed tunnel-service process used outside root mode
#[async_trait]
pub trait ManagedTunnel: Send + Sync {
    async fn start(&self) -> std::io::Result<()>;

    async fn stop(&self) -> std::io::Result<()>;
}
