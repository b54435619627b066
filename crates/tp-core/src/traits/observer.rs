//! Log observers

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::LogMessage;

/// Delivery to an observer failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// The observer has gone away
    #[error("observer disconnected")]
    Disconnected,

    /// The observer refused the record
    #[error("observer failed: {0}")]
    Failed(String),
}

/// Receives engine log records one at a time, in feed order
#[async_trait]
pub trait LogObserver: Send + Sync {
    async fn new_item(&self, message: LogMessage) -> Result<(), ObserverError>;
}

#[async_trait]
impl LogObserver for mpsc::Sender<LogMessage> {
    async fn new_item(&self, message: LogMessage) -> Result<(), ObserverError> {
        self.send(message)
            .await
            .map_err(|_| ObserverError::Disconnected)
    }
}

#[async_trait]
impl LogObserver for mpsc::UnboundedSender<LogMessage> {
    async fn new_item(&self, message: LogMessage) -> Result<(), ObserverError> {
        self.send(message).map_err(|_| ObserverError::Disconnected)
    }
}
