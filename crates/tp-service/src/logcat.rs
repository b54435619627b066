//! Single-subscription log streaming
//!
//! At most one engine log subscription is alive at a time. Installing an
//! observer cancels the previous consumer and waits for it to finish its
//! cleanup before a new subscription is opened. Every consumer, however it
//! ends, drops its feed and asks the engine to reclaim resources exactly
//! once.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tp_core::traits::{Engine, LogFeed, LogObserver, ObserverError};

use crate::error::PlaneError;

/// How a log consumer ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerExit {
    /// Replaced, cleared, or torn down with the plane
    Cancelled,
    /// The engine ended the feed
    FeedClosed,
    /// The observer rejected a record
    ObserverFailed(ObserverError),
}

struct Subscription {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<ConsumerExit>,
}

impl Subscription {
    /// Cancel the consumer and wait until its cleanup has run
    async fn stop(self, engine: &dyn Engine) -> Option<ConsumerExit> {
        self.cancel.cancel();
        match self.handle.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                // Cleanup never ran on this path
                tracing::warn!("Log consumer {} did not finish cleanly: {}", self.id, e);
                engine.reclaim_resources().await;
                None
            }
        }
    }
}

#[derive(Default)]
struct State {
    current: Option<Subscription>,
    closed: bool,
}

/// Owns the one live engine log subscription
pub struct LogMultiplexer {
    engine: Arc<dyn Engine>,
    /// Held across stop-and-resubscribe so replacements never overlap
    state: Mutex<State>,
    next_id: AtomicU64,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl LogMultiplexer {
    /// Create a multiplexer whose consumers live in the given scope
    pub fn new(engine: Arc<dyn Engine>, cancel: CancellationToken, tracker: TaskTracker) -> Self {
        Self {
            engine,
            state: Mutex::new(State::default()),
            next_id: AtomicU64::new(1),
            cancel,
            tracker,
        }
    }

    /// Route the engine log feed to `observer`, or stop streaming with `None`.
    ///
    /// Returns once the previous consumer (if any) has fully stopped and,
    /// for `Some`, the new subscription has been opened.
    pub async fn set_observer(
        &self,
        observer: Option<Arc<dyn LogObserver>>,
    ) -> Result<(), PlaneError> {
        let mut state = self.state.lock().await;

        if let Some(previous) = state.current.take() {
            let id = previous.id;
            let exit = previous.stop(self.engine.as_ref()).await;
            tracing::debug!("Log subscription {} stopped: {:?}", id, exit);
        }

        let Some(observer) = observer else {
            return Ok(());
        };

        if state.closed || self.cancel.is_cancelled() {
            return Err(PlaneError::ShutDown);
        }

        let feed = self.engine.subscribe_logs().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.cancel.child_token();

        let handle = self.tracker.spawn(consume(
            id,
            feed,
            observer,
            cancel.clone(),
            Arc::clone(&self.engine),
        ));

        tracing::debug!("Log subscription {} opened", id);
        state.current = Some(Subscription { id, cancel, handle });
        Ok(())
    }

    /// True while a consumer is delivering records
    pub async fn is_streaming(&self) -> bool {
        self.state
            .lock()
            .await
            .current
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Stop the current consumer and refuse new observers
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        if let Some(previous) = state.current.take() {
            previous.stop(self.engine.as_ref()).await;
        }
    }
}

async fn consume(
    id: u64,
    mut feed: LogFeed,
    observer: Arc<dyn LogObserver>,
    cancel: CancellationToken,
    engine: Arc<dyn Engine>,
) -> ConsumerExit {
    let exit = pump(&mut feed, observer.as_ref(), &cancel).await;

    match &exit {
        ConsumerExit::Cancelled => tracing::debug!("Log subscription {} cancelled", id),
        ConsumerExit::FeedClosed => tracing::debug!("Log feed {} closed by engine", id),
        ConsumerExit::ObserverFailed(e) => {
            tracing::warn!("Log observer for subscription {} failed: {}", id, e)
        }
    }

    // Cleanup, not raced against cancellation
    drop(feed);
    engine.reclaim_resources().await;
    drop(observer);

    exit
}

async fn pump(
    feed: &mut LogFeed,
    observer: &dyn LogObserver,
    cancel: &CancellationToken,
) -> ConsumerExit {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ConsumerExit::Cancelled,
            next = feed.next() => match next {
                Some(message) => message,
                None => return ConsumerExit::FeedClosed,
            },
        };

        let delivery = AssertUnwindSafe(observer.new_item(message)).catch_unwind();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return ConsumerExit::Cancelled,
            delivered = delivery => match delivered {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return ConsumerExit::ObserverFailed(e),
                Err(_) => {
                    return ConsumerExit::ObserverFailed(ObserverError::Failed(
                        "observer panicked".to_string(),
                    ))
                }
            },
        }
    }
}
