//! Publish/subscribe fan-out keyed by channel name. The relay uses one
//! channel per club, named by the club id.

pub mod local;

pub use local::LocalBroker;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker channel '{0}' is closed")]
    Closed(String),
    #[error("broker backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub channels: usize,
    pub subscriptions: usize,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Subscribe to a channel. Returns once the subscription is established,
    /// so anything published afterwards is delivered to it.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError>;

    /// Publish a payload to every current subscriber of the channel,
    /// returning how many subscribers it reached.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BrokerError>;

    fn stats(&self) -> BrokerStats;
}

/// A live subscription to one channel. Dropping it, or calling
/// [`Subscription::close`], releases it exactly once.
pub struct Subscription {
    channel: String,
    rx: Option<broadcast::Receiver<Arc<str>>>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        channel: impl Into<String>,
        rx: broadcast::Receiver<Arc<str>>,
        on_release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            channel: channel.into(),
            rx: Some(rx),
            on_release: Some(Box::new(on_release)),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next payload. `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "Subscriber lagged behind, skipping messages");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take a payload that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.try_recv() {
                Ok(payload) => return Some(payload),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "Subscriber lagged behind, skipping messages");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        // The receiver goes first so the release hook sees the final count.
        if let Some(rx) = self.rx.take() {
            drop(rx);
            if let Some(on_release) = self.on_release.take() {
                on_release();
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
