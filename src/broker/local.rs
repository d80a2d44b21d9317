use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{Broker, BrokerError, BrokerStats, Subscription};

type Channels = HashMap<String, broadcast::Sender<Arc<str>>>;

/// In-process broker: one broadcast channel per channel name, created on the
/// first subscription and dropped with the last one.
#[derive(Clone)]
pub struct LocalBroker {
    channels: Arc<Mutex<Channels>>,
    capacity: usize,
}

impl LocalBroker {
    pub fn new(capacity: usize) -> Self {
        info!("Local broker initialized (capacity {} per channel)", capacity);
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn lock(channels: &Mutex<Channels>) -> MutexGuard<'_, Channels> {
        channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Live subscriptions on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        Self::lock(&self.channels)
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }

    pub fn channel_count(&self) -> usize {
        Self::lock(&self.channels).len()
    }
}

#[async_trait]
impl Broker for LocalBroker {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let rx = {
            let mut channels = Self::lock(&self.channels);
            channels
                .entry(channel.to_string())
                .or_insert_with(|| {
                    debug!(channel = %channel, "Creating broker channel");
                    broadcast::channel::<Arc<str>>(self.capacity).0
                })
                .subscribe()
        };

        let channels = Arc::clone(&self.channels);
        let name = channel.to_string();
        Ok(Subscription::new(channel, rx, move || {
            let mut channels = Self::lock(&channels);
            let idle = channels
                .get(&name)
                .is_some_and(|tx| tx.receiver_count() == 0);
            if idle {
                channels.remove(&name);
                debug!(channel = %name, "Removed idle broker channel");
            }
        }))
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BrokerError> {
        let tx = Self::lock(&self.channels).get(channel).cloned();
        match tx {
            // A send error only means nobody is listening right now.
            Some(tx) => Ok(tx.send(Arc::from(payload)).unwrap_or(0)),
            None => Ok(0),
        }
    }

    fn stats(&self) -> BrokerStats {
        let channels = Self::lock(&self.channels);
        BrokerStats {
            channels: channels.len(),
            subscriptions: channels.values().map(|tx| tx.receiver_count()).sum(),
        }
    }
}
