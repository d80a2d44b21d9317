use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::auth::Authorizer;
use crate::broker::Broker;
use crate::config::RelayTimings;
use crate::db::Store;

/// Shared handles every route works with.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub broker: Arc<dyn Broker>,
    pub authorizer: Arc<dyn Authorizer>,
    pub timings: RelayTimings,
    sessions: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        authorizer: Arc<dyn Authorizer>,
        timings: RelayTimings,
    ) -> Self {
        Self {
            store,
            broker,
            authorizer,
            timings,
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Relay sessions currently running.
    pub fn open_sessions(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }

    /// Count a session until the returned guard is dropped.
    pub fn track_session(&self) -> SessionGuard {
        self.sessions.fetch_add(1, Ordering::Relaxed);
        SessionGuard(Arc::clone(&self.sessions))
    }
}

pub struct SessionGuard(Arc<AtomicUsize>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
