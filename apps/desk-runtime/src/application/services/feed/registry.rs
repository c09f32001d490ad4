//! Connection generations and transport accounting.
//!
//! Every connection gets a fresh generation when it is created. Only the
//! current generation of a topic may deliver ticks, so a connection that was
//! replaced or disconnected cannot write into the caches even if one of its
//! messages is already in flight. Open transports are counted through RAII
//! guards so the count stays right however a task ends.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::domain::feed::Topic;
use crate::infrastructure::metrics;

/// Generation and transport bookkeeping for all topics.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_generation: AtomicU64,
    current: RwLock<HashMap<Topic, u64>>,
    transports: Mutex<HashMap<Topic, usize>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new generation and make it current for `topic`.
    pub fn issue(&self, topic: Topic) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.write().insert(topic, generation);
        generation
    }

    /// Retire `generation`; it stops being current if it still was.
    pub fn retire(&self, topic: Topic, generation: u64) {
        let mut current = self.current.write();
        if current.get(&topic) == Some(&generation) {
            current.remove(&topic);
        }
    }

    /// Whether `generation` may deliver for `topic`.
    #[must_use]
    pub fn is_current(&self, topic: Topic, generation: u64) -> bool {
        self.current.read().get(&topic) == Some(&generation)
    }

    /// Count an open transport until the guard drops.
    #[must_use]
    pub fn acquire_transport(self: &Arc<Self>, topic: Topic) -> TransportGuard {
        let count = {
            let mut transports = self.transports.lock();
            let count = transports.entry(topic).or_insert(0);
            *count += 1;
            *count
        };
        metrics::set_active_transports(topic, count);
        TransportGuard {
            registry: Arc::clone(self),
            topic,
        }
    }

    /// Open transports for `topic`.
    #[must_use]
    pub fn active_transports(&self, topic: Topic) -> usize {
        self.transports.lock().get(&topic).copied().unwrap_or(0)
    }

    fn release_transport(&self, topic: Topic) {
        let count = {
            let mut transports = self.transports.lock();
            let count = transports.entry(topic).or_insert(0);
            *count = count.saturating_sub(1);
            *count
        };
        metrics::set_active_transports(topic, count);
    }
}

/// Keeps one transport counted while alive.
#[derive(Debug)]
pub struct TransportGuard {
    registry: Arc<ConnectionRegistry>,
    topic: Topic,
}

impl Drop for TransportGuard {
    fn drop(&mut self) {
        self.registry.release_transport(self.topic);
    }
}
