//! Feed Connection Manager
//!
//! Keeps at most one live connection per topic. Connecting with the key a
//! topic already uses is a no-op. A different key tears the old connection
//! down first: its generation is retired, its task is cancelled and awaited,
//! and only then does the replacement start. Ticks still in flight from the
//! old generation are dropped on arrival.

mod connection;
mod registry;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedPoller, PushTransport, TickSink};
use crate::domain::feed::{FeedMode, FeedStatus, SubscriptionKey, Topic};
use crate::infrastructure::config::FeedSettings;
use connection::{ConnectionDeps, ConnectionTask};
pub use registry::{ConnectionRegistry, TransportGuard};

/// How long a retired connection may take to stop before it is aborted.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

struct Slot {
    key: SubscriptionKey,
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of every live topic connection.
pub struct FeedConnectionManager {
    deps: ConnectionDeps,
    shutdown: CancellationToken,
    slots: Mutex<HashMap<Topic, Slot>>,
}

impl std::fmt::Debug for FeedConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConnectionManager")
            .field("push_allowed", &self.push_allowed())
            .field("settings", &self.deps.settings)
            .finish_non_exhaustive()
    }
}

impl FeedConnectionManager {
    /// Create a manager.
    ///
    /// Without a push transport every connection polls.
    #[must_use]
    pub fn new(
        push: Option<Arc<dyn PushTransport>>,
        poller: Arc<dyn FeedPoller>,
        sink: Arc<dyn TickSink>,
        settings: FeedSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            deps: ConnectionDeps {
                push,
                poller,
                sink,
                registry: Arc::new(ConnectionRegistry::new()),
                settings,
            },
            shutdown,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Whether connections try a push transport first.
    #[must_use]
    pub const fn push_allowed(&self) -> bool {
        self.deps.push.is_some()
    }

    /// Connect `topic` with `key`.
    ///
    /// Returns `false` when the topic is already connected with the same key.
    pub async fn connect(&self, topic: Topic, key: SubscriptionKey) -> bool {
        let mut slots = self.slots.lock().await;

        if let Some(slot) = slots.get(&topic)
            && slot.key == key
            && !slot.handle.is_finished()
        {
            return false;
        }
        if let Some(old) = slots.remove(&topic) {
            self.retire(topic, old).await;
        }

        let generation = self.deps.registry.issue(topic);
        let cancel = self.shutdown.child_token();
        let task = ConnectionTask::new(
            topic,
            key.clone(),
            generation,
            self.deps.clone(),
            cancel.clone(),
        );
        let handle = tokio::spawn(task.run());

        tracing::info!(topic = %topic, key = %key, generation, "Feed connected");
        slots.insert(
            topic,
            Slot {
                key,
                generation,
                cancel,
                handle,
            },
        );
        true
    }

    /// Disconnect `topic`, releasing its transport and timers.
    ///
    /// Returns `false` when it was not connected.
    pub async fn disconnect(&self, topic: Topic) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.remove(&topic) else {
            return false;
        };
        self.retire(topic, slot).await;
        drop(slots);

        self.deps
            .sink
            .mode_changed(topic, FeedMode::Idle, FeedStatus::Idle);
        tracing::info!(topic = %topic, "Feed disconnected");
        true
    }

    /// Disconnect every topic.
    pub async fn disconnect_all(&self) {
        for topic in Topic::all() {
            self.disconnect(*topic).await;
        }
    }

    /// Key `topic` is connected with.
    pub async fn subscription(&self, topic: Topic) -> Option<SubscriptionKey> {
        self.slots.lock().await.get(&topic).map(|slot| slot.key.clone())
    }

    /// Open push transports for `topic`.
    #[must_use]
    pub fn active_transports(&self, topic: Topic) -> usize {
        self.deps.registry.active_transports(topic)
    }

    async fn retire(&self, topic: Topic, slot: Slot) {
        self.deps.registry.retire(topic, slot.generation);
        slot.cancel.cancel();

        let mut handle = slot.handle;
        if tokio::time::timeout(STOP_TIMEOUT, &mut handle).await.is_err() {
            tracing::warn!(topic = %topic, generation = slot.generation, "Connection did not stop; aborting");
            handle.abort();
            let _ = handle.await;
        }
    }
}
