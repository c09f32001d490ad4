//! Hand-written fakes for the desk ports.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use desk_runtime::application::ports::{
    ContextFetcher, FeedPoller, FeedStream, FetchError, PanelFetcher, ProfileApi, ProfileSnapshot,
    PushTransport, QueryParams, TransportError,
};
use desk_runtime::domain::feed::FeedEvent;
use desk_runtime::domain::focus::FocusFamily;
use desk_runtime::domain::quote::Quote;
use desk_runtime::{
    DeskConfig, DeskPorts, DeskRuntime, EventHub, MemoryStore, Preferences, SubscriptionKey, Topic,
};

/// A quote at `price` for `symbol`, stamped now.
pub fn quote(symbol: &str, price: i64) -> Quote {
    Quote {
        symbol: symbol.to_string(),
        price: Decimal::from(price),
        change_pct: None,
        volume: None,
        timestamp: Utc::now(),
    }
}

/// Configuration with short timings for tests.
pub fn fast_config() -> DeskConfig {
    let mut config = DeskConfig::from_lookup(|_| None).unwrap();
    config.sync.debounce = Duration::from_millis(30);
    config.feed.poll_interval = Duration::from_millis(20);
    config.feed.poll_backoff_max = Duration::from_millis(80);
    config.feed.push_retry_initial = Duration::from_secs(60);
    config.feed.push_retry_max = Duration::from_secs(60);
    config
}

// =============================================================================
// Desk API
// =============================================================================

/// In-memory desk API covering panels, focus context, polling, and profile.
#[derive(Default)]
pub struct FakeApi {
    pub requests: Mutex<Vec<(String, QueryParams)>>,
    pub failing_paths: Mutex<Vec<String>>,
    pub context_delays: Mutex<HashMap<String, Duration>>,
    pub polls: Mutex<VecDeque<Result<Vec<FeedEvent>, FetchError>>>,
    pub poll_count: Mutex<HashMap<Topic, usize>>,
    pub profile: Mutex<Option<Value>>,
    pub saved: Mutex<Vec<Preferences>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_path(&self, path: &str) {
        self.failing_paths.lock().push(path.to_string());
    }

    pub fn delay_context(&self, target: &str, delay: Duration) {
        self.context_delays.lock().insert(target.to_string(), delay);
    }

    pub fn queue_poll(&self, result: Result<Vec<FeedEvent>, FetchError>) {
        self.polls.lock().push_back(result);
    }

    pub fn polls_of(&self, topic: Topic) -> usize {
        self.poll_count.lock().get(&topic).copied().unwrap_or(0)
    }

    pub fn requested(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|(p, _)| p == path).count()
    }

    pub fn last_query(&self, path: &str) -> Option<QueryParams> {
        self.requests
            .lock()
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, q)| q.clone())
    }
}

#[async_trait]
impl PanelFetcher for FakeApi {
    async fn fetch_json(&self, path: &str, query: &QueryParams) -> Result<Value, FetchError> {
        self.requests.lock().push((path.to_string(), query.clone()));
        if self.failing_paths.lock().iter().any(|p| p == path) {
            return Err(FetchError::Status {
                status: 502,
                message: format!("{path} upstream down"),
            });
        }
        Ok(json!({ "path": path }))
    }
}

#[async_trait]
impl ContextFetcher for FakeApi {
    async fn fetch_context(&self, family: FocusFamily, target: &str) -> Result<Value, FetchError> {
        let delay = self.context_delays.lock().get(target).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(json!({ "family": format!("{family:?}"), "target": target }))
    }
}

#[async_trait]
impl FeedPoller for FakeApi {
    async fn poll(&self, topic: Topic, _key: &SubscriptionKey) -> Result<Vec<FeedEvent>, FetchError> {
        *self.poll_count.lock().entry(topic).or_default() += 1;
        self.polls.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl ProfileApi for FakeApi {
    async fn fetch_profile(&self) -> Result<ProfileSnapshot, FetchError> {
        let preferences = self.profile.lock().clone();
        match preferences {
            Some(preferences) => Ok(ProfileSnapshot {
                preferences: Some(preferences),
                user_count: Some(4),
                session_count: Some(1),
            }),
            None => Err(FetchError::Status {
                status: 401,
                message: "not signed in".to_string(),
            }),
        }
    }

    async fn save_preferences(&self, preferences: &Preferences) -> Result<(), FetchError> {
        self.saved.lock().push(preferences.clone());
        Ok(())
    }
}

// =============================================================================
// Push Transport
// =============================================================================

type SocketTx = mpsc::UnboundedSender<Result<FeedEvent, TransportError>>;

/// Push transport driven by the test. Each successful `open` hands the test
/// a sender for that socket.
#[derive(Default)]
pub struct FakePush {
    pub refuse: Mutex<bool>,
    pub opened: Mutex<Vec<(Topic, SubscriptionKey)>>,
    sockets: Mutex<Vec<(Topic, SocketTx)>>,
}

impl FakePush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        let push = Self::default();
        *push.refuse.lock() = true;
        Arc::new(push)
    }

    /// Sender of the most recently opened socket.
    pub fn socket(&self) -> SocketTx {
        self.sockets.lock().last().map(|(_, tx)| tx.clone()).unwrap()
    }

    /// Sender of the most recently opened socket for `topic`.
    pub fn sockets_for(&self, topic: Topic) -> Option<SocketTx> {
        self.sockets
            .lock()
            .iter()
            .rev()
            .find(|(t, _)| *t == topic)
            .map(|(_, tx)| tx.clone())
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }
}

#[async_trait]
impl PushTransport for FakePush {
    async fn open(&self, topic: Topic, key: &SubscriptionKey) -> Result<FeedStream, TransportError> {
        self.opened.lock().push((topic, key.clone()));
        if *self.refuse.lock() {
            return Err(TransportError::Unavailable {
                message: "connection refused".to_string(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.sockets.lock().push((topic, tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

// =============================================================================
// Desk
// =============================================================================

/// A desk wired to fakes.
pub struct TestDesk {
    pub runtime: DeskRuntime,
    pub api: Arc<FakeApi>,
    pub push: Option<Arc<FakePush>>,
    pub local: Arc<MemoryStore>,
}

impl TestDesk {
    pub fn new(config: DeskConfig, push: Option<Arc<FakePush>>) -> Self {
        Self::with_store(config, push, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: DeskConfig, push: Option<Arc<FakePush>>, local: Arc<MemoryStore>) -> Self {
        let api = FakeApi::new();
        Self::with_parts(config, api, push, local)
    }

    pub fn with_parts(
        config: DeskConfig,
        api: Arc<FakeApi>,
        push: Option<Arc<FakePush>>,
        local: Arc<MemoryStore>,
    ) -> Self {
        let ports = DeskPorts {
            panels: Arc::clone(&api) as _,
            context: Arc::clone(&api) as _,
            poller: Arc::clone(&api) as _,
            push: push.clone().map(|p| p as Arc<dyn PushTransport>),
            profile: Arc::clone(&api) as _,
            local: Arc::clone(&local) as _,
        };
        let runtime = DeskRuntime::new(config, ports, Arc::new(EventHub::with_defaults()));
        Self {
            runtime,
            api,
            push,
            local,
        }
    }
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
