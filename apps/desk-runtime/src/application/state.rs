//! Desk State
//!
//! The single owned object holding everything the desk renders: the
//! canonical preferences, the quote cache, feed health, focus views, panel
//! data, and activity. Each field sits behind its own short `parking_lot`
//! critical section and no lock is held across an `.await`. Methods here
//! never hold two of these locks at once. Callers may hold one lock of their
//! own while calling in: the focus loader keeps its request guard locked
//! while it writes the cache and the focus view.
//!
//! Every mutation publishes a [`DeskEvent`] on the hub.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;

use super::events::{ChangeReason, DeskEvent, SharedEventHub};
use super::ports::TickSink;
use crate::domain::alerts::{AlertMonitor, AlertTrigger};
use crate::domain::feed::{ActivityNotification, FeedEvent, FeedMode, FeedStatus, Topic};
use crate::domain::focus::FocusFamily;
use crate::domain::panel::{EffectivePlacement, PanelId, PanelUniverse};
use crate::domain::preferences::Preferences;
use crate::domain::quote::{Quote, QuoteCache};
use crate::infrastructure::metrics;

/// Activity notifications kept for display.
pub const MAX_ACTIVITY: usize = 50;

// =============================================================================
// Views
// =============================================================================

/// Health of one feed topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicHealth {
    /// Topic.
    pub topic: Topic,
    /// Current mode.
    pub mode: FeedMode,
    /// Current status.
    pub status: FeedStatus,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

/// What a focus-driven panel currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum FocusView {
    /// A request is in flight.
    Loading {
        /// Target being loaded.
        target: String,
    },
    /// Data is shown.
    Ready {
        /// Target shown.
        target: String,
        /// Context payload.
        data: Value,
        /// Whether it came from the result cache.
        cached: bool,
    },
    /// The load failed.
    Failed {
        /// Target that failed.
        target: String,
        /// Human-readable error.
        message: String,
    },
}

impl FocusView {
    /// Target the view is about.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Loading { target } | Self::Ready { target, .. } | Self::Failed { target, .. } => {
                target
            }
        }
    }
}

/// Latest data and error of one panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelView {
    /// Last successful payload; kept when a later refresh fails.
    pub data: Option<Value>,
    /// Error of the most recent load, if it failed.
    pub error: Option<String>,
    /// Time of the last successful load.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Counts reported by the profile endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    /// Whether the desk is signed in.
    pub authenticated: bool,
    /// Registered users.
    pub user_count: Option<u64>,
    /// Active sessions.
    pub session_count: Option<u64>,
}

/// Read-only view of the whole desk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeskSnapshot {
    /// Canonical preferences.
    pub preferences: Preferences,
    /// Aggregate feed status.
    pub feed_status: FeedStatus,
    /// Per-topic health.
    pub topics: Vec<TopicHealth>,
    /// Time of the last applied tick.
    pub last_sync: Option<DateTime<Utc>>,
    /// Viewport the placements were computed for.
    pub viewport_width: u32,
    /// Whether the viewport is below the breakpoint.
    pub collapsed: bool,
    /// Effective placements on the active page.
    pub placements: Vec<EffectivePlacement>,
    /// Cached quotes, sorted by symbol.
    pub quotes: Vec<Quote>,
    /// Focus views.
    pub focus: BTreeMap<FocusFamily, FocusView>,
    /// Panel data.
    pub panels: BTreeMap<PanelId, PanelView>,
    /// Recent activity, newest first.
    pub activity: Vec<ActivityNotification>,
    /// Profile summary.
    pub profile: ProfileSummary,
}

// =============================================================================
// State
// =============================================================================

/// Shared desk state.
#[derive(Debug)]
pub struct DeskState {
    universe: PanelUniverse,
    events: SharedEventHub,
    preferences: RwLock<Preferences>,
    quotes: RwLock<QuoteCache>,
    alerts: Mutex<AlertMonitor>,
    feeds: RwLock<BTreeMap<Topic, TopicHealth>>,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    focus: RwLock<BTreeMap<FocusFamily, FocusView>>,
    panels: RwLock<BTreeMap<PanelId, PanelView>>,
    activity: RwLock<VecDeque<ActivityNotification>>,
    profile: RwLock<ProfileSummary>,
}

impl DeskState {
    /// Create state holding default preferences.
    #[must_use]
    pub fn new(universe: PanelUniverse, events: SharedEventHub) -> Self {
        let preferences = Preferences::defaults(&universe);
        Self {
            universe,
            events,
            preferences: RwLock::new(preferences),
            quotes: RwLock::new(QuoteCache::new()),
            alerts: Mutex::new(AlertMonitor::new()),
            feeds: RwLock::new(BTreeMap::new()),
            last_sync: RwLock::new(None),
            focus: RwLock::new(BTreeMap::new()),
            panels: RwLock::new(BTreeMap::new()),
            activity: RwLock::new(VecDeque::new()),
            profile: RwLock::new(ProfileSummary::default()),
        }
    }

    /// Panel universe.
    #[must_use]
    pub const fn universe(&self) -> &PanelUniverse {
        &self.universe
    }

    /// Event hub.
    #[must_use]
    pub const fn events(&self) -> &SharedEventHub {
        &self.events
    }

    // =========================================================================
    // Preferences
    // =========================================================================

    /// Copy of the current preferences.
    #[must_use]
    pub fn preferences(&self) -> Preferences {
        self.preferences.read().clone()
    }

    /// Read the preferences without cloning.
    pub fn with_preferences<R>(&self, f: impl FnOnce(&Preferences) -> R) -> R {
        f(&self.preferences.read())
    }

    /// Apply an in-memory edit and re-normalize.
    ///
    /// Returns whether the preferences actually changed.
    pub fn mutate_preferences(&self, mutation: impl FnOnce(&mut Preferences)) -> bool {
        let alerts = {
            let mut preferences = self.preferences.write();
            let before = preferences.clone();
            mutation(&mut preferences);
            preferences.normalize(&self.universe);
            if *preferences == before {
                return false;
            }
            preferences.price_alerts.clone()
        };

        self.alerts.lock().retain(&alerts);
        self.events.publish(DeskEvent::PreferencesChanged {
            reason: ChangeReason::Mutation,
        });
        true
    }

    /// Replace the preferences wholesale.
    pub fn replace_preferences(&self, mut preferences: Preferences, reason: ChangeReason) {
        preferences.normalize(&self.universe);
        let alerts = preferences.price_alerts.clone();
        *self.preferences.write() = preferences;

        self.alerts.lock().retain(&alerts);
        self.events.publish(DeskEvent::PreferencesChanged { reason });
    }

    // =========================================================================
    // Feeds
    // =========================================================================

    /// Aggregate status over all topics.
    #[must_use]
    pub fn feed_status(&self) -> FeedStatus {
        FeedStatus::aggregate(self.feeds.read().values().map(|health| health.status))
    }

    /// Health of one topic.
    #[must_use]
    pub fn topic_health(&self, topic: Topic) -> Option<TopicHealth> {
        self.feeds.read().get(&topic).cloned()
    }

    /// Time of the last applied data tick.
    #[must_use]
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.read()
    }

    /// Latest quote for a symbol.
    #[must_use]
    pub fn quote(&self, symbol: &str) -> Option<Quote> {
        self.quotes.read().get(symbol).cloned()
    }

    /// Recent activity, newest first.
    #[must_use]
    pub fn activity(&self) -> Vec<ActivityNotification> {
        self.activity.read().iter().cloned().collect()
    }

    fn apply_quotes(&self, topic: Topic, quotes: Vec<Quote>) {
        if quotes.is_empty() {
            return;
        }
        let alerts = self.with_preferences(|p| p.price_alerts.clone());

        let triggers: Vec<AlertTrigger> = {
            let mut monitor = self.alerts.lock();
            quotes
                .iter()
                .flat_map(|quote| monitor.evaluate(&alerts, quote))
                .collect()
        };

        let symbols: Vec<String> = quotes.iter().map(|q| q.symbol.clone()).collect();
        {
            let mut cache = self.quotes.write();
            for quote in quotes {
                cache.upsert(quote);
            }
        }

        metrics::record_feed_events(topic, "quote", symbols.len() as u64);
        self.events.publish(DeskEvent::QuotesUpdated { topic, symbols });
        for trigger in triggers {
            tracing::info!(
                alert_id = %trigger.alert_id,
                symbol = %trigger.symbol,
                price = %trigger.price,
                "Price alert triggered"
            );
            self.events.publish(DeskEvent::AlertTriggered { trigger });
        }
    }

    fn apply_activity(&self, topic: Topic, notification: ActivityNotification) {
        {
            let mut activity = self.activity.write();
            if activity.iter().any(|n| n.id == notification.id) {
                return;
            }
            activity.push_front(notification.clone());
            activity.truncate(MAX_ACTIVITY);
        }
        metrics::record_feed_events(topic, "activity", 1);
        self.events.publish(DeskEvent::Activity { notification });
    }

    // =========================================================================
    // Focus and Panels
    // =========================================================================

    /// Show a focus view.
    pub fn set_focus_view(&self, family: FocusFamily, view: FocusView) {
        let target = view.target().to_string();
        self.focus.write().insert(family, view);
        self.events.publish(DeskEvent::FocusUpdated { family, target });
    }

    /// Current focus view of a family.
    #[must_use]
    pub fn focus_view(&self, family: FocusFamily) -> Option<FocusView> {
        self.focus.read().get(&family).cloned()
    }

    /// Store fresh panel data and clear its error.
    pub fn set_panel_data(&self, panel: &str, data: Value) {
        self.panels.write().insert(
            panel.to_string(),
            PanelView {
                data: Some(data),
                error: None,
                updated_at: Some(Utc::now()),
            },
        );
        self.events.publish(DeskEvent::PanelUpdated {
            panel: panel.to_string(),
        });
    }

    /// Record a panel load failure, keeping the last good data.
    pub fn set_panel_error(&self, panel: &str, message: &str) {
        self.panels
            .write()
            .entry(panel.to_string())
            .or_default()
            .error = Some(message.to_string());
        self.events.publish(DeskEvent::PanelFailed {
            panel: panel.to_string(),
            message: message.to_string(),
        });
    }

    /// Current view of a panel.
    #[must_use]
    pub fn panel_view(&self, panel: &str) -> Option<PanelView> {
        self.panels.read().get(panel).cloned()
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Record the profile summary.
    pub fn set_profile(&self, summary: ProfileSummary) {
        *self.profile.write() = summary;
    }

    /// Current profile summary.
    #[must_use]
    pub fn profile(&self) -> ProfileSummary {
        *self.profile.read()
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    /// Assemble a read-only snapshot around precomputed placements.
    #[must_use]
    pub fn snapshot(
        &self,
        placements: Vec<EffectivePlacement>,
        viewport_width: u32,
        collapsed: bool,
    ) -> DeskSnapshot {
        DeskSnapshot {
            preferences: self.preferences(),
            feed_status: self.feed_status(),
            topics: self.feeds.read().values().cloned().collect(),
            last_sync: self.last_sync(),
            viewport_width,
            collapsed,
            placements,
            quotes: self.quotes.read().sorted(),
            focus: self.focus.read().clone(),
            panels: self.panels.read().clone(),
            activity: self.activity(),
            profile: self.profile(),
        }
    }
}

impl TickSink for DeskState {
    fn apply(&self, topic: Topic, events: Vec<FeedEvent>) {
        let mut saw_data = false;

        for event in events {
            match event {
                FeedEvent::Quotes(quotes) => {
                    saw_data = true;
                    self.apply_quotes(topic, quotes);
                }
                FeedEvent::Activity(notification) => {
                    saw_data = true;
                    self.apply_activity(topic, notification);
                }
                FeedEvent::Heartbeat => {
                    metrics::record_feed_events(topic, "heartbeat", 1);
                }
            }
        }

        if saw_data {
            self.synced(topic);
        }
    }

    fn synced(&self, _topic: Topic) {
        *self.last_sync.write() = Some(Utc::now());
    }

    fn mode_changed(&self, topic: Topic, mode: FeedMode, status: FeedStatus) {
        {
            let mut feeds = self.feeds.write();
            if mode == FeedMode::Idle {
                if feeds.remove(&topic).is_none() {
                    return;
                }
            } else {
                let unchanged = feeds
                    .get(&topic)
                    .is_some_and(|health| health.mode == mode && health.status == status);
                if unchanged {
                    return;
                }
                feeds.insert(
                    topic,
                    TopicHealth {
                        topic,
                        mode,
                        status,
                        updated_at: Utc::now(),
                    },
                );
            }
        }

        tracing::info!(topic = %topic, mode = %mode, status = ?status, "Feed status changed");
        self.events
            .publish(DeskEvent::FeedStatusChanged { topic, mode, status });
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use super::*;
    use crate::application::events::EventHub;
    use crate::domain::alerts::{AlertDirection, PriceAlert};

    fn state() -> DeskState {
        DeskState::new(PanelUniverse::standard(), Arc::new(EventHub::with_defaults()))
    }

    fn quote(symbol: &str, price: &str) -> Quote {
        Quote::new(symbol, Decimal::from_str(price).unwrap(), Utc::now())
    }

    #[test]
    fn mutation_normalizes_and_reports_change() {
        let state = state();
        let mut rx = state.events().subscribe();

        let changed = state.mutate_preferences(|p| {
            p.panel_layout.clear();
            p.panel_sizes.insert("news".to_string(), 40);
        });

        assert!(changed);
        let prefs = state.preferences();
        assert_eq!(prefs.panel_layout.len(), state.universe().len());
        assert_eq!(prefs.panel_sizes["news"], 12);
        assert!(matches!(
            rx.try_recv().unwrap(),
            DeskEvent::PreferencesChanged {
                reason: ChangeReason::Mutation
            }
        ));
    }

    #[test]
    fn noop_mutation_publishes_nothing() {
        let state = state();
        let mut rx = state.events().subscribe();

        assert!(!state.mutate_preferences(|p| {
            p.panel_layout.reverse();
            p.panel_layout.reverse();
        }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn tick_updates_cache_last_sync_and_alerts() {
        let state = state();
        state.mutate_preferences(|p| {
            p.price_alerts.push(PriceAlert {
                id: "btc-100k".to_string(),
                symbol: "BTC-USD".to_string(),
                direction: AlertDirection::Above,
                threshold: Decimal::from(100_000),
            });
        });
        let mut rx = state.events().subscribe();

        state.apply(
            Topic::CryptoTicker,
            vec![FeedEvent::Quotes(vec![quote("BTC-USD", "100250.5")])],
        );

        assert_eq!(
            state.quote("BTC-USD").map(|q| q.price),
            Some(Decimal::from_str("100250.5").unwrap())
        );
        assert!(state.last_sync().is_some());
        assert!(matches!(rx.try_recv().unwrap(), DeskEvent::QuotesUpdated { .. }));
        assert!(matches!(rx.try_recv().unwrap(), DeskEvent::AlertTriggered { .. }));
    }

    #[test]
    fn heartbeat_does_not_touch_last_sync() {
        let state = state();
        state.apply(Topic::CryptoTicker, vec![FeedEvent::Heartbeat]);
        assert!(state.last_sync().is_none());
    }

    #[test]
    fn empty_successful_poll_refreshes_last_sync() {
        let state = state();
        state.apply(Topic::Activity, Vec::new());
        assert!(state.last_sync().is_none());

        state.synced(Topic::Activity);
        assert!(state.last_sync().is_some());
    }

    #[test]
    fn activity_dedupes_and_caps() {
        let state = state();
        for i in 0..(MAX_ACTIVITY + 5) {
            let notification = ActivityNotification {
                id: format!("n{i}"),
                kind: "system".to_string(),
                message: "hello".to_string(),
                created_at: Utc::now(),
            };
            state.apply(
                Topic::Activity,
                vec![
                    FeedEvent::Activity(notification.clone()),
                    FeedEvent::Activity(notification),
                ],
            );
        }
        let activity = state.activity();
        assert_eq!(activity.len(), MAX_ACTIVITY);
        assert_eq!(activity[0].id, format!("n{}", MAX_ACTIVITY + 4));
    }

    #[test]
    fn feed_status_aggregates_topics() {
        let state = state();
        assert_eq!(state.feed_status(), FeedStatus::Idle);

        state.mode_changed(Topic::CryptoTicker, FeedMode::Streaming, FeedStatus::Live);
        state.mode_changed(Topic::Activity, FeedMode::Polling, FeedStatus::Degraded);
        assert_eq!(state.feed_status(), FeedStatus::Degraded);

        state.mode_changed(Topic::Activity, FeedMode::Idle, FeedStatus::Idle);
        assert_eq!(state.feed_status(), FeedStatus::Live);
        assert!(state.topic_health(Topic::Activity).is_none());
    }

    #[test]
    fn panel_error_keeps_last_data() {
        let state = state();
        state.set_panel_data("news", serde_json::json!({ "items": [] }));
        state.set_panel_error("news", "upstream unavailable");

        let view = state.panel_view("news").unwrap();
        assert!(view.data.is_some());
        assert_eq!(view.error.as_deref(), Some("upstream unavailable"));
    }
}
