//! Desk Event Hub
//!
//! Fan-out of desk state changes over tokio broadcast channels. One channel
//! carries [`DeskEvent`]s, published after every mutation or tick; a second
//! carries transient user-facing [`Notice`]s such as the outcome of a manual
//! save. Slow receivers lag rather than block publishers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::alerts::AlertTrigger;
use crate::domain::feed::{ActivityNotification, FeedMode, FeedStatus, Topic};
use crate::domain::focus::FocusFamily;
use crate::domain::panel::PanelId;
use crate::domain::quote::Symbol;

// =============================================================================
// Events
// =============================================================================

/// Why the preferences changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeReason {
    /// Loaded from storage when the session started.
    SessionStart,
    /// An in-memory edit.
    Mutation,
    /// Replaced by server profile data on sign-in.
    SignIn,
    /// Replaced by the guest snapshot on sign-out.
    SignOut,
    /// Replaced by a workspace snapshot.
    WorkspaceLoaded,
}

/// A desk state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DeskEvent {
    /// Preferences were mutated or replaced.
    PreferencesChanged {
        /// Cause of the change.
        reason: ChangeReason,
    },
    /// New quotes landed in the cache.
    QuotesUpdated {
        /// Source topic.
        topic: Topic,
        /// Updated symbols.
        symbols: Vec<Symbol>,
    },
    /// A feed changed mode or status.
    FeedStatusChanged {
        /// Topic.
        topic: Topic,
        /// New mode.
        mode: FeedMode,
        /// New status.
        status: FeedStatus,
    },
    /// A price alert fired.
    AlertTriggered {
        /// Trigger details.
        trigger: AlertTrigger,
    },
    /// An activity notification arrived.
    Activity {
        /// The notification.
        notification: ActivityNotification,
    },
    /// A focus view was rendered (loading, data, or error).
    FocusUpdated {
        /// Focus family.
        family: FocusFamily,
        /// Rendered target.
        target: String,
    },
    /// Panel data refreshed.
    PanelUpdated {
        /// Panel.
        panel: PanelId,
    },
    /// A panel load failed; other panels are unaffected.
    PanelFailed {
        /// Panel.
        panel: PanelId,
        /// Human-readable error.
        message: String,
    },
}

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Informational.
    Info,
    /// An explicit action succeeded.
    Success,
    /// An explicit action failed.
    Error,
}

/// A transient user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Message.
    pub message: String,
    /// When it was raised.
    pub at: DateTime<Utc>,
}

// =============================================================================
// Hub
// =============================================================================

/// Channel capacities.
#[derive(Debug, Clone, Copy)]
pub struct EventHubConfig {
    /// Capacity of the desk event channel.
    pub events_capacity: usize,
    /// Capacity of the notice channel.
    pub notices_capacity: usize,
}

impl Default for EventHubConfig {
    fn default() -> Self {
        Self {
            events_capacity: 1_024,
            notices_capacity: 64,
        }
    }
}

/// Central hub for desk broadcast channels.
#[derive(Debug)]
pub struct EventHub {
    events_tx: broadcast::Sender<DeskEvent>,
    notices_tx: broadcast::Sender<Notice>,
}

impl EventHub {
    /// Create a hub with the given capacities.
    #[must_use]
    pub fn new(config: EventHubConfig) -> Self {
        Self {
            events_tx: broadcast::channel(config.events_capacity.max(1)).0,
            notices_tx: broadcast::channel(config.notices_capacity.max(1)).0,
        }
    }

    /// Create a hub with default capacities.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(EventHubConfig::default())
    }

    /// Publish a desk event.
    ///
    /// Returns the number of receivers reached, or `None` if nobody listens.
    pub fn publish(&self, event: DeskEvent) -> Option<usize> {
        self.events_tx.send(event).ok()
    }

    /// Get a new receiver for desk events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeskEvent> {
        self.events_tx.subscribe()
    }

    /// Raise a notice.
    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) -> Option<usize> {
        self.notices_tx
            .send(Notice {
                level,
                message: message.into(),
                at: Utc::now(),
            })
            .ok()
    }

    /// Get a new receiver for notices.
    #[must_use]
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices_tx.subscribe()
    }

    /// Receiver counts.
    #[must_use]
    pub fn stats(&self) -> EventHubStats {
        EventHubStats {
            event_receivers: self.events_tx.receiver_count(),
            notice_receivers: self.notices_tx.receiver_count(),
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Shared hub reference.
pub type SharedEventHub = Arc<EventHub>;

/// Receiver counts per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventHubStats {
    /// Desk event receivers.
    pub event_receivers: usize,
    /// Notice receivers.
    pub notice_receivers: usize,
}

impl EventHubStats {
    /// Receivers across all channels.
    #[must_use]
    pub const fn total_receivers(&self) -> usize {
        self.event_receivers + self.notice_receivers
    }
}
