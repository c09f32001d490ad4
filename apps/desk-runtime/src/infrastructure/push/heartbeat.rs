//! Heartbeat Monitor
//!
//! Keeps a push socket honest. The monitor asks for a ping every interval
//! and declares the socket silent once nothing at all (frame, pong, or
//! server heartbeat) has arrived for the silence timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::FeedSettings;

/// Heartbeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// Inbound silence after which the socket is considered dead.
    pub silence_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(15),
            silence_timeout: Duration::from_secs(45),
        }
    }
}

impl HeartbeatConfig {
    /// Create a configuration.
    #[must_use]
    pub const fn new(ping_interval: Duration, silence_timeout: Duration) -> Self {
        Self {
            ping_interval,
            silence_timeout,
        }
    }

    /// Timing from the feed settings.
    #[must_use]
    pub const fn from_feed_settings(settings: &FeedSettings) -> Self {
        Self::new(settings.heartbeat_interval, settings.heartbeat_timeout)
    }
}

/// What the monitor asks the socket owner to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a ping frame.
    SendPing,
    /// Nothing arrived within the silence timeout; close the socket.
    Silent,
}

/// Last inbound activity on a socket.
#[derive(Debug)]
pub struct Liveness {
    last_seen: Mutex<Instant>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    /// Start counting from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Record inbound activity.
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound activity.
    #[must_use]
    pub fn silence(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

/// Periodic ping requester and silence detector.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    liveness: Arc<Liveness>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a monitor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        liveness: Arc<Liveness>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            liveness,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, the receiver goes away, or the socket is
    /// declared silent.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat monitor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let silence = self.liveness.silence();
                    let event = if silence > self.config.silence_timeout {
                        tracing::warn!(
                            silence_ms = u64::try_from(silence.as_millis()).unwrap_or(u64::MAX),
                            "Push socket silent"
                        );
                        HeartbeatEvent::Silent
                    } else {
                        HeartbeatEvent::SendPing
                    };

                    if self.event_tx.send(event).await.is_err() || event == HeartbeatEvent::Silent {
                        break;
                    }
                }
            }
        }
    }
}
