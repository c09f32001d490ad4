//! Feed connection mode state machine.
//!
//! ```text
//!            start(push)             stream_failed
//!   Idle ──────────────────► Streaming ──────────► Polling
//!     │                          ▲                    │
//!     │  start(no push)          └── stream_restored ─┘
//!     └─────────────────────────────────────────────► Polling
//! ```
//!
//! `stop` returns any mode to `Idle`.

use std::fmt;

use serde::Serialize;

/// Transport mode of one feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Not connected.
    Idle,
    /// Receiving from a push transport.
    Streaming,
    /// Fetching on an interval.
    Polling,
}

impl FeedMode {
    /// Stable name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Polling => "polling",
        }
    }
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing health of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FeedStatus {
    /// Nothing connected.
    Idle,
    /// Streaming.
    Live,
    /// Polling successfully.
    Polling,
    /// Polling with repeated failures.
    Degraded,
}

impl FeedStatus {
    /// Combine per-topic statuses into one; the worst status wins and idle
    /// topics are ignored.
    #[must_use]
    pub fn aggregate(statuses: impl IntoIterator<Item = Self>) -> Self {
        statuses.into_iter().max().unwrap_or(Self::Idle)
    }
}

/// Error for a transition the current mode does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} while {mode}")]
pub struct FeedTransitionError {
    /// Attempted transition.
    pub action: &'static str,
    /// Mode at the time.
    pub mode: FeedMode,
}

/// Mode and failure bookkeeping for one connection.
#[derive(Debug, Clone)]
pub struct FeedStateMachine {
    mode: FeedMode,
    consecutive_failures: u32,
    degraded_after: u32,
}

impl FeedStateMachine {
    /// Create an idle machine that reports `Degraded` after
    /// `degraded_after` consecutive poll failures.
    #[must_use]
    pub const fn new(degraded_after: u32) -> Self {
        Self {
            mode: FeedMode::Idle,
            consecutive_failures: 0,
            degraded_after: if degraded_after == 0 { 1 } else { degraded_after },
        }
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> FeedMode {
        self.mode
    }

    /// Consecutive poll failures since the last success.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Status derived from mode and failure count.
    #[must_use]
    pub const fn status(&self) -> FeedStatus {
        match self.mode {
            FeedMode::Idle => FeedStatus::Idle,
            FeedMode::Streaming => FeedStatus::Live,
            FeedMode::Polling if self.consecutive_failures >= self.degraded_after => {
                FeedStatus::Degraded
            }
            FeedMode::Polling => FeedStatus::Polling,
        }
    }

    /// Leave `Idle`, streaming when push is allowed and polling otherwise.
    ///
    /// # Errors
    ///
    /// Fails unless the machine is idle.
    pub fn start(&mut self, push_allowed: bool) -> Result<FeedMode, FeedTransitionError> {
        self.require(FeedMode::Idle, "start")?;
        self.mode = if push_allowed {
            FeedMode::Streaming
        } else {
            FeedMode::Polling
        };
        self.consecutive_failures = 0;
        Ok(self.mode)
    }

    /// The push transport failed, closed, or went silent.
    ///
    /// # Errors
    ///
    /// Fails unless streaming.
    pub fn stream_failed(&mut self) -> Result<FeedMode, FeedTransitionError> {
        self.require(FeedMode::Streaming, "fall back to polling")?;
        self.mode = FeedMode::Polling;
        self.consecutive_failures = 0;
        Ok(self.mode)
    }

    /// A push transport re-opened while polling.
    ///
    /// # Errors
    ///
    /// Fails unless polling.
    pub fn stream_restored(&mut self) -> Result<FeedMode, FeedTransitionError> {
        self.require(FeedMode::Polling, "restore streaming")?;
        self.mode = FeedMode::Streaming;
        self.consecutive_failures = 0;
        Ok(self.mode)
    }

    /// A poll succeeded.
    ///
    /// # Errors
    ///
    /// Fails unless polling.
    pub fn poll_succeeded(&mut self) -> Result<FeedStatus, FeedTransitionError> {
        self.require(FeedMode::Polling, "record a poll")?;
        self.consecutive_failures = 0;
        Ok(self.status())
    }

    /// A poll failed.
    ///
    /// # Errors
    ///
    /// Fails unless polling.
    pub fn poll_failed(&mut self) -> Result<FeedStatus, FeedTransitionError> {
        self.require(FeedMode::Polling, "record a poll")?;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        Ok(self.status())
    }

    /// Return to `Idle` from any mode.
    pub const fn stop(&mut self) {
        self.mode = FeedMode::Idle;
        self.consecutive_failures = 0;
    }

    fn require(&self, mode: FeedMode, action: &'static str) -> Result<(), FeedTransitionError> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(FeedTransitionError {
                action,
                mode: self.mode,
            })
        }
    }
}
