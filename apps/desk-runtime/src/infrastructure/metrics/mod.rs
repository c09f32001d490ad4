//! Prometheus Metrics Module
//!
//! Exposes desk runtime metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Feeds**: events received, fallbacks, poll failures, active transports
//! - **Focus**: stale responses discarded
//! - **Persistence**: preference writes by target and outcome
//! - **Bootstrap**: panel load outcomes
//! - **Latency**: desk API request durations
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the desk HTTP server.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::feed::Topic;
use crate::domain::focus::FocusFamily;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Idempotent: later calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed counters
    describe_counter!(
        "desk_feed_events_total",
        "Total feed events applied, by topic and kind"
    );
    describe_counter!(
        "desk_feed_fallbacks_total",
        "Total fallbacks from push to polling"
    );
    describe_counter!(
        "desk_feed_poll_failures_total",
        "Total failed polls"
    );
    describe_counter!(
        "desk_feed_push_probes_total",
        "Total push transport re-probes while polling"
    );
    describe_counter!(
        "desk_feed_ticks_dropped_total",
        "Total ticks dropped because their connection was superseded"
    );

    // Feed gauges
    describe_gauge!(
        "desk_feed_active_transports",
        "Number of active transports per topic"
    );

    // Focus
    describe_counter!(
        "desk_stale_responses_total",
        "Total focus responses discarded as stale"
    );

    // Persistence
    describe_counter!(
        "desk_persist_total",
        "Total preference writes by target and outcome"
    );

    // Bootstrap
    describe_counter!(
        "desk_bootstrap_tasks_total",
        "Total panel loads by outcome"
    );

    // Latency histograms
    describe_histogram!(
        "desk_api_request_seconds",
        "Desk API request duration by request kind"
    );
}

// =============================================================================
// Metric Labels
// =============================================================================

/// Where a preference write went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistTarget {
    /// Guest local store.
    Local,
    /// Profile endpoint.
    Remote,
}

impl PersistTarget {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Succeeded.
    Success,
    /// Failed.
    Failure,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// Outcome of a result.
    #[must_use]
    pub const fn of<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

/// Kind of desk API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Panel data.
    Panel,
    /// Focus context.
    Context,
    /// Feed poll.
    Poll,
    /// Profile read or write.
    Profile,
}

impl RequestKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Panel => "panel",
            Self::Context => "context",
            Self::Poll => "poll",
            Self::Profile => "profile",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record feed events applied on a topic.
pub fn record_feed_events(topic: Topic, kind: &'static str, count: u64) {
    counter!(
        "desk_feed_events_total",
        "topic" => topic.as_str(),
        "kind" => kind
    )
    .increment(count);
}

/// Record a fallback from push to polling.
pub fn record_fallback(topic: Topic) {
    counter!("desk_feed_fallbacks_total", "topic" => topic.as_str()).increment(1);
}

/// Record a failed poll.
pub fn record_poll_failure(topic: Topic) {
    counter!("desk_feed_poll_failures_total", "topic" => topic.as_str()).increment(1);
}

/// Record a push re-probe attempt.
pub fn record_push_probe(topic: Topic) {
    counter!("desk_feed_push_probes_total", "topic" => topic.as_str()).increment(1);
}

/// Record ticks dropped from a superseded connection.
pub fn record_ticks_dropped(topic: Topic, count: u64) {
    counter!("desk_feed_ticks_dropped_total", "topic" => topic.as_str()).increment(count);
}

/// Update the active transport count for a topic.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_transports(topic: Topic, count: usize) {
    gauge!("desk_feed_active_transports", "topic" => topic.as_str()).set(count as f64);
}

/// Record a focus response discarded as stale.
pub fn record_stale_response(family: FocusFamily) {
    counter!("desk_stale_responses_total", "family" => family.as_str()).increment(1);
}

/// Record a preference write.
pub fn record_persist(target: PersistTarget, outcome: Outcome) {
    counter!(
        "desk_persist_total",
        "target" => target.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a bootstrap or refresh panel load.
pub fn record_bootstrap_task(panel: &str, outcome: Outcome) {
    counter!(
        "desk_bootstrap_tasks_total",
        "panel" => panel.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a desk API request duration.
pub fn record_request_duration(kind: RequestKind, duration: Duration) {
    histogram!("desk_api_request_seconds", "kind" => kind.as_str()).record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_values() {
        assert_eq!(PersistTarget::Local.as_str(), "local");
        assert_eq!(PersistTarget::Remote.as_str(), "remote");
        assert_eq!(RequestKind::Poll.as_str(), "poll");
        assert_eq!(Outcome::of::<(), ()>(&Ok(())).as_str(), "success");
        assert_eq!(Outcome::of::<(), ()>(&Err(())).as_str(), "failure");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_fallback(Topic::CryptoTicker);
        set_active_transports(Topic::Activity, 1);
        record_persist(PersistTarget::Remote, Outcome::Failure);
    }
}
