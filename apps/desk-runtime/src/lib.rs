#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Desk Runtime - Live Dashboard Synchronization
//!
//! The client-side synchronization layer of a multi-panel market-data desk.
//! It keeps live feeds running over push with a polling fallback, guards
//! focus reads against stale responses, normalizes the panel layout, and
//! persists preferences to the local store or the user profile.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: Pure desk types and algorithms
//!   - `panel`: Panel universe, layout normalization, grid placement
//!   - `preferences`: Canonical preferences and lenient parsing
//!   - `feed`: Topics, subscription keys, the feed mode machine, backoff
//!   - `focus`: Focus tokens and the per-target result cache
//!   - `quote`, `alerts`, `workspace`: Quotes, price alerts, snapshots
//!
//! - **Application**: Services and port definitions
//!   - `ports`: Fetch, feed, profile, and local storage interfaces
//!   - `services`: Feed connections, focus loading, layout, sync, bootstrap
//!   - `state`: Shared desk state and the snapshot read model
//!   - `runtime`: The facade that wires every service together
//!
//! - **Infrastructure**: Adapters and process concerns
//!   - `push`: WebSocket push transport with heartbeats
//!   - `http`: `reqwest` client for panels, polling, and the profile
//!   - `storage`: JSON file and in-memory guest stores
//!   - `health`: Snapshot, health, and metrics HTTP endpoint
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! push socket --+                  +--> DeskState --> snapshot / events
//!               +--> FeedConnection |
//! poll endpoint-+   (push or poll)  +--> alert monitor --> notices
//!
//! preference edits --> debounce --> local store | profile endpoint
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Desk types and pure algorithms.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Runtime facade
pub use application::events::{DeskEvent, EventHub, Notice, NoticeLevel, SharedEventHub};
pub use application::runtime::{DeskPorts, DeskRuntime};
pub use application::services::{AuthMode, BootstrapReport, FocusOutcome, SyncError};
pub use application::state::{DeskSnapshot, DeskState};

// Domain types
pub use domain::feed::{FeedMode, FeedStatus, SubscriptionKey, Topic};
pub use domain::panel::PanelUniverse;
pub use domain::preferences::Preferences;

// Infrastructure config
pub use infrastructure::config::{ConfigError, DeskConfig, HostingTarget, SessionToken};

// Adapters
pub use infrastructure::http::DeskApiClient;
pub use infrastructure::push::{WsPushTransport, WsTransportConfig};
pub use infrastructure::storage::{JsonFileStore, MemoryStore};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
