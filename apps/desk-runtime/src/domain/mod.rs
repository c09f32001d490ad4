//! Domain Layer - Desk state types and pure algorithms.
//!
//! Everything here is synchronous and free of I/O: layout normalization,
//! lenient preference parsing, focus tokens, the feed mode state machine,
//! and alert evaluation.

/// Price alerts and the crossing monitor.
pub mod alerts;

/// Live feed topics, subscription keys, modes, and events.
pub mod feed;

/// Focus families, context tokens, and the per-target result cache.
pub mod focus;

/// Panel universe, layout normalization, and grid placement.
pub mod panel;

/// Canonical user preferences.
pub mod preferences;

/// Quotes and the latest-quote cache.
pub mod quote;

/// Named workspace snapshots.
pub mod workspace;
