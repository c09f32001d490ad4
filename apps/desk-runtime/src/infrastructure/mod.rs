//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus process-level concerns: configuration, telemetry, and the HTTP
//! surface.

/// Configuration loading.
pub mod config;

/// Snapshot, health, and metrics HTTP endpoint.
pub mod health;

/// HTTP client for panels, focus context, polling, and the profile.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// WebSocket push transport.
pub mod push;

/// Local guest storage.
pub mod storage;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;
