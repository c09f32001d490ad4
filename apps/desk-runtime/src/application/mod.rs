//! Application Layer - Use cases and port definitions.
//!
//! This layer owns the shared desk state, the services that mutate it, and
//! the port interfaces through which those services reach the outside world.

/// Desk events and transient notices.
pub mod events;

/// Port interfaces for external systems (HTTP, push transport, storage).
pub mod ports;

/// The runtime facade tying the services together.
pub mod runtime;

/// Application services for sync, layout, focus, feeds, and bootstrap.
pub mod services;

/// Shared read-side state.
pub mod state;
