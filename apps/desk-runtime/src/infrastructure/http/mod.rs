//! HTTP Adapter
//!
//! `reqwest`-backed implementation of the fetch, poll, and profile ports.

mod client;

pub use client::DeskApiClient;
