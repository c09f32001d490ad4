//! Port Interfaces
//!
//! The contracts the desk runtime expects from the outside world. The
//! infrastructure layer provides the production adapters; tests provide
//! fakes.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PanelFetcher`: JSON fetches for panel data
//! - `ContextFetcher`: focus-scoped context fetches
//! - `PushTransport`: push streams for live topics
//! - `FeedPoller`: polling fallback for live topics
//! - `ProfileApi`: server-side preference storage
//! - `LocalStore`: local guest storage
//!
//! ## Driver Ports (Inbound)
//!
//! - `TickSink`: where feed connections deliver ticks and mode changes

mod feed_port;
mod fetch_port;
mod profile_port;

pub use feed_port::{FeedPoller, FeedStream, PushTransport, TickSink, TransportError};
pub use fetch_port::{ContextFetcher, FetchError, PanelFetcher, QueryParams};
pub use profile_port::{LocalStore, ProfileApi, ProfileSnapshot, StoreError};

#[cfg(test)]
pub use feed_port::{MockFeedPoller, MockPushTransport};
#[cfg(test)]
pub use fetch_port::{MockContextFetcher, MockPanelFetcher};
#[cfg(test)]
pub use profile_port::{MockLocalStore, MockProfileApi};
