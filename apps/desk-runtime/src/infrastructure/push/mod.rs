//! Push Transport
//!
//! WebSocket adapter for the [`PushTransport`](crate::application::ports::PushTransport)
//! port, with its frame codec and heartbeat monitor.

pub mod codec;
pub mod heartbeat;
mod ws;

pub use codec::{CodecError, FeedCodec, SubscribeRequest};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, Liveness};
pub use ws::{WsPushTransport, WsTransportConfig};
