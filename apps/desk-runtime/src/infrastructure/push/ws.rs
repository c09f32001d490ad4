//! WebSocket Push Transport
//!
//! Opens one socket per topic connection against the desk push endpoint,
//! sends the subscribe request, and pumps decoded frames into a stream.
//! The pump owns the socket: it answers pings, sends heartbeat pings of its
//! own, and ends the stream when the socket closes, goes silent, or the
//! stream is dropped by the connection that opened it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, FeedCodec, SubscribeRequest};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, Liveness};
use crate::application::ports::{FeedStream, PushTransport, TransportError};
use crate::domain::feed::{FeedEvent, SubscriptionKey, Topic};
use crate::infrastructure::config::{ApiSettings, FeedSettings, SessionToken};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type EventTx = mpsc::UnboundedSender<Result<FeedEvent, TransportError>>;

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    /// Push endpoint URL.
    pub url: String,
    /// Session token sent as a bearer header, if signed in.
    pub session_token: Option<SessionToken>,
    /// Time allowed for the handshake and subscribe.
    pub connect_timeout: Duration,
    /// Heartbeat timing.
    pub heartbeat: HeartbeatConfig,
}

impl WsTransportConfig {
    /// Configuration from the API and feed settings.
    #[must_use]
    pub fn from_settings(api: &ApiSettings, feed: &FeedSettings) -> Self {
        Self {
            url: api.push_url.clone(),
            session_token: api.session_token.clone(),
            connect_timeout: api.timeout,
            heartbeat: HeartbeatConfig::from_feed_settings(feed),
        }
    }
}

/// Push transport over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsPushTransport {
    config: Arc<WsTransportConfig>,
    codec: FeedCodec,
}

impl WsPushTransport {
    /// Create a transport.
    #[must_use]
    pub fn new(config: WsTransportConfig) -> Self {
        Self {
            config: Arc::new(config),
            codec: FeedCodec::new(),
        }
    }

    async fn connect(&self, topic: Topic, key: &SubscriptionKey) -> Result<Socket, TransportError> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(unavailable)?;
        if let Some(token) = &self.config.session_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
                .map_err(unavailable)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (mut socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(unavailable)?;

        let subscribe = SubscribeRequest::new(topic, key)
            .to_json()
            .map_err(unavailable)?;
        socket
            .send(Message::Text(subscribe.into()))
            .await
            .map_err(unavailable)?;
        Ok(socket)
    }
}

#[async_trait]
impl PushTransport for WsPushTransport {
    async fn open(&self, topic: Topic, key: &SubscriptionKey) -> Result<FeedStream, TransportError> {
        tracing::info!(url = %self.config.url, topic = %topic, key = %key, "Opening push socket");

        let socket = tokio::time::timeout(self.config.connect_timeout, self.connect(topic, key))
            .await
            .map_err(|_| TransportError::Unavailable {
                message: format!(
                    "no handshake within {}s",
                    self.config.connect_timeout.as_secs()
                ),
            })??;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(socket, topic, self.codec, self.config.heartbeat, tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

/// Own the socket until it fails or the receiving stream is dropped.
async fn pump(socket: Socket, topic: Topic, codec: FeedCodec, heartbeat: HeartbeatConfig, tx: EventTx) {
    let (mut write, mut read) = socket.split();

    let liveness = Arc::new(Liveness::new());
    let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel(4);
    let heartbeat_cancel = CancellationToken::new();
    tokio::spawn(
        HeartbeatMonitor::new(
            heartbeat,
            Arc::clone(&liveness),
            heartbeat_tx,
            heartbeat_cancel.clone(),
        )
        .run(),
    );

    let outcome = loop {
        tokio::select! {
            () = tx.closed() => break Ok(()),
            event = heartbeat_rx.recv() => match event {
                Some(HeartbeatEvent::SendPing) => {
                    if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                        break Err(closed(e));
                    }
                }
                Some(HeartbeatEvent::Silent) | None => {
                    break Err(TransportError::Closed {
                        message: "heartbeat silence".to_string(),
                    });
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    liveness.touch();
                    forward(&tx, codec.decode(text.as_str()));
                }
                Some(Ok(Message::Pong(_))) => {
                    liveness.touch();
                    let _ = tx.send(Ok(FeedEvent::Heartbeat));
                }
                Some(Ok(Message::Ping(data))) => {
                    liveness.touch();
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        break Err(closed(e));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break Err(TransportError::Closed {
                        message: frame.map_or_else(
                            || "server closed the socket".to_string(),
                            |f| f.reason.as_str().to_string(),
                        ),
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(closed(e)),
                None => {
                    break Err(TransportError::Closed {
                        message: "socket ended".to_string(),
                    });
                }
            },
        }
    };

    heartbeat_cancel.cancel();
    match outcome {
        Ok(()) => {
            tracing::debug!(topic = %topic, "Push stream dropped; closing socket");
            let _ = write.send(Message::Close(None)).await;
        }
        Err(e) => {
            tracing::info!(topic = %topic, error = %e, "Push socket closed");
            let _ = tx.send(Err(e));
        }
    }
}

fn forward(tx: &EventTx, decoded: Result<Vec<FeedEvent>, CodecError>) {
    match decoded {
        Ok(events) => {
            for event in events {
                let _ = tx.send(Ok(event));
            }
        }
        Err(CodecError::Server(message)) => {
            let _ = tx.send(Err(TransportError::Closed { message }));
        }
        Err(e) => {
            let _ = tx.send(Err(TransportError::Protocol {
                message: e.to_string(),
            }));
        }
    }
}

fn unavailable(e: impl std::fmt::Display) -> TransportError {
    TransportError::Unavailable {
        message: e.to_string(),
    }
}

fn closed(e: impl std::fmt::Display) -> TransportError {
    TransportError::Closed {
        message: e.to_string(),
    }
}
