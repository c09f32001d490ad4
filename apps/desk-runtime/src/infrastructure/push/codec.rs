//! Feed Frame Codec
//!
//! Decodes JSON frames from the push endpoint, and bodies from the polling
//! endpoint, into [`FeedEvent`]s. A frame is an object tagged by `type`, or
//! an array of such objects:
//!
//! ```json
//! [{"type":"ticker","product_id":"BTC-USD","price":"64012.5","open_24h":"63000","time":"2025-01-06T14:30:00Z"}]
//! ```
//!
//! Poll bodies use the same frames, or an untagged envelope carrying
//! `quotes` and/or `notifications` arrays.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::domain::alerts::decimal_from_value;
use crate::domain::feed::{ActivityNotification, FeedEvent, SubscriptionKey, Topic};
use crate::domain::quote::{Quote, normalize_symbol};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown frame type.
    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    /// The frame has the wrong shape.
    #[error("invalid frame: {0}")]
    InvalidFormat(String),

    /// The server reported an error.
    #[error("server error: {0}")]
    Server(String),
}

/// Subscribe request sent after the socket opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Topic to stream.
    pub topic: Topic,
    /// Product ids, empty for unkeyed topics.
    pub product_ids: Vec<String>,
    /// Channels to join.
    pub channels: Vec<&'static str>,
}

impl SubscribeRequest {
    /// Subscribe to `topic` with `key`, including server heartbeats.
    #[must_use]
    pub fn new(topic: Topic, key: &SubscriptionKey) -> Self {
        let data_channel = match topic {
            Topic::CryptoTicker => "ticker",
            Topic::Activity => "notifications",
        };
        Self {
            kind: "subscribe",
            topic,
            product_ids: key.ids().map(str::to_string).collect(),
            channels: vec![data_channel, "heartbeat"],
        }
    }

    /// Serialize to a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JSON codec for feed frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// Acknowledgements decode to no events.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, unknown frame types, or server
    /// error frames.
    pub fn decode(&self, text: &str) -> Result<Vec<FeedEvent>, CodecError> {
        let trimmed = text.trim();
        if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {}",
                trimmed.chars().take(50).collect::<String>()
            )));
        }
        self.decode_value(serde_json::from_str(trimmed)?)
    }

    /// Decode an already-parsed frame or poll body.
    ///
    /// # Errors
    ///
    /// See [`FeedCodec::decode`].
    pub fn decode_value(&self, value: Value) -> Result<Vec<FeedEvent>, CodecError> {
        if value.get("type").is_some() {
            return decode_frame(value);
        }
        match value {
            Value::Array(frames) => {
                let mut events = Vec::with_capacity(frames.len());
                for frame in frames {
                    events.extend(self.decode_value(frame)?);
                }
                Ok(events)
            }
            Value::Object(_) => decode_envelope(&value),
            other => Err(CodecError::InvalidFormat(format!("unexpected JSON value: {other}"))),
        }
    }
}

/// One `type`-tagged frame.
fn decode_frame(frame: Value) -> Result<Vec<FeedEvent>, CodecError> {
    let kind = frame
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match kind.as_str() {
        "ticker" => Ok(vec![FeedEvent::Quotes(vec![decode_ticker(&frame)?])]),
        "quotes" => decode_envelope(&frame),
        "notification" => {
            let notification: ActivityNotification = serde_json::from_value(frame)?;
            Ok(vec![FeedEvent::Activity(notification)])
        }
        "heartbeat" => Ok(vec![FeedEvent::Heartbeat]),
        "subscriptions" => Ok(Vec::new()),
        "error" => {
            let message = frame
                .get("message")
                .or_else(|| frame.get("reason"))
                .and_then(Value::as_str)
                .unwrap_or("unspecified error");
            Err(CodecError::Server(message.to_string()))
        }
        other => Err(CodecError::UnknownFrameType(other.to_string())),
    }
}

/// A `ticker` frame as one quote. The session change is derived from the
/// 24h open when the frame carries one.
fn decode_ticker(frame: &Value) -> Result<Quote, CodecError> {
    let symbol = frame
        .get("product_id")
        .or_else(|| frame.get("symbol"))
        .and_then(Value::as_str)
        .and_then(normalize_symbol)
        .ok_or_else(|| CodecError::InvalidFormat("ticker without product_id".to_string()))?;
    let price = frame
        .get("price")
        .and_then(decimal_from_value)
        .ok_or_else(|| CodecError::InvalidFormat(format!("ticker {symbol} without price")))?;
    let timestamp = frame
        .get("time")
        .and_then(Value::as_str)
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map_or_else(Utc::now, |t| t.with_timezone(&Utc));

    let change_pct = frame
        .get("open_24h")
        .and_then(decimal_from_value)
        .filter(|open| !open.is_zero())
        .map(|open| ((price - open) / open * Decimal::ONE_HUNDRED).round_dp(4));

    Ok(Quote {
        symbol,
        price,
        change_pct,
        volume: frame.get("volume_24h").and_then(decimal_from_value),
        timestamp,
    })
}

/// An untagged poll body: `{"quotes":[...], "notifications":[...]}`.
fn decode_envelope(body: &Value) -> Result<Vec<FeedEvent>, CodecError> {
    let quotes = body.get("quotes").and_then(Value::as_array);
    let notifications = body.get("notifications").and_then(Value::as_array);
    if quotes.is_none() && notifications.is_none() {
        return Err(CodecError::InvalidFormat(
            "expected quotes or notifications".to_string(),
        ));
    }

    let mut events = Vec::new();
    if let Some(quotes) = quotes {
        let decoded = quotes
            .iter()
            .map(|q| serde_json::from_value::<Quote>(q.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        if !decoded.is_empty() {
            events.push(FeedEvent::Quotes(decoded));
        }
    }
    for notification in notifications.into_iter().flatten() {
        events.push(FeedEvent::Activity(serde_json::from_value(
            notification.clone(),
        )?));
    }
    Ok(events)
}
