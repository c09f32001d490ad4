//! Live Feed Integration Tests
//!
//! Push streaming, fallback to polling, degradation, and re-probing, driven
//! through the runtime with a fake push transport and a fake poll endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use desk_runtime::application::ports::{FetchError, TransportError};
use desk_runtime::domain::alerts::AlertDirection;
use desk_runtime::domain::feed::{ActivityNotification, FeedEvent};
use desk_runtime::{DeskConfig, DeskEvent, FeedMode, FeedStatus, HostingTarget, SubscriptionKey, Topic};
use support::{FakePush, TestDesk, eventually, fast_config, quote};

const WAIT: Duration = Duration::from_secs(2);

fn crypto_mode(desk: &TestDesk) -> Option<(FeedMode, FeedStatus)> {
    desk.runtime
        .state()
        .topic_health(Topic::CryptoTicker)
        .map(|h| (h.mode, h.status))
}

#[tokio::test]
async fn push_ticks_reach_the_quote_cache() {
    let desk = TestDesk::new(fast_config(), Some(FakePush::new()));
    desk.runtime.start().await;

    let push = desk.push.clone().unwrap();
    assert_eq!(
        push.opened.lock()[0],
        (Topic::CryptoTicker, SubscriptionKey::new(["BTC-USD", "ETH-USD"]))
    );
    assert_eq!(crypto_mode(&desk), Some((FeedMode::Streaming, FeedStatus::Live)));

    push.socket()
        .send(Ok(FeedEvent::Quotes(vec![quote("BTC-USD", 64_000)])))
        .unwrap();

    let state = Arc::clone(desk.runtime.state());
    assert!(eventually(WAIT, || state.quote("BTC-USD").is_some()).await);
    assert_eq!(state.quote("BTC-USD").unwrap().price, Decimal::from(64_000));
    assert!(state.last_sync().is_some());
    assert_eq!(desk.api.polls_of(Topic::CryptoTicker), 0);

    desk.runtime.shutdown().await;
}

#[tokio::test]
async fn closed_socket_falls_back_and_keeps_cached_quotes() {
    let desk = TestDesk::new(fast_config(), Some(FakePush::new()));
    desk.runtime.start().await;
    let push = desk.push.clone().unwrap();
    let state = Arc::clone(desk.runtime.state());

    push.socket()
        .send(Ok(FeedEvent::Quotes(vec![quote("BTC-USD", 64_000)])))
        .unwrap();
    assert!(eventually(WAIT, || state.quote("BTC-USD").is_some()).await);

    // A malformed frame is skipped; the stream stays up.
    push.socket()
        .send(Err(TransportError::Protocol {
            message: "bad frame".to_string(),
        }))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(crypto_mode(&desk), Some((FeedMode::Streaming, FeedStatus::Live)));

    desk.api
        .queue_poll(Ok(vec![FeedEvent::Quotes(vec![quote("ETH-USD", 3_100)])]));
    push.socket()
        .send(Err(TransportError::Closed {
            message: "server went away".to_string(),
        }))
        .unwrap();

    assert!(eventually(WAIT, || crypto_mode(&desk) == Some((FeedMode::Polling, FeedStatus::Polling))).await);
    assert!(eventually(WAIT, || state.quote("ETH-USD").is_some()).await);
    assert_eq!(state.quote("BTC-USD").unwrap().price, Decimal::from(64_000));
    assert_eq!(state.feed_status(), FeedStatus::Polling);

    desk.runtime.shutdown().await;
}

#[tokio::test]
async fn repeated_poll_failures_degrade_then_recover() {
    let desk = TestDesk::new(fast_config(), Some(FakePush::refusing()));
    for _ in 0..3 {
        desk.api.queue_poll(Err(FetchError::Timeout));
    }
    desk.runtime.start().await;

    assert!(eventually(WAIT, || crypto_mode(&desk) == Some((FeedMode::Polling, FeedStatus::Degraded))).await);
    assert_eq!(desk.runtime.state().feed_status(), FeedStatus::Degraded);

    assert!(eventually(WAIT, || crypto_mode(&desk) == Some((FeedMode::Polling, FeedStatus::Polling))).await);

    desk.runtime.shutdown().await;
}

#[tokio::test]
async fn serverless_hosting_never_opens_push() {
    let mut config = fast_config();
    config.hosting = HostingTarget::Serverless;
    let desk = TestDesk::new(config, Some(FakePush::new()));
    desk.runtime.start().await;

    assert!(eventually(WAIT, || desk.api.polls_of(Topic::CryptoTicker) >= 2).await);
    assert_eq!(desk.push.as_ref().unwrap().open_count(), 0);
    assert_eq!(crypto_mode(&desk), Some((FeedMode::Polling, FeedStatus::Polling)));

    desk.runtime.shutdown().await;
}

#[tokio::test]
async fn re_probe_restores_streaming() {
    let mut config: DeskConfig = fast_config();
    config.feed.push_retry_initial = Duration::from_millis(40);
    config.feed.push_retry_max = Duration::from_millis(40);
    let desk = TestDesk::new(config, Some(FakePush::refusing()));
    desk.runtime.start().await;
    let push = desk.push.clone().unwrap();

    assert_eq!(crypto_mode(&desk), Some((FeedMode::Polling, FeedStatus::Polling)));
    assert!(eventually(WAIT, || push.open_count() >= 2).await);

    *push.refuse.lock() = false;
    assert!(eventually(WAIT, || crypto_mode(&desk) == Some((FeedMode::Streaming, FeedStatus::Live))).await);

    desk.runtime.shutdown().await;
}

#[tokio::test]
async fn leaving_the_crypto_page_stops_the_feed() {
    let mut config = fast_config();
    config.hosting = HostingTarget::Serverless;
    let desk = TestDesk::new(config, None);
    desk.runtime.start().await;
    assert!(eventually(WAIT, || desk.api.polls_of(Topic::CryptoTicker) >= 1).await);

    assert!(desk.runtime.switch_page("markets").await);
    assert_eq!(desk.runtime.feeds().subscription(Topic::CryptoTicker).await, None);

    tokio::time::sleep(Duration::from_millis(30)).await;
    let polls = desk.api.polls_of(Topic::CryptoTicker);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(desk.api.polls_of(Topic::CryptoTicker), polls);

    desk.runtime.shutdown().await;
}

#[tokio::test]
async fn alert_fires_once_per_crossing() {
    let desk = TestDesk::new(fast_config(), Some(FakePush::new()));
    desk.runtime.start().await;
    let mut events = desk.runtime.events().subscribe();

    desk.runtime
        .add_alert("btc-usd", AlertDirection::Above, Decimal::from(65_000))
        .unwrap();

    let socket = desk.push.as_ref().unwrap().socket();
    for price in [64_000, 65_500, 66_000, 64_500, 65_100] {
        socket
            .send(Ok(FeedEvent::Quotes(vec![quote("BTC-USD", price)])))
            .unwrap();
    }

    let mut fired = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        if let DeskEvent::AlertTriggered { trigger } = event {
            fired.push(trigger.price);
        }
    }
    assert_eq!(fired, vec![Decimal::from(65_500), Decimal::from(65_100)]);

    desk.runtime.shutdown().await;
}

#[tokio::test]
async fn activity_streams_only_while_signed_in() {
    let api = support::FakeApi::new();
    *api.profile.lock() = Some(serde_json::json!({ "detailSymbol": "NVDA" }));
    let mut config = fast_config();
    config.api.session_token = Some(desk_runtime::SessionToken::new("token".to_string()));
    let push = FakePush::new();
    let desk = TestDesk::with_parts(
        config,
        api,
        Some(Arc::clone(&push)),
        Arc::new(desk_runtime::MemoryStore::new()),
    );
    desk.runtime.start().await;

    assert_eq!(
        desk.runtime.feeds().subscription(Topic::Activity).await,
        Some(SubscriptionKey::unkeyed())
    );
    let activity_socket = push
        .sockets_for(Topic::Activity)
        .expect("activity socket opened");
    activity_socket
        .send(Ok(FeedEvent::Activity(ActivityNotification {
            id: "n1".to_string(),
            kind: "system".to_string(),
            message: "Welcome back".to_string(),
            created_at: Utc::now(),
        })))
        .unwrap();
    let state = Arc::clone(desk.runtime.state());
    assert!(eventually(WAIT, || state.activity().len() == 1).await);

    desk.runtime.sign_out().await;
    assert_eq!(desk.runtime.feeds().subscription(Topic::Activity).await, None);

    desk.runtime.shutdown().await;
}
