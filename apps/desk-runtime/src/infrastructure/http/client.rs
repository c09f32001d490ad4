//! Desk API Client
//!
//! One `reqwest` client behind every HTTP-backed port: panel reads, focus
//! context, feed polling, and the profile endpoint. Every request carries
//! the configured client timeout. Non-success responses surface the
//! server's own `error` or `message` field.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::application::ports::{
    ContextFetcher, FeedPoller, FetchError, PanelFetcher, ProfileApi, ProfileSnapshot, QueryParams,
};
use crate::domain::feed::{FeedEvent, SubscriptionKey, Topic};
use crate::domain::focus::FocusFamily;
use crate::domain::preferences::Preferences;
use crate::infrastructure::config::{ApiSettings, SessionToken};
use crate::infrastructure::push::FeedCodec;

/// Profile endpoint path.
const PROFILE_PATH: &str = "/api/profile";

/// HTTP client for the desk API.
#[derive(Debug, Clone)]
pub struct DeskApiClient {
    client: Client,
    base_url: String,
    session_token: Option<SessionToken>,
    codec: FeedCodec,
}

impl DeskApiClient {
    /// Create a client from the API settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn new(settings: &ApiSettings) -> Result<Self, FetchError> {
        Self::with_timeout(
            &settings.base_url,
            settings.timeout,
            settings.session_token.clone(),
        )
    }

    /// Create a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn with_timeout(
        base_url: &str,
        timeout: Duration,
        session_token: Option<SessionToken>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token,
            codec: FeedCodec::new(),
        })
    }

    /// `GET` a path and decode its JSON body.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] for transport failures, non-success
    /// statuses, and undecodable bodies.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, FetchError> {
        let request = self.client.get(self.url(path)).query(query);
        self.send(request).await
    }

    /// `PUT` a JSON body to a path.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] for transport failures and non-success
    /// statuses.
    pub async fn put_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), FetchError> {
        let request = self.client.put(self.url(path)).json(body);
        let _: Value = self.send(request).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, FetchError> {
        let request = match &self.session_token {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let text = response.text().await.map_err(transport_error)?;
        if text.trim().is_empty() {
            return serde_json::from_str("null").map_err(decode_error);
        }
        serde_json::from_str(&text).map_err(decode_error)
    }
}

fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_decode() {
        decode_error(e)
    } else {
        FetchError::Network {
            message: e.to_string(),
        }
    }
}

fn decode_error(e: impl std::fmt::Display) -> FetchError {
    FetchError::Decode {
        message: e.to_string(),
    }
}

async fn status_error(status: StatusCode, response: Response) -> FetchError {
    let body = response.text().await.unwrap_or_default();
    FetchError::Status {
        status: status.as_u16(),
        message: error_message(status, &body),
    }
}

/// Human-readable message for an error body.
///
/// Prefers the body's `error` field, then `message`, then the status text.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "message"]
                .iter()
                .find_map(|field| value.get(field).and_then(Value::as_str).map(str::to_string))
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "request failed with status {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
            .trim_end()
            .to_string()
        })
}

#[async_trait]
impl PanelFetcher for DeskApiClient {
    async fn fetch_json(&self, path: &str, query: &QueryParams) -> Result<Value, FetchError> {
        self.get_json(path, query).await
    }
}

#[async_trait]
impl ContextFetcher for DeskApiClient {
    async fn fetch_context(&self, family: FocusFamily, target: &str) -> Result<Value, FetchError> {
        let (path, param) = match family {
            FocusFamily::HeatmapSymbol => ("/api/relationships", "symbol"),
            FocusFamily::Sector => ("/api/sectors", "focus"),
        };
        self.get_json(path, &[(param.to_string(), target.to_string())])
            .await
    }
}

#[async_trait]
impl FeedPoller for DeskApiClient {
    async fn poll(&self, topic: Topic, key: &SubscriptionKey) -> Result<Vec<FeedEvent>, FetchError> {
        let query = if key.is_empty() {
            Vec::new()
        } else {
            vec![("ids".to_string(), key.joined())]
        };
        let body: Value = self
            .get_json(&format!("/api/feed/{}", topic.as_str()), &query)
            .await?;
        self.codec.decode_value(body).map_err(decode_error)
    }
}

#[async_trait]
impl ProfileApi for DeskApiClient {
    async fn fetch_profile(&self) -> Result<ProfileSnapshot, FetchError> {
        self.get_json(PROFILE_PATH, &[]).await
    }

    async fn save_preferences(&self, preferences: &Preferences) -> Result<(), FetchError> {
        self.put_json(PROFILE_PATH, &serde_json::json!({ "preferences": preferences }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::extract::Query;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use parking_lot::Mutex;
    use serde_json::json;
    use test_case::test_case;
    use tokio::net::TcpListener;

    use super::*;

    #[test_case(r#"{"error":"symbol not found"}"#, "symbol not found" ; "error field")]
    #[test_case(r#"{"message":"rate limited"}"#, "rate limited" ; "message field")]
    #[test_case(r#"{"error":"  "}"#, "request failed with status 404 Not Found" ; "blank error")]
    #[test_case("<html>oops</html>", "request failed with status 404 Not Found" ; "not json")]
    fn error_message_prefers_server_text(body: &str, expected: &str) {
        assert_eq!(error_message(StatusCode::NOT_FOUND, body), expected);
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{addr}")
    }

    fn client(base_url: &str, timeout: Duration) -> DeskApiClient {
        DeskApiClient::with_timeout(base_url, timeout, None).unwrap()
    }

    #[tokio::test]
    async fn panel_fetch_sends_query_and_maps_errors() {
        let router = Router::new()
            .route(
                "/api/quotes",
                get(|Query(q): Query<Vec<(String, String)>>| async move { axum::Json(json!({ "query": q })) }),
            )
            .route(
                "/api/news",
                get(|| async { (AxumStatus::BAD_GATEWAY, axum::Json(json!({ "error": "news upstream down" }))) }),
            );
        let api = client(&serve(router).await, Duration::from_secs(2));

        let data = api
            .fetch_json("/api/quotes", &vec![("symbols".to_string(), "AAPL,MSFT".to_string())])
            .await
            .unwrap();
        assert_eq!(data, json!({ "query": [["symbols", "AAPL,MSFT"]] }));

        let err = api.fetch_json("/api/news", &Vec::new()).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Status {
                status: 502,
                message: "news upstream down".to_string(),
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let router = Router::new().route(
            "/api/calendar",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                axum::Json(json!([]))
            }),
        );
        let api = client(&serve(router).await, Duration::from_millis(50));

        assert_eq!(
            api.fetch_json("/api/calendar", &Vec::new()).await,
            Err(FetchError::Timeout)
        );
    }

    #[tokio::test]
    async fn poll_decodes_feed_body() {
        let router = Router::new().route(
            "/api/feed/crypto-ticker",
            get(|| async {
                axum::Json(json!({
                    "quotes": [{ "symbol": "BTC-USD", "price": "64000", "timestamp": "2025-01-06T14:30:00Z" }]
                }))
            }),
        );
        let api = client(&serve(router).await, Duration::from_secs(2));

        let events = api
            .poll(Topic::CryptoTicker, &SubscriptionKey::new(["BTC-USD"]))
            .await
            .unwrap();

        assert!(matches!(&events[..], [FeedEvent::Quotes(q)] if q[0].symbol == "BTC-USD"));
    }

    #[tokio::test]
    async fn profile_round_trip() {
        let saved = Arc::new(Mutex::new(None::<Value>));
        let sink = Arc::clone(&saved);
        let router = Router::new().route(
            PROFILE_PATH,
            get(|| async {
                axum::Json(json!({
                    "preferences": { "detailSymbol": "NVDA" },
                    "userCount": 12,
                    "sessionCount": 3
                }))
            })
            .put(move |axum::Json(body): axum::Json<Value>| async move {
                *sink.lock() = Some(body);
                AxumStatus::NO_CONTENT
            }),
        );
        let api = client(&serve(router).await, Duration::from_secs(2));

        let profile = api.fetch_profile().await.unwrap();
        assert_eq!(profile.user_count, Some(12));
        assert_eq!(profile.preferences, Some(json!({ "detailSymbol": "NVDA" })));

        let universe = crate::domain::panel::PanelUniverse::standard();
        api.save_preferences(&Preferences::defaults(&universe))
            .await
            .unwrap();
        let body = saved.lock().clone().unwrap();
        assert_eq!(body["preferences"]["detailSymbol"], "SPY");
    }
}
