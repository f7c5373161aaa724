//! Delivery transports.
//!
//! A [`Transport`] performs exactly one network request and reports what the
//! wire said — it does not retry, classify, or interpret the response body.
//! Failure policy lives in the dispatcher.
//!
//! Two HTTP variants exist, selected by the caller at construction:
//!
//! - [`HttpTransport::direct`] — POST straight to the collector.
//! - [`HttpTransport::proxied`] — route through a local HTTP proxy, for
//!   sandboxed runtimes whose webview cannot reach the collector directly.
//!
//! Teardown-time delivery uses [`send_detached`]: the request is spawned and
//! its outcome ignored, the closest analogue of a keepalive fetch when no
//! further opportunity to retry exists.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::errors::TransportError;
use crate::record::EventRecord;

/// Request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// API key header name.
const API_KEY_HEADER: &str = "X-API-Key";

/// One delivery request: endpoint, credentials, and the batch to send.
#[derive(Clone, Copy, Debug)]
pub struct TrackRequest<'a> {
    /// Collector URL.
    pub endpoint: &'a str,
    /// API key, sent as `X-API-Key`.
    pub api_key: &'a str,
    /// Records to deliver, in order.
    pub events: &'a [EventRecord],
}

/// What the collector answered. The body is opaque to the pipeline.
#[derive(Clone, Debug)]
pub struct SendReceipt {
    /// HTTP status code.
    pub status: u16,
    /// Response body decoded as JSON, or `Null` when not decodable.
    pub body: Value,
}

/// A delivery mechanism for event batches.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one POST of the batch and return the collector's answer.
    ///
    /// Errors represent transport-level failures (connect, timeout, reset);
    /// HTTP error statuses are returned in the receipt, not as `Err`.
    async fn send(&self, request: TrackRequest<'_>) -> Result<SendReceipt, TransportError>;
}

/// Wire payload: `{"events": [...]}`.
#[derive(Serialize)]
struct TrackPayload<'a> {
    events: &'a [EventRecord],
}

/// reqwest-backed transport, direct or proxied.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Transport that posts directly to the collector.
    pub fn direct() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { client })
    }

    /// Transport that routes every request through `proxy_url`.
    pub fn proxied(proxy_url: &str) -> Result<Self, TransportError> {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(TransportError::Proxy)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .proxy(proxy)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TrackRequest<'_>) -> Result<SendReceipt, TransportError> {
        let response = self
            .client
            .post(request.endpoint)
            .header(API_KEY_HEADER, request.api_key)
            .json(&TrackPayload {
                events: request.events,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        // Delivery is judged by status; an undecodable body on success is
        // still success.
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok(SendReceipt { status, body })
    }
}

/// Fire-and-forget delivery for teardown paths.
///
/// Spawns the send and ignores its outcome — no retry, no verification.
/// Used when the host is about to terminate and an ordinary flush (with its
/// retry machinery) would never get to run.
pub fn send_detached(
    transport: &Arc<dyn Transport>,
    endpoint: String,
    api_key: String,
    events: Vec<EventRecord>,
) {
    if events.is_empty() {
        return;
    }
    let transport = Arc::clone(transport);
    drop(tokio::spawn(async move {
        let request = TrackRequest {
            endpoint: &endpoint,
            api_key: &api_key,
            events: &events,
        };
        if let Err(error) = transport.send(request).await {
            tracing::debug!(%error, "detached teardown send failed");
        }
    }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
