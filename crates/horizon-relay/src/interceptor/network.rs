//! Dispatching requests to the HTTP and WebSocket engines.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;

use horizon_relay_core::logging::targets;

use super::chain::{Chain, Interceptor};
use super::event::{EventSink, FetchSourceType, InterceptorResponse};
use super::request::InterceptorRequest;
use crate::error::{RelayError, Result};
use crate::graphql::subscription::{SUBPROTOCOL, run_subscription};
use crate::graphql::{IncrementalMerger, OperationType, SubscriptionConfig, compose_http_request};
use crate::http::{HttpEngine, check_status};
use crate::websocket::WebSocketEngine;

struct NetworkInner {
    server_url: String,
    http_engine: Arc<dyn HttpEngine>,
    websocket: Option<(Arc<dyn WebSocketEngine>, String)>,
    subscription_config: SubscriptionConfig,
}

/// The tail of every chain: sends the request over the network.
///
/// Queries and mutations go through the HTTP engine. Multipart responses are
/// merged payload by payload and every snapshot is emitted as a response.
/// Subscriptions use the WebSocket engine and the graphql-transport-ws
/// protocol when one is configured, and fall back to HTTP otherwise.
///
/// A request with `fetch_from_cache` set fails with
/// [`RelayError::CacheMiss`]; without a cache interceptor there is nothing
/// to read from.
#[derive(Clone)]
pub struct NetworkInterceptor {
    inner: Arc<NetworkInner>,
}

impl NetworkInterceptor {
    /// Create an interceptor sending HTTP requests to `server_url`.
    pub fn new(server_url: impl Into<String>, http_engine: Arc<dyn HttpEngine>) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                server_url: server_url.into(),
                http_engine,
                websocket: None,
                subscription_config: SubscriptionConfig::default(),
            }),
        }
    }

    /// Run subscriptions over WebSocket connections to `url`.
    pub fn with_websocket(
        self,
        engine: Arc<dyn WebSocketEngine>,
        url: impl Into<String>,
        config: SubscriptionConfig,
    ) -> Self {
        let inner = NetworkInner {
            server_url: self.inner.server_url.clone(),
            http_engine: self.inner.http_engine.clone(),
            websocket: Some((engine, url.into())),
            subscription_config: config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Get the HTTP server URL.
    pub fn server_url(&self) -> &str {
        &self.inner.server_url
    }
}

impl Interceptor for NetworkInterceptor {
    fn intercept(
        &self,
        request: InterceptorRequest,
        _chain: Chain,
        sink: EventSink,
    ) -> BoxFuture<'static, ()> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if request.fetch_from_cache() {
                let key = request.operation().cache_key();
                let _ = sink.fail(RelayError::CacheMiss(key));
                return;
            }
            if sink.fetch(FetchSourceType::Network).is_err() {
                return;
            }

            let result = match &inner.websocket {
                Some((engine, url)) if request.operation().kind() == OperationType::Subscription => {
                    subscribe(&inner, engine.as_ref(), url, &request, &sink).await
                }
                _ => execute_http(&inner, &request, &sink).await,
            };

            if let Err(err) = &result {
                tracing::debug!(
                    target: targets::HTTP,
                    request_id = %request.request_id(),
                    error = %err,
                    "Network leg failed"
                );
            }
            let _ = sink.finish_with(result);
        })
    }

    fn dispose(&self) {
        self.inner.http_engine.dispose();
        if let Some((engine, _)) = &self.inner.websocket {
            engine.dispose();
        }
    }
}

impl fmt::Debug for NetworkInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkInterceptor")
            .field("server_url", &self.inner.server_url)
            .field(
                "websocket_url",
                &self.inner.websocket.as_ref().map(|(_, url)| url),
            )
            .finish()
    }
}

async fn execute_http(inner: &NetworkInner, request: &InterceptorRequest, sink: &EventSink) -> Result<()> {
    let operation = request.operation();
    let http_request = compose_http_request(
        operation.as_ref(),
        &inner.server_url,
        request.http_method(),
        request.headers(),
    )?;

    let mut response = inner.http_engine.execute(http_request).await?;
    let status = response.status_code();

    if !response.is_success() {
        let message = match response.into_body() {
            Some(body) => body.text().await.ok().filter(|text| !text.is_empty()),
            None => None,
        };
        return check_status(status, message);
    }

    if response.is_multipart() {
        let mut parts = response.take_parts()?;
        let mut merger = IncrementalMerger::new();
        while let Some(part) = parts.next_part().await {
            let payload = part?.into_body().bytes().await?;
            let decoded = operation.decode(&payload)?;
            if let Some(snapshot) = merger.merge(decoded) {
                sink.response(InterceptorResponse::from_network(snapshot, Some(status)))?;
            }
        }
        return Ok(());
    }

    let payload = match response.into_body() {
        Some(body) => body.bytes().await?,
        None => Bytes::new(),
    };
    let decoded = operation.decode(&payload)?;
    sink.response(InterceptorResponse::from_network(decoded, Some(status)))
}

async fn subscribe(
    inner: &NetworkInner,
    engine: &dyn WebSocketEngine,
    url: &str,
    request: &InterceptorRequest,
    sink: &EventSink,
) -> Result<()> {
    let mut headers = request.headers().clone();
    if !headers.contains("Sec-WebSocket-Protocol") {
        headers.add("Sec-WebSocket-Protocol", SUBPROTOCOL);
    }

    let connection = engine.open(url.to_string(), headers).await?;
    let result = run_subscription(
        connection.as_ref(),
        request.operation().as_ref(),
        &inner.subscription_config,
        |response| sink.response(InterceptorResponse::from_network(response, None)),
    )
    .await;
    connection.close();
    result
}
