//! WebSocket engines.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

use horizon_relay_core::logging::targets;

use super::connection::{TungsteniteConnection, WebSocketConnection};
use crate::error::{NetworkErrorKind, RelayError, Result};
use crate::http::Headers;

/// Rewrite an HTTP(S) URL to its WebSocket equivalent.
///
/// `http` becomes `ws` and `https` becomes `wss`; `ws` and `wss` pass
/// through. Any other scheme fails with [`RelayError::UnsupportedScheme`].
pub fn normalize_ws_url(url: &str) -> Result<String> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| RelayError::InvalidUrl(format!("missing scheme in '{url}'")))?;
    let mapped = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(RelayError::UnsupportedScheme(scheme.to_string())),
    };
    Ok(format!("{mapped}://{rest}"))
}

/// Opens WebSocket connections.
pub trait WebSocketEngine: Send + Sync {
    /// Open a connection to `url` with the given handshake headers.
    ///
    /// HTTP(S) URLs are mapped with [`normalize_ws_url`].
    fn open(
        &self,
        url: String,
        headers: Headers,
    ) -> BoxFuture<'_, Result<Box<dyn WebSocketConnection>>>;

    /// Release engine resources. Called once when the owning client is
    /// disposed.
    fn dispose(&self) {}
}

/// Configuration for [`DefaultWebSocketEngine`].
#[derive(Clone, Debug)]
pub struct WebSocketEngineConfig {
    /// Handshake timeout.
    pub connect_timeout: Option<Duration>,
    /// How long a graceful close may take before the socket is dropped.
    pub close_timeout: Duration,
}

impl Default for WebSocketEngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(30)),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl WebSocketEngineConfig {
    /// Set the handshake timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Disable the handshake timeout.
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect_timeout = None;
        self
    }

    /// Set the graceful close timeout.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

/// The default engine, backed by `tokio-tungstenite`.
#[derive(Clone, Debug, Default)]
pub struct DefaultWebSocketEngine {
    config: WebSocketEngineConfig,
}

impl DefaultWebSocketEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: WebSocketEngineConfig) -> Self {
        Self { config }
    }

    /// Get the engine's configuration.
    pub fn config(&self) -> &WebSocketEngineConfig {
        &self.config
    }

    async fn connect(&self, url: String, headers: Headers) -> Result<Box<dyn WebSocketConnection>> {
        let url = normalize_ws_url(&url)?;
        let mut request = url.as_str().into_client_request()?;

        let handshake_headers = request.headers_mut();
        for header in &headers {
            let name = HeaderName::try_from(header.name.as_str())
                .map_err(|e| RelayError::InvalidHeader(e.to_string()))?;
            let value = HeaderValue::try_from(header.value.as_str())
                .map_err(|e| RelayError::InvalidHeader(e.to_string()))?;
            handshake_headers.append(name, value);
        }

        let connect = tokio_tungstenite::connect_async(request);
        let (stream, _response) = match self.config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect).await.map_err(|_| {
                RelayError::network(NetworkErrorKind::Timeout, "WebSocket handshake timed out")
            })??,
            None => connect.await?,
        };

        tracing::debug!(target: targets::WEBSOCKET, url = %url, "WebSocket connection opened");

        Ok(Box::new(TungsteniteConnection::start(
            url,
            stream,
            self.config.close_timeout,
        )))
    }
}

impl WebSocketEngine for DefaultWebSocketEngine {
    fn open(
        &self,
        url: String,
        headers: Headers,
    ) -> BoxFuture<'_, Result<Box<dyn WebSocketConnection>>> {
        Box::pin(self.connect(url, headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_mapping() {
        assert_eq!(normalize_ws_url("http://host").unwrap(), "ws://host");
        assert_eq!(normalize_ws_url("https://host/graphql").unwrap(), "wss://host/graphql");
        assert_eq!(normalize_ws_url("ws://host").unwrap(), "ws://host");
        assert_eq!(normalize_ws_url("wss://host").unwrap(), "wss://host");
        assert_eq!(normalize_ws_url("HTTPS://host").unwrap(), "wss://host");
    }

    #[test]
    fn test_unsupported_scheme() {
        assert_eq!(
            normalize_ws_url("socks://host"),
            Err(RelayError::UnsupportedScheme("socks".into()))
        );
        assert!(matches!(
            normalize_ws_url("host-only"),
            Err(RelayError::InvalidUrl(_))
        ));
    }
}
