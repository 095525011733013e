//! HTTP engines.
//!
//! An [`HttpEngine`] executes one request and returns one response. It does
//! not retry; retry policy belongs to interceptors above it. Engines are
//! chosen at startup by handing an `Arc<dyn HttpEngine>` to the client.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use horizon_relay::http::{DefaultHttpEngine, HttpEngine, HttpEngineConfig};
//!
//! let engine = DefaultHttpEngine::new(
//!     HttpEngineConfig::default()
//!         .timeout(Duration::from_secs(60))
//!         .user_agent("MyApp/1.0"),
//! )?;
//!
//! let response = engine.execute(request).await?;
//! if response.is_multipart() {
//!     let mut parts = response.take_parts()?;
//!     while let Some(part) = parts.next_part().await {
//!         println!("{}", part?.into_body().text().await?);
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use reqwest::redirect::Policy;
use tracing::Instrument;

use horizon_relay_core::logging::{span_names, targets};

use super::body::ContentLength;
use super::header::Headers;
use super::request::HttpRequest;
use super::response::{HttpResponse, HttpResponseBuilder};
use super::source::ResponseBody;
use crate::error::{NetworkErrorKind, RelayError, Result};

/// Executes HTTP requests.
pub trait HttpEngine: Send + Sync {
    /// Send `request` and wait for the response headers.
    ///
    /// Dropping the returned future aborts the request.
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;

    /// Release engine resources. Called once when the owning client is
    /// disposed.
    fn dispose(&self) {}
}

/// Configuration for [`DefaultHttpEngine`].
#[derive(Clone, Debug)]
pub struct HttpEngineConfig {
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Maximum number of redirects to follow. Zero disables redirects.
    pub max_redirects: usize,
    /// Default user agent.
    pub user_agent: Option<String>,
    /// Buffer response bodies in memory instead of streaming them.
    pub materialize_bodies: bool,
}

impl Default for HttpEngineConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(60)),
            connect_timeout: Some(Duration::from_secs(10)),
            max_redirects: 10,
            user_agent: Some(format!("HorizonRelay/{} (Rust)", env!("CARGO_PKG_VERSION"))),
            materialize_bodies: false,
        }
    }
}

impl HttpEngineConfig {
    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the request timeout.
    ///
    /// Long-lived multipart responses need this.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Buffer every response body before returning the response.
    pub fn materialize_bodies(mut self, materialize: bool) -> Self {
        self.materialize_bodies = materialize;
        self
    }
}

/// The default engine, backed by `reqwest`.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct DefaultHttpEngine {
    client: reqwest::Client,
    config: HttpEngineConfig,
    disposed: Arc<AtomicBool>,
}

impl DefaultHttpEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: HttpEngineConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        builder = if config.max_redirects == 0 {
            builder.redirect(Policy::none())
        } else {
            builder.redirect(Policy::limited(config.max_redirects))
        };

        if let Some(ref ua) = config.user_agent {
            builder = builder.user_agent(ua);
        }

        let client = builder
            .build()
            .map_err(|e| RelayError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            disposed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get the engine's configuration.
    pub fn config(&self) -> &HttpEngineConfig {
        &self.config
    }

    /// Check if [`HttpEngine::dispose`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        if self.is_disposed() {
            return Err(disposed());
        }

        let mut builder = self
            .client
            .request(request.method().to_reqwest(), request.url());

        for header in request.headers() {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }

        if let Some(body) = request.body() {
            if !request.headers().contains("Content-Type") {
                builder = builder.header(http::header::CONTENT_TYPE, body.content_type());
            }
            // Content-Length is derived from the buffered bytes.
            let bytes = body.to_bytes()?;
            builder = builder.body(bytes);
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers = Headers::from_header_map(response.headers());
        let content_length = ContentLength::from(response.content_length());

        tracing::debug!(
            target: targets::HTTP,
            status,
            content_type = headers.content_type().unwrap_or_default(),
            %content_length,
            "Received response headers"
        );

        let body = if self.config.materialize_bodies {
            ResponseBody::from_bytes(response.bytes().await?)
        } else {
            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(RelayError::from))
                .boxed();
            ResponseBody::from_stream(stream, content_length)
        };

        HttpResponseBuilder::new(status)
            .headers(headers)
            .body(body)
            .build_detecting_parts()
    }
}

impl HttpEngine for DefaultHttpEngine {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        let span = tracing::debug_span!(
            target: targets::HTTP,
            span_names::HTTP_EXECUTE,
            method = %request.method(),
            url = request.url()
        );
        Box::pin(
            async move {
                self.send(request).await.inspect_err(|err| {
                    tracing::debug!(target: targets::HTTP, error = %err, "Request failed");
                })
            }
            .instrument(span),
        )
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            tracing::debug!(target: targets::HTTP, "HTTP engine disposed");
        }
    }
}

impl fmt::Debug for DefaultHttpEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultHttpEngine")
            .field("config", &self.config)
            .finish()
    }
}

/// Map a status code to an error when it is not a success.
pub(crate) fn check_status(status: u16, message: Option<String>) -> Result<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(RelayError::HttpStatus { status, message })
    }
}

fn disposed() -> RelayError {
    RelayError::network(NetworkErrorKind::Connection, "engine has been disposed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = HttpEngineConfig::default()
            .timeout(Duration::from_secs(5))
            .max_redirects(0)
            .user_agent("relay-test")
            .materialize_bodies(true);

        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.max_redirects, 0);
        assert_eq!(config.user_agent.as_deref(), Some("relay-test"));
        assert!(config.materialize_bodies);
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(204, None).is_ok());
        assert_eq!(
            check_status(500, Some("boom".into())),
            Err(RelayError::HttpStatus {
                status: 500,
                message: Some("boom".into())
            })
        );
    }
}
