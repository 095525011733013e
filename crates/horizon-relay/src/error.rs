//! Error types for the transport core.

use std::fmt;

/// Broad classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// The request could not be sent or the response could not be read.
    Request,
    /// Connection refused or failed.
    Connection,
    /// The operation timed out.
    Timeout,
    /// Low-level I/O failure.
    Io,
    /// TLS handshake or certificate failure.
    Tls,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Connection => write!(f, "connection"),
            Self::Timeout => write!(f, "timeout"),
            Self::Io => write!(f, "I/O"),
            Self::Tls => write!(f, "TLS"),
        }
    }
}

/// Errors produced by engines, decoders, interceptors and fetch policies.
///
/// Errors are cloneable so a single failure can be delivered to every
/// observer of a traversal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RelayError {
    /// Invalid builder or chain configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport failure.
    #[error("Network {kind} error: {message}")]
    Network {
        /// What kind of transport failure occurred.
        kind: NetworkErrorKind,
        /// Description from the underlying transport.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status}{}", status_suffix(.message))]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Optional error message from the response body.
        message: Option<String>,
    },

    /// Multipart framing violation.
    #[error("Malformed multipart response: {0}")]
    MalformedMultipart(String),

    /// URL scheme that no engine can serve.
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Use of a WebSocket connection after it closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A single-consumption stream was consumed a second time.
    #[error("{0} was already consumed")]
    AlreadyConsumed(&'static str),

    /// A body was closed twice or read after close.
    #[error("Body is already closed")]
    AlreadyClosed,

    /// The traversal was cancelled.
    #[error("Operation was cancelled")]
    Cancelled,

    /// Response payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The cache holds no record for the requested key.
    #[error("Cache miss for key '{0}'")]
    CacheMiss(String),

    /// Cache storage fault other than a miss.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// WebSocket protocol failure.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// An interceptor broke the event protocol.
    #[error("Interceptor protocol violation: {0}")]
    Protocol(String),

    /// The server reported an operation error.
    #[error("GraphQL error: {0}")]
    GraphQL(String),
}

fn status_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl RelayError {
    /// Create a network error of the given kind.
    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: message.into(),
        }
    }

    /// Check if a policy above the transport may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Check if this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is the distinguished cache-miss condition.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::CacheMiss(_))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if err.is_connect() {
            NetworkErrorKind::Connection
        } else {
            NetworkErrorKind::Request
        };
        Self::network(kind, err.to_string())
    }
}

impl From<url::ParseError> for RelayError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::network(NetworkErrorKind::Io, err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for RelayError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for RelayError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::ConnectionClosed,
            WsError::Io(io) => Self::network(NetworkErrorKind::Io, io.to_string()),
            WsError::Url(url) => Self::InvalidUrl(url.to_string()),
            other => Self::WebSocket(other.to_string()),
        }
    }
}

/// A specialized Result type for transport operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let err = RelayError::HttpStatus {
            status: 503,
            message: Some("Service Unavailable".into()),
        };
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");

        let err = RelayError::HttpStatus {
            status: 404,
            message: None,
        };
        assert_eq!(err.to_string(), "HTTP 404");
    }

    #[test]
    fn test_classification() {
        assert!(RelayError::network(NetworkErrorKind::Timeout, "slow").is_retryable());
        assert!(!RelayError::Cancelled.is_retryable());
        assert!(RelayError::Cancelled.is_cancelled());
        assert!(RelayError::CacheMiss("Query".into()).is_cache_miss());
        assert!(!RelayError::Cache("disk full".into()).is_cache_miss());
    }

    #[test]
    fn test_io_error_is_network() {
        let err: RelayError = std::io::Error::other("broken pipe").into();
        assert!(matches!(
            err,
            RelayError::Network {
                kind: NetworkErrorKind::Io,
                ..
            }
        ));
    }
}
