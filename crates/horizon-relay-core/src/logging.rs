//! Tracing targets and span names.
//!
//! Horizon Relay uses the `tracing` crate for instrumentation and never
//! installs a subscriber itself. To see logs, install one in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_relay::multipart=trace,horizon_relay=debug")
//!     .init();
//! ```

/// Span names used throughout Horizon Relay.
pub mod span_names {
    /// One traversal of an interceptor chain.
    pub const TRAVERSAL: &str = "horizon_relay::traversal";
    /// One HTTP engine round trip.
    pub const HTTP_EXECUTE: &str = "horizon_relay::http_execute";
    /// One WebSocket session.
    pub const WEBSOCKET_SESSION: &str = "horizon_relay::websocket_session";
}

/// Target names for log filtering.
pub mod targets {
    /// Runtime and dispatcher target.
    pub const RUNTIME: &str = "horizon_relay_core::runtime";
    /// HTTP engine target.
    pub const HTTP: &str = "horizon_relay::http";
    /// Multipart decoder target.
    pub const MULTIPART: &str = "horizon_relay::multipart";
    /// Response body lifecycle target.
    pub const BODY: &str = "horizon_relay::body";
    /// WebSocket engine target.
    pub const WEBSOCKET: &str = "horizon_relay::websocket";
    /// Interceptor chain target.
    pub const CHAIN: &str = "horizon_relay::chain";
    /// Cache interceptor target.
    pub const CACHE: &str = "horizon_relay::cache";
    /// Fetch policy target.
    pub const FETCHER: &str = "horizon_relay::fetcher";
    /// Client facade target.
    pub const CLIENT: &str = "horizon_relay::client";
    /// GraphQL subscription protocol target.
    pub const SUBSCRIPTION: &str = "horizon_relay::subscription";
}
