//! WebSocket engine and connections.
//!
//! # Example
//!
//! ```ignore
//! use horizon_relay::http::Headers;
//! use horizon_relay::websocket::{DefaultWebSocketEngine, WebSocketEngine, WebSocketMessage};
//!
//! let engine = DefaultWebSocketEngine::default();
//!
//! // http(s) URLs are mapped to ws(s)
//! let connection = engine.open("https://api.example.com/graphql".into(), Headers::new()).await?;
//!
//! connection.send(WebSocketMessage::Text(r#"{"type":"connection_init"}"#.into()))?;
//! let reply = connection.receive().await?;
//! connection.close();
//! ```

mod connection;
mod engine;
mod message;

pub use connection::WebSocketConnection;
pub use engine::{DefaultWebSocketEngine, WebSocketEngine, WebSocketEngineConfig, normalize_ws_url};
pub use message::{CloseCode, CloseReason, ConnectionState, WebSocketMessage};
