//! GraphQL subscriptions over WebSocket.
//!
//! Implements the client side of the graphql-transport-ws protocol.
//! See: https://github.com/enisdenjo/graphql-ws/blob/master/PROTOCOL.md
//!
//! One subscription runs per connection. The session sends
//! `connection_init`, waits for `connection_ack`, sends `subscribe` and then
//! relays every `next` payload until `complete`, `error`, or the socket
//! closes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use horizon_relay_core::logging::targets;

use super::request::Operation;
use super::response::{GraphQLError, GraphQLResponse};
use crate::error::{NetworkErrorKind, RelayError, Result};
use crate::websocket::{ConnectionState, WebSocketConnection, WebSocketMessage};

/// The WebSocket subprotocol negotiated in the handshake.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

const SUBSCRIPTION_ID: &str = "1";

/// Messages of the graphql-transport-ws protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolMessage {
    /// Client -> Server: Initialize connection
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Server -> Client: Connection acknowledged
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Either direction: Ping
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Either direction: Pong
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Client -> Server: Subscribe to operation
    Subscribe {
        id: String,
        payload: SubscribePayload,
    },
    /// Server -> Client: Operation result
    Next { id: String, payload: Value },
    /// Server -> Client: Operation error
    Error {
        id: String,
        payload: Vec<GraphQLError>,
    },
    /// Either direction: Operation complete
    Complete { id: String },
}

impl ProtocolMessage {
    /// Parse a protocol message from a WebSocket frame.
    pub fn parse(message: &WebSocketMessage) -> Result<Self> {
        serde_json::from_slice(message.as_bytes())
            .map_err(|e| RelayError::Protocol(format!("invalid graphql-transport-ws message: {e}")))
    }

    /// Encode as a text frame.
    pub fn to_message(&self) -> Result<WebSocketMessage> {
        Ok(WebSocketMessage::Text(serde_json::to_string(self)?))
    }
}

/// The payload of a `subscribe` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(
        default,
        rename = "operationName",
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl SubscribePayload {
    /// Build the payload for an operation.
    pub fn from_operation(operation: &dyn Operation) -> Self {
        Self {
            query: operation.document().to_string(),
            variables: operation.variables().cloned(),
            operation_name: Some(operation.name())
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            extensions: operation.extensions().cloned(),
        }
    }
}

/// Configuration for subscription sessions.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Payload sent with `connection_init`.
    pub init_payload: Option<Value>,
    /// How long to wait for `connection_ack`.
    pub ack_timeout: Duration,
    /// Interval between client pings, if any.
    pub keep_alive_interval: Option<Duration>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            init_payload: None,
            ack_timeout: Duration::from_secs(10),
            keep_alive_interval: Some(Duration::from_secs(30)),
        }
    }
}

impl SubscriptionConfig {
    /// Set the `connection_init` payload.
    pub fn init_payload(mut self, payload: Value) -> Self {
        self.init_payload = Some(payload);
        self
    }

    /// Set the `connection_ack` timeout.
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set the keep-alive ping interval.
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    /// Disable keep-alive pings.
    pub fn no_keep_alive(mut self) -> Self {
        self.keep_alive_interval = None;
        self
    }
}

fn send(connection: &dyn WebSocketConnection, message: &ProtocolMessage) -> Result<()> {
    connection.send(message.to_message()?)
}

async fn receive(connection: &dyn WebSocketConnection) -> Result<ProtocolMessage> {
    let message = connection.receive().await?;
    ProtocolMessage::parse(&message)
}

async fn handshake(connection: &dyn WebSocketConnection, config: &SubscriptionConfig) -> Result<()> {
    send(
        connection,
        &ProtocolMessage::ConnectionInit {
            payload: config.init_payload.clone(),
        },
    )?;

    let ack = async {
        loop {
            match receive(connection).await? {
                ProtocolMessage::ConnectionAck { .. } => return Ok(()),
                ProtocolMessage::Ping { payload } => send(connection, &ProtocolMessage::Pong { payload })?,
                other => tracing::debug!(
                    target: targets::SUBSCRIPTION,
                    message = ?other,
                    "Ignoring message before connection_ack"
                ),
            }
        }
    };

    tokio::time::timeout(config.ack_timeout, ack)
        .await
        .map_err(|_| RelayError::network(NetworkErrorKind::Timeout, "connection_ack not received"))?
}

/// Run one subscription to completion.
///
/// Every `next` payload is decoded with [`Operation::decode`] and handed to
/// `on_next`; an error from `on_next` ends the session. Returns `Ok(())` when
/// the server completes the subscription.
pub(crate) async fn run_subscription<F>(
    connection: &dyn WebSocketConnection,
    operation: &dyn Operation,
    config: &SubscriptionConfig,
    mut on_next: F,
) -> Result<()>
where
    F: FnMut(GraphQLResponse) -> Result<()>,
{
    handshake(connection, config).await?;
    tracing::debug!(
        target: targets::SUBSCRIPTION,
        operation = operation.name(),
        url = connection.url(),
        "Subscription acknowledged"
    );

    send(
        connection,
        &ProtocolMessage::Subscribe {
            id: SUBSCRIPTION_ID.to_string(),
            payload: SubscribePayload::from_operation(operation),
        },
    )?;

    let mut keep_alive = config.keep_alive_interval.map(|period| {
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    });

    let result = loop {
        let next = match keep_alive.as_mut() {
            Some(interval) => tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = send(connection, &ProtocolMessage::Ping { payload: None }) {
                        break Err(err);
                    }
                    continue;
                }
                next = receive(connection) => next,
            },
            None => receive(connection).await,
        };

        let message = match next {
            Ok(message) => message,
            Err(err) => break Err(err),
        };

        match message {
            ProtocolMessage::Next { id, payload } if id == SUBSCRIPTION_ID => {
                let delivered = serde_json::to_vec(&payload)
                    .map_err(RelayError::from)
                    .and_then(|bytes| operation.decode(&bytes))
                    .and_then(&mut on_next);
                if let Err(err) = delivered {
                    break Err(err);
                }
            }
            ProtocolMessage::Error { id, payload } if id == SUBSCRIPTION_ID => {
                let message = payload
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                // The server ends the operation itself after `error`.
                return Err(RelayError::GraphQL(message));
            }
            ProtocolMessage::Complete { id } if id == SUBSCRIPTION_ID => return Ok(()),
            ProtocolMessage::Ping { payload } => {
                if let Err(err) = send(connection, &ProtocolMessage::Pong { payload }) {
                    break Err(err);
                }
            }
            other => tracing::trace!(
                target: targets::SUBSCRIPTION,
                message = ?other,
                "Ignoring subscription message"
            ),
        }
    };

    if connection.state() == ConnectionState::Open {
        let _ = send(
            connection,
            &ProtocolMessage::Complete {
                id: SUBSCRIPTION_ID.to_string(),
            },
        );
    }
    result
}
