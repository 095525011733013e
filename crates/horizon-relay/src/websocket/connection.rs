//! Live WebSocket connections.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as TungsteniteCloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use horizon_relay_core::CancellationToken;
use horizon_relay_core::logging::targets;

use super::message::{CloseReason, ConnectionState, WebSocketMessage};
use crate::error::{RelayError, Result};

/// Type alias for a connected WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A duplex, message-oriented connection.
///
/// A connection is owned by one logical caller, but `receive` and `send` may
/// be called from different tasks. Sends are delivered in call order.
pub trait WebSocketConnection: Send + Sync {
    /// Wait for the next text or binary message.
    ///
    /// Fails with [`RelayError::ConnectionClosed`] once the connection is
    /// closed by either side.
    fn receive(&self) -> BoxFuture<'_, Result<WebSocketMessage>>;

    /// Queue a message for sending.
    ///
    /// Returns as soon as the message is queued. Fails with
    /// [`RelayError::ConnectionClosed`] after close.
    fn send(&self, message: WebSocketMessage) -> Result<()>;

    /// Start a graceful close with the given reason. Idempotent.
    fn close_with(&self, reason: CloseReason);

    /// Start a graceful close with a normal close code. Idempotent.
    fn close(&self) {
        self.close_with(CloseReason::normal());
    }

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// The URL the connection was opened against.
    fn url(&self) -> &str;
}

/// Command sent to the writer task.
enum Command {
    Send(Message),
    Close(Option<CloseReason>),
}

struct Shared {
    state: Mutex<ConnectionState>,
    closed: CancellationToken,
}

impl Shared {
    /// Returns `true` if this call performed the transition to `Closed`.
    fn mark_closed(&self) -> bool {
        *self.state.lock() = ConnectionState::Closed;
        self.closed.cancel()
    }
}

/// A connection backed by `tokio-tungstenite`.
///
/// All socket writes go through one writer task, so sends from different
/// tasks never interleave on the wire.
pub(crate) struct TungsteniteConnection {
    url: String,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    reader: tokio::sync::Mutex<SplitStream<WsStream>>,
}

impl TungsteniteConnection {
    /// Take over an established stream and start its writer task.
    pub(crate) fn start(url: String, stream: WsStream, close_timeout: Duration) -> Self {
        let (sink, reader) = stream.split();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(ConnectionState::Open),
            closed: CancellationToken::new(),
        });

        tokio::spawn(write_loop(sink, command_rx, shared.clone(), close_timeout));

        Self {
            url,
            shared,
            commands,
            reader: tokio::sync::Mutex::new(reader),
        }
    }

    fn peer_closed(&self) {
        if self.shared.mark_closed() {
            // Lets the writer flush the close reply.
            let _ = self.commands.send(Command::Close(None));
        }
    }
}

impl WebSocketConnection for TungsteniteConnection {
    fn receive(&self) -> BoxFuture<'_, Result<WebSocketMessage>> {
        Box::pin(async move {
            if self.state() == ConnectionState::Closed {
                return Err(RelayError::ConnectionClosed);
            }
            let mut reader = self.reader.lock().await;
            loop {
                let next = tokio::select! {
                    _ = self.shared.closed.cancelled() => return Err(RelayError::ConnectionClosed),
                    next = reader.next() => next,
                };
                match next {
                    Some(Ok(Message::Text(text))) => {
                        return Ok(WebSocketMessage::Text(text.to_string()));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        return Ok(WebSocketMessage::Binary(data));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(
                            target: targets::WEBSOCKET,
                            url = %self.url,
                            code = frame.as_ref().map(|f| u16::from(f.code)),
                            "Peer closed WebSocket connection"
                        );
                        self.peer_closed();
                        return Err(RelayError::ConnectionClosed);
                    }
                    // Ping replies are queued by tungstenite itself.
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        self.peer_closed();
                        return Err(err.into());
                    }
                    None => {
                        self.peer_closed();
                        return Err(RelayError::ConnectionClosed);
                    }
                }
            }
        })
    }

    fn send(&self, message: WebSocketMessage) -> Result<()> {
        if self.state() == ConnectionState::Closed {
            return Err(RelayError::ConnectionClosed);
        }
        let frame = match message {
            WebSocketMessage::Text(text) => Message::Text(text.into()),
            WebSocketMessage::Binary(data) => Message::Binary(data),
        };
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| RelayError::ConnectionClosed)
    }

    fn close_with(&self, reason: CloseReason) {
        if self.shared.mark_closed() {
            tracing::debug!(
                target: targets::WEBSOCKET,
                url = %self.url,
                code = reason.code.as_u16(),
                "Closing WebSocket connection"
            );
            let _ = self.commands.send(Command::Close(Some(reason)));
        }
    }

    fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for TungsteniteConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TungsteniteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TungsteniteConnection")
            .field("url", &self.url)
            .field("state", &self.state())
            .finish()
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
    close_timeout: Duration,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Send(message) => {
                if let Err(err) = sink.send(message).await {
                    tracing::warn!(target: targets::WEBSOCKET, error = %err, "WebSocket write failed");
                    shared.mark_closed();
                    return;
                }
            }
            Command::Close(reason) => {
                let frame = reason.map(|r| CloseFrame {
                    code: TungsteniteCloseCode::from(r.code.as_u16()),
                    reason: r.reason.unwrap_or_default().into(),
                });
                let graceful = async {
                    let _ = sink.send(Message::Close(frame)).await;
                    let _ = sink.close().await;
                };
                if tokio::time::timeout(close_timeout, graceful).await.is_err() {
                    tracing::debug!(target: targets::WEBSOCKET, "Graceful close timed out");
                }
                return;
            }
        }
    }
}
