//! Events emitted by interceptors and the per-traversal sink.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use horizon_relay_core::logging::targets;

use super::request::RequestId;
use crate::error::{RelayError, Result};
use crate::graphql::GraphQLResponse;

/// Where a leg of a traversal fetches data from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchSourceType {
    /// The normalized cache.
    Cache,
    /// The HTTP or WebSocket engine.
    Network,
}

/// A response delivered through the chain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InterceptorResponse {
    /// The decoded GraphQL response, absent for an empty cache result.
    pub response: Option<GraphQLResponse>,
    /// HTTP status of the network response, if any.
    pub status_code: Option<u16>,
    /// Whether the response came from the cache.
    pub from_cache: bool,
}

impl InterceptorResponse {
    /// A response read from the cache.
    pub fn from_cache(response: GraphQLResponse) -> Self {
        Self {
            response: Some(response),
            status_code: None,
            from_cache: true,
        }
    }

    /// A response received from the network.
    pub fn from_network(response: GraphQLResponse, status_code: Option<u16>) -> Self {
        Self {
            response: Some(response),
            status_code,
            from_cache: false,
        }
    }

    /// The empty response substituted for a cache miss.
    pub fn cache_miss() -> Self {
        Self {
            response: None,
            status_code: None,
            from_cache: true,
        }
    }

    /// The response data, if any.
    pub fn data(&self) -> Option<&Value> {
        self.response
            .as_ref()
            .and_then(|r| r.data.as_ref())
            .filter(|data| !data.is_null())
    }

    /// Check if the response carries data.
    pub fn has_data(&self) -> bool {
        self.data().is_some()
    }

    /// Whether more incremental payloads follow this one.
    pub fn has_next(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.has_next)
    }
}

/// One event of a traversal.
///
/// Per traversal: zero or more `Fetch` markers and `Response`s, then exactly
/// one of `Completed` or `Failed`.
#[derive(Clone, Debug, PartialEq)]
pub enum InterceptorEvent {
    /// A leg started fetching from the given source.
    Fetch(FetchSourceType),
    /// An intermediate or final response. Never terminal.
    Response(InterceptorResponse),
    /// The traversal finished successfully.
    Completed,
    /// The traversal failed.
    Failed(RelayError),
}

impl InterceptorEvent {
    /// Check if this event ends the traversal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

/// Progress of one traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TraversalState {
    /// Nothing emitted yet.
    #[default]
    Idle,
    /// A fetch marker was emitted.
    Dispatched,
    /// At least one response was emitted.
    Responding,
    /// Terminal: completed.
    Completed,
    /// Terminal: failed.
    Failed,
}

impl TraversalState {
    /// Check if this state is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn after(self, event: &InterceptorEvent) -> Self {
        match event {
            InterceptorEvent::Fetch(_) if self == Self::Responding => Self::Responding,
            InterceptorEvent::Fetch(_) => Self::Dispatched,
            InterceptorEvent::Response(_) => Self::Responding,
            InterceptorEvent::Completed => Self::Completed,
            InterceptorEvent::Failed(_) => Self::Failed,
        }
    }
}

struct SinkInner {
    request_id: RequestId,
    state: Mutex<TraversalState>,
    events: mpsc::UnboundedSender<InterceptorEvent>,
}

/// Where an interceptor emits the events of its traversal.
///
/// Cloning yields another handle to the same traversal. Events emitted after
/// the terminal event are rejected with [`RelayError::Protocol`] and never
/// delivered.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

impl EventSink {
    pub(crate) fn new(request_id: RequestId) -> (Self, mpsc::UnboundedReceiver<InterceptorEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let sink = Self {
            inner: Arc::new(SinkInner {
                request_id,
                state: Mutex::new(TraversalState::Idle),
                events,
            }),
        };
        (sink, receiver)
    }

    /// Emit an event.
    ///
    /// Fails with [`RelayError::Protocol`] after the terminal event, or with
    /// [`RelayError::Cancelled`] once nobody listens to the traversal any
    /// more. In the latter case the state still advances.
    pub fn emit(&self, event: InterceptorEvent) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.is_terminal() {
                tracing::warn!(
                    target: targets::CHAIN,
                    request_id = %self.inner.request_id,
                    state = ?*state,
                    event = ?event,
                    "Rejected event emitted after the terminal event"
                );
                return Err(RelayError::Protocol(format!(
                    "event emitted after the traversal ended ({:?})",
                    *state
                )));
            }
            *state = state.after(&event);
        }

        tracing::trace!(
            target: targets::CHAIN,
            request_id = %self.inner.request_id,
            event = ?event,
            "Emitting event"
        );

        self.inner
            .events
            .send(event)
            .map_err(|_| RelayError::Cancelled)
    }

    /// Emit a fetch marker.
    pub fn fetch(&self, source: FetchSourceType) -> Result<()> {
        self.emit(InterceptorEvent::Fetch(source))
    }

    /// Emit a response.
    pub fn response(&self, response: InterceptorResponse) -> Result<()> {
        self.emit(InterceptorEvent::Response(response))
    }

    /// Emit the successful terminal event.
    pub fn complete(&self) -> Result<()> {
        self.emit(InterceptorEvent::Completed)
    }

    /// Emit the failing terminal event.
    pub fn fail(&self, error: RelayError) -> Result<()> {
        self.emit(InterceptorEvent::Failed(error))
    }

    /// Emit `Completed` for `Ok` and `Failed` for `Err`.
    pub fn finish_with(&self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => self.complete(),
            Err(error) => self.fail(error),
        }
    }

    /// Get the current traversal state.
    pub fn state(&self) -> TraversalState {
        *self.inner.state.lock()
    }

    /// Check if the terminal event was emitted.
    pub fn is_terminated(&self) -> bool {
        self.state().is_terminal()
    }

    /// Get the id of the traversal's request.
    pub fn request_id(&self) -> RequestId {
        self.inner.request_id
    }

    /// Fail the traversal unless it already ended.
    ///
    /// Returns `true` if the failure was emitted.
    pub(crate) fn fail_if_open(&self, error: RelayError) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.is_terminal() {
                return false;
            }
            *state = TraversalState::Failed;
        }
        let _ = self.inner.events.send(InterceptorEvent::Failed(error));
        true
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("request_id", &self.inner.request_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_machine() {
        let (sink, mut events) = EventSink::new(RequestId::next());
        assert_eq!(sink.state(), TraversalState::Idle);

        sink.fetch(FetchSourceType::Network).unwrap();
        assert_eq!(sink.state(), TraversalState::Dispatched);

        sink.response(InterceptorResponse::cache_miss()).unwrap();
        assert_eq!(sink.state(), TraversalState::Responding);

        // A second source may be announced after a response.
        sink.fetch(FetchSourceType::Network).unwrap();
        assert_eq!(sink.state(), TraversalState::Responding);

        sink.complete().unwrap();
        assert!(sink.is_terminated());

        assert_eq!(events.try_recv().unwrap(), InterceptorEvent::Fetch(FetchSourceType::Network));
        assert!(matches!(events.try_recv().unwrap(), InterceptorEvent::Response(_)));
        assert!(matches!(events.try_recv().unwrap(), InterceptorEvent::Fetch(_)));
        assert_eq!(events.try_recv().unwrap(), InterceptorEvent::Completed);
    }

    #[test]
    fn test_event_after_terminal_is_rejected() {
        let (sink, mut events) = EventSink::new(RequestId::next());
        sink.fail(RelayError::Cancelled).unwrap();

        assert!(matches!(sink.complete(), Err(RelayError::Protocol(_))));
        assert!(matches!(
            sink.response(InterceptorResponse::cache_miss()),
            Err(RelayError::Protocol(_))
        ));
        assert!(!sink.fail_if_open(RelayError::Cancelled));

        assert_eq!(events.try_recv().unwrap(), InterceptorEvent::Failed(RelayError::Cancelled));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_emit_without_listener() {
        let (sink, events) = EventSink::new(RequestId::next());
        drop(events);

        assert_eq!(sink.complete(), Err(RelayError::Cancelled));
        assert!(sink.is_terminated());
    }

    #[test]
    fn test_response_data() {
        let miss = InterceptorResponse::cache_miss();
        assert!(miss.from_cache);
        assert!(!miss.has_data());

        let null = InterceptorResponse::from_network(GraphQLResponse::from_data(json!(null)), Some(200));
        assert!(!null.has_data());

        let hit = InterceptorResponse::from_cache(GraphQLResponse::from_data(json!({"a": 1})));
        assert_eq!(hit.data(), Some(&json!({"a": 1})));
    }
}
