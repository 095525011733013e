//! The interceptor chain runtime.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::Instrument;

use horizon_relay_core::logging::{span_names, targets};
use horizon_relay_core::{CancellationToken, DispatchedTask, Dispatcher};

use super::event::{EventSink, InterceptorEvent};
use super::request::InterceptorRequest;
use crate::error::{RelayError, Result};

/// One policy unit of a chain.
///
/// An interceptor receives the request, a [`Chain`] handle for the rest of
/// the chain and an [`EventSink`]. It may rewrite the request and proceed,
/// short-circuit with its own events, or proceed and transform the events
/// it gets back. It must emit exactly one terminal event; if its future
/// finishes without one, the chain fails the traversal with
/// [`RelayError::Protocol`].
///
/// The returned future is dropped when the traversal is cancelled.
///
/// # Example
///
/// ```ignore
/// struct AuthHeader(String);
///
/// impl Interceptor for AuthHeader {
///     fn intercept(&self, request: InterceptorRequest, chain: Chain, sink: EventSink) -> BoxFuture<'static, ()> {
///         let request = request.to_builder().header("Authorization", self.0.clone()).build();
///         Box::pin(async move {
///             chain.proceed(request).forward_to(&sink).await;
///         })
///     }
/// }
/// ```
pub trait Interceptor: Send + Sync {
    /// Handle one request.
    fn intercept(
        &self,
        request: InterceptorRequest,
        chain: Chain,
        sink: EventSink,
    ) -> BoxFuture<'static, ()>;

    /// Release resources. Called once when the owning client is disposed.
    fn dispose(&self) {}
}

/// An ordered, non-empty list of interceptors.
#[derive(Clone)]
pub struct InterceptorChain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl InterceptorChain {
    /// Create a chain.
    ///
    /// Fails with [`RelayError::Configuration`] for an empty list.
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Result<Self> {
        if interceptors.is_empty() {
            return Err(RelayError::Configuration(
                "an interceptor chain needs at least one interceptor".to_string(),
            ));
        }
        Ok(Self {
            interceptors: interceptors.into(),
        })
    }

    /// Get the number of interceptors.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Always `false`; an empty chain cannot be built.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Start a traversal driven by whoever polls the returned stream.
    pub fn proceed(&self, request: InterceptorRequest, token: CancellationToken) -> EventStream {
        self.proceed_on(request, token, &Dispatcher::Inline)
    }

    /// Start a traversal on the given dispatcher.
    pub fn proceed_on(
        &self,
        request: InterceptorRequest,
        token: CancellationToken,
        dispatcher: &Dispatcher,
    ) -> EventStream {
        let span = tracing::debug_span!(
            target: targets::CHAIN,
            span_names::TRAVERSAL,
            request_id = %request.request_id(),
            operation = request.operation().name(),
        );
        let chain = Chain {
            interceptors: self.interceptors.clone(),
            index: 0,
            token,
        };
        chain.run(request, dispatcher, span)
    }

    /// Dispose every interceptor.
    pub fn dispose(&self) {
        for interceptor in self.interceptors.iter() {
            interceptor.dispose();
        }
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

/// The rest of a chain, as seen by one interceptor.
#[derive(Clone)]
pub struct Chain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    token: CancellationToken,
}

impl Chain {
    /// Run the rest of the chain on the polling context.
    pub fn proceed(&self, request: InterceptorRequest) -> EventStream {
        self.proceed_on(request, &Dispatcher::Inline)
    }

    /// Run the rest of the chain on another context.
    pub fn proceed_on(&self, request: InterceptorRequest, dispatcher: &Dispatcher) -> EventStream {
        self.run(request, dispatcher, tracing::Span::current())
    }

    /// The traversal's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn run(&self, request: InterceptorRequest, dispatcher: &Dispatcher, span: tracing::Span) -> EventStream {
        let (sink, events) = EventSink::new(request.request_id());

        let Some(interceptor) = self.interceptors.get(self.index).cloned() else {
            tracing::warn!(
                target: targets::CHAIN,
                request_id = %request.request_id(),
                "Request proceeded past the last interceptor"
            );
            let _ = sink.fail(RelayError::Configuration(
                "no interceptor left to handle the request".to_string(),
            ));
            return EventStream::new(events, None);
        };

        let next = Chain {
            interceptors: self.interceptors.clone(),
            index: self.index + 1,
            token: self.token.clone(),
        };
        let token = self.token.clone();
        let index = self.index;
        let intercepted = interceptor.intercept(request, next, sink.clone());

        let work = async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    if sink.fail_if_open(RelayError::Cancelled) {
                        tracing::debug!(target: targets::CHAIN, index, "Traversal cancelled");
                    }
                }
                _ = intercepted => {
                    if sink.fail_if_open(RelayError::Protocol(
                        "interceptor finished without a terminal event".to_string(),
                    )) {
                        tracing::warn!(
                            target: targets::CHAIN,
                            index,
                            "Interceptor finished without a terminal event"
                        );
                    }
                }
            }
        }
        .instrument(span);

        EventStream::new(events, Some(dispatcher.dispatch(Box::pin(work))))
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("index", &self.index)
            .field("len", &self.interceptors.len())
            .finish()
    }
}

/// The events of one traversal.
///
/// Polling the stream drives inline work. The stream ends right after the
/// terminal event. Dropping it cancels any work still running for it.
pub struct EventStream {
    events: mpsc::UnboundedReceiver<InterceptorEvent>,
    task: Option<DispatchedTask>,
    finished: bool,
}

impl EventStream {
    fn new(events: mpsc::UnboundedReceiver<InterceptorEvent>, task: Option<DispatchedTask>) -> Self {
        Self {
            events,
            task,
            finished: false,
        }
    }

    /// A stream that only carries `Failed(error)`.
    pub fn failed(error: RelayError) -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        let _ = sender.send(InterceptorEvent::Failed(error));
        Self::new(events, None)
    }

    /// Check if the terminal event was delivered.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Relay every event to `sink`.
    ///
    /// Stops early if the sink rejects an event.
    pub async fn forward_to(mut self, sink: &EventSink) {
        use futures_util::StreamExt;

        while let Some(event) = self.next().await {
            if sink.emit(event).is_err() {
                return;
            }
        }
    }
}

impl Stream for EventStream {
    type Item = InterceptorEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<InterceptorEvent>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }

        if let Some(task) = this.task.as_mut()
            && task.poll_drive(cx).is_ready()
        {
            this.task = None;
        }

        match this.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                this.finished = event.is_terminal();
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("finished", &self.finished)
            .field("task", &self.task)
            .finish()
    }
}
