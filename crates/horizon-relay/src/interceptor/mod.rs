//! Interceptor chains.
//!
//! A traversal runs a request through an ordered list of [`Interceptor`]s.
//! Each one receives the request, a [`Chain`] handle for the rest of the
//! chain and an [`EventSink`]. Events flow back up as an [`EventStream`]:
//! zero or more [`InterceptorEvent::Fetch`] markers and
//! [`InterceptorEvent::Response`]s, then exactly one of
//! [`InterceptorEvent::Completed`] or [`InterceptorEvent::Failed`].
//!
//! The standard tail of a chain is [`CacheInterceptor`] followed by
//! [`NetworkInterceptor`]; fetch policies sit at the head.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use horizon_relay::interceptor::{InterceptorChain, InterceptorRequest, NetworkInterceptor};
//! use horizon_relay_core::CancellationToken;
//!
//! let chain = InterceptorChain::new(vec![
//!     Arc::new(NetworkInterceptor::new("https://api.example.com/graphql", http_engine)),
//! ])?;
//!
//! let request = InterceptorRequest::builder(Arc::new(operation)).build();
//! let mut events = chain.proceed(request, CancellationToken::new());
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! ```

mod cache;
mod chain;
mod event;
mod network;
mod request;

pub use cache::CacheInterceptor;
pub use chain::{Chain, EventStream, Interceptor, InterceptorChain};
pub use event::{
    EventSink, FetchSourceType, InterceptorEvent, InterceptorResponse, TraversalState,
};
pub use network::NetworkInterceptor;
pub use request::{InterceptorRequest, InterceptorRequestBuilder, RequestId};
