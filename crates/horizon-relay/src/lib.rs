//! GraphQL transport and interceptor core for Horizon Relay.
//!
//! This crate moves GraphQL operations to a server and routes the results
//! back through a chain of interceptors:
//!
//! - **HTTP**: message model, streamed and materialized bodies, a lazy
//!   `multipart/mixed` decoder and a pluggable [`HttpEngine`]
//! - **WebSocket**: a pluggable [`WebSocketEngine`] with ordered sends and
//!   idempotent close
//! - **GraphQL**: the [`Operation`] contract, incremental payload merging and
//!   the graphql-transport-ws subscription protocol
//! - **Interceptors**: composable policy units with a strict event protocol
//!   and cancellation
//! - **Fetch policies**: cache-only, network-only, cache-first,
//!   network-first and cache-and-network
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use horizon_relay::{FetchPolicy, GraphQLRequest, MemoryCache, RelayClient};
//!
//! let client = RelayClient::builder("https://api.example.com/graphql")
//!     .normalized_cache(Arc::new(MemoryCache::default()))
//!     .fetch_policy(FetchPolicy::CacheFirst)
//!     .build()?;
//!
//! let query = GraphQLRequest::query("query Viewer { viewer { id login } }")
//!     .operation_name("Viewer");
//!
//! let response = client.query(query).response().await?;
//! println!("from cache: {}", response.from_cache);
//! ```
//!
//! # Events
//!
//! Every call yields zero or more fetch markers and responses, then exactly
//! one terminal event:
//!
//! ```ignore
//! use futures_util::StreamExt;
//! use horizon_relay::InterceptorEvent;
//!
//! let mut call = client.query(query).fetch_policy(FetchPolicy::CacheAndNetwork).execute();
//! while let Some(event) = call.next().await {
//!     match event {
//!         InterceptorEvent::Fetch(source) => println!("fetching from {source:?}"),
//!         InterceptorEvent::Response(response) => println!("data: {:?}", response.data()),
//!         InterceptorEvent::Completed => println!("done"),
//!         InterceptorEvent::Failed(error) => println!("failed: {error}"),
//!     }
//! }
//! ```
//!
//! # Cancellation
//!
//! ```ignore
//! let call = client.query(query).execute();
//! call.cancel();
//! assert!(matches!(call.response().await, Err(RelayError::Cancelled)));
//! ```

pub mod cache;
pub mod client;
mod error;
pub mod fetcher;
pub mod graphql;
pub mod http;
pub mod interceptor;
pub mod websocket;

pub use error::{NetworkErrorKind, RelayError, Result};

// Re-export commonly used types at the crate root
pub use cache::{CacheRead, MemoryCache, NormalizedCache};
pub use client::{CallBack, CallHandle, CancelHandle, RelayCall, RelayClient, RelayClientBuilder};
pub use fetcher::{CacheFailurePolicy, FetchPolicy};
pub use graphql::{GraphQLRequest, GraphQLResponse, Operation, OperationType};
pub use http::{HttpEngine, HttpMethod, HttpRequest, HttpResponse, ResponseBody};
pub use interceptor::{
    EventSink, FetchSourceType, Interceptor, InterceptorEvent, InterceptorRequest,
    InterceptorResponse,
};
pub use websocket::{WebSocketConnection, WebSocketEngine};
