//! GraphQL operations, responses and wire composition.
//!
//! This module provides the operation model the transport core consumes:
//! - The [`Operation`] trait and the untyped [`GraphQLRequest`]
//! - [`GraphQLResponse`], including incremental delivery fields
//! - [`IncrementalMerger`] for `@defer`/`@stream` payloads
//! - [`compose_http_request`] for `POST` and `GET` transport
//! - The graphql-transport-ws protocol used for subscriptions
//!
//! # Example
//!
//! ```ignore
//! use horizon_relay::graphql::{GraphQLRequest, compose_http_request};
//! use horizon_relay::http::{Headers, HttpMethod};
//!
//! let request = GraphQLRequest::query(r#"
//!     query GetUser($id: ID!) {
//!         user(id: $id) {
//!             id
//!             name
//!         }
//!     }
//! "#)
//! .operation_name("GetUser")
//! .variable("id", "123");
//!
//! let http_request = compose_http_request(
//!     &request,
//!     "https://api.example.com/graphql",
//!     HttpMethod::Post,
//!     &Headers::new(),
//! )?;
//! ```

mod compose;
mod merge;
mod request;
mod response;
pub mod subscription;

pub use compose::{DEFAULT_ACCEPT, compose_http_request};
pub use merge::IncrementalMerger;
pub use request::{GraphQLRequest, Operation, OperationType};
pub use response::{GraphQLError, GraphQLLocation, GraphQLResponse, IncrementalPayload, PathSegment};
pub use subscription::{ProtocolMessage, SubscriptionConfig};
