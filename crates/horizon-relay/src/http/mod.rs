//! HTTP message model, bodies, multipart decoding and the HTTP engine.
//!
//! # Example
//!
//! ```ignore
//! use horizon_relay::http::{BytesBody, HttpMethod, HttpRequest};
//!
//! let request = HttpRequest::builder(HttpMethod::Post, "https://api.example.com/graphql")
//!     .header("Accept", "application/json")
//!     .body(BytesBody::json(&serde_json::json!({"query": "{ viewer { id } }"}))?)
//!     .build();
//!
//! // Derive a copy with one field changed
//! let traced = request.new_builder().header("X-Trace-Id", "42").build();
//! ```

mod body;
mod engine;
mod header;
pub mod multipart;
mod part;
mod request;
mod response;
mod source;

pub use body::{BytesBody, ContentLength, HttpBody};
pub use engine::{DefaultHttpEngine, HttpEngine, HttpEngineConfig};
pub(crate) use engine::check_status;
pub use header::{Headers, HttpHeader};
pub use multipart::{MultipartReader, PartStream};
pub use part::{HttpPart, HttpPartBuilder};
pub use request::{HttpMethod, HttpRequest, HttpRequestBuilder};
pub use response::{HttpResponse, HttpResponseBuilder, Payload};
pub use source::{BufferedSource, ByteStream, ResponseBody};
