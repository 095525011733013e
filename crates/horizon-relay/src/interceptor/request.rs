//! Requests travelling through an interceptor chain.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::graphql::Operation;
use crate::http::{Headers, HttpMethod};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one logical request across every leg of its traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocate a fresh, process-unique id.
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The request an interceptor receives.
///
/// Immutable; use [`to_builder`](Self::to_builder) to derive a rewritten
/// copy. The copy keeps the same [`RequestId`].
#[derive(Clone)]
pub struct InterceptorRequest {
    request_id: RequestId,
    operation: Arc<dyn Operation>,
    fetch_from_cache: bool,
    headers: Headers,
    http_method: HttpMethod,
}

impl InterceptorRequest {
    /// Start building a request for `operation`.
    pub fn builder(operation: Arc<dyn Operation>) -> InterceptorRequestBuilder {
        InterceptorRequestBuilder {
            request_id: RequestId::next(),
            operation,
            fetch_from_cache: false,
            headers: Headers::new(),
            http_method: HttpMethod::default(),
        }
    }

    /// Get the request id.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Get the operation.
    pub fn operation(&self) -> &Arc<dyn Operation> {
        &self.operation
    }

    /// Whether this leg should be served from the cache.
    pub fn fetch_from_cache(&self) -> bool {
        self.fetch_from_cache
    }

    /// Get the extra HTTP headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get the HTTP method used for queries and mutations.
    pub fn http_method(&self) -> HttpMethod {
        self.http_method
    }

    /// A builder pre-filled with every field of this request.
    pub fn to_builder(&self) -> InterceptorRequestBuilder {
        InterceptorRequestBuilder {
            request_id: self.request_id,
            operation: self.operation.clone(),
            fetch_from_cache: self.fetch_from_cache,
            headers: self.headers.clone(),
            http_method: self.http_method,
        }
    }
}

impl fmt::Debug for InterceptorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorRequest")
            .field("request_id", &self.request_id)
            .field("operation", &self.operation.name())
            .field("fetch_from_cache", &self.fetch_from_cache)
            .field("headers", &self.headers.len())
            .field("http_method", &self.http_method)
            .finish()
    }
}

/// Builder for [`InterceptorRequest`].
pub struct InterceptorRequestBuilder {
    request_id: RequestId,
    operation: Arc<dyn Operation>,
    fetch_from_cache: bool,
    headers: Headers,
    http_method: HttpMethod,
}

impl InterceptorRequestBuilder {
    /// Replace the operation.
    pub fn operation(mut self, operation: Arc<dyn Operation>) -> Self {
        self.operation = operation;
        self
    }

    /// Route this leg to the cache (`true`) or the network (`false`).
    pub fn fetch_from_cache(mut self, fetch_from_cache: bool) -> Self {
        self.fetch_from_cache = fetch_from_cache;
        self
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Replace all headers.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the HTTP method.
    pub fn http_method(mut self, method: HttpMethod) -> Self {
        self.http_method = method;
        self
    }

    /// Build the request.
    pub fn build(self) -> InterceptorRequest {
        InterceptorRequest {
            request_id: self.request_id,
            operation: self.operation,
            fetch_from_cache: self.fetch_from_cache,
            headers: self.headers,
            http_method: self.http_method,
        }
    }
}
