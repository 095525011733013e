//! HTTP request types and builder.

use std::fmt;
use std::sync::Arc;

use super::body::HttpBody;
use super::header::{Headers, HttpHeader};

/// HTTP request methods used by GraphQL transports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    /// HTTP GET method.
    Get,
    /// HTTP POST method.
    #[default]
    Post,
}

impl HttpMethod {
    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// An immutable HTTP request.
///
/// Built with [`HttpRequestBuilder`]; use [`new_builder`](Self::new_builder)
/// to derive a modified copy. A `GET` request carrying a body is allowed by
/// the type; callers decide whether that makes sense.
#[derive(Clone)]
pub struct HttpRequest {
    method: HttpMethod,
    url: String,
    headers: Headers,
    body: Option<Arc<dyn HttpBody>>,
}

impl HttpRequest {
    /// Start building a request.
    pub fn builder(method: HttpMethod, url: impl Into<String>) -> HttpRequestBuilder {
        HttpRequestBuilder::new(method, url)
    }

    /// The HTTP method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The request URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The request headers, in order.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The request body, if any.
    pub fn body(&self) -> Option<&Arc<dyn HttpBody>> {
        self.body.as_ref()
    }

    /// A builder pre-populated with every field of this request.
    pub fn new_builder(&self) -> HttpRequestBuilder {
        HttpRequestBuilder {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    /// Alias for [`new_builder`](Self::new_builder).
    pub fn rebuild(&self) -> HttpRequestBuilder {
        self.new_builder()
    }
}

impl PartialEq for HttpRequest {
    fn eq(&self, other: &Self) -> bool {
        let same_body = match (&self.body, &other.body) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.method == other.method
            && self.url == other.url
            && self.headers == other.headers
            && same_body
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body", &self.body.as_deref())
            .finish()
    }
}

/// Builder for constructing HTTP requests.
#[derive(Clone)]
pub struct HttpRequestBuilder {
    method: HttpMethod,
    url: String,
    headers: Headers,
    body: Option<Arc<dyn HttpBody>>,
}

impl HttpRequestBuilder {
    /// Create a new request builder.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Override the method.
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Override the URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Append several headers.
    pub fn headers<I, H>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HttpHeader>,
    {
        self.headers.extend(headers);
        self
    }

    /// Replace every header.
    pub fn replace_headers<I, H>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HttpHeader>,
    {
        self.headers.replace_all(headers);
        self
    }

    /// Attach a body.
    pub fn body(mut self, body: impl HttpBody + 'static) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    /// Attach a shared body.
    pub fn shared_body(mut self, body: Arc<dyn HttpBody>) -> Self {
        self.body = Some(body);
        self
    }

    /// Remove the body.
    pub fn no_body(mut self) -> Self {
        self.body = None;
        self
    }

    /// Build the request.
    pub fn build(self) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl fmt::Debug for HttpRequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::body::BytesBody;

    #[test]
    fn test_rebuild_round_trip() {
        let request = HttpRequest::builder(HttpMethod::Post, "https://example.com/graphql")
            .header("Accept", "application/json")
            .header("accept", "multipart/mixed")
            .body(BytesBody::text("{}"))
            .build();

        assert_eq!(request.rebuild().build(), request);
    }

    #[test]
    fn test_rebuild_overrides_only_named_fields() {
        let request = HttpRequest::builder(HttpMethod::Post, "https://example.com/graphql")
            .header("X-Trace", "1")
            .build();

        let rebuilt = request.new_builder().method(HttpMethod::Get).build();
        assert_eq!(rebuilt.method(), HttpMethod::Get);
        assert_eq!(rebuilt.url(), request.url());
        assert_eq!(rebuilt.headers(), request.headers());
    }

    #[test]
    fn test_get_with_body_is_allowed() {
        let request = HttpRequest::builder(HttpMethod::Get, "https://example.com")
            .body(BytesBody::text("x"))
            .build();
        assert!(request.body().is_some());
    }

    #[test]
    fn test_bodies_compare_by_identity() {
        let a = HttpRequest::builder(HttpMethod::Post, "u")
            .body(BytesBody::text("x"))
            .build();
        let b = HttpRequest::builder(HttpMethod::Post, "u")
            .body(BytesBody::text("x"))
            .build();
        assert_ne!(a, b);
    }
}
