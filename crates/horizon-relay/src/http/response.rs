//! HTTP response types.

use std::fmt;

use bytes::Bytes;

use super::body::ContentLength;
use super::header::{Headers, HttpHeader};
use super::multipart::{PartStream, is_multipart};
use super::source::{ByteStream, ResponseBody};
use crate::error::{RelayError, Result};

/// What a response carries after its headers.
///
/// A response carries a single body or a sequence of parts, never both.
#[derive(Debug, Default)]
pub enum Payload {
    /// No body.
    #[default]
    None,
    /// A single body, streaming or materialized.
    Body(ResponseBody),
    /// A lazily decoded multipart sequence.
    Parts(PartStream),
}

/// An HTTP response.
///
/// The response owns its payload until it is taken. A multipart sequence can
/// be taken once; a second attempt fails with
/// [`RelayError::AlreadyConsumed`].
pub struct HttpResponse {
    status_code: u16,
    headers: Headers,
    payload: Payload,
    parts_taken: bool,
}

impl HttpResponse {
    /// Start building a response.
    pub fn builder(status_code: u16) -> HttpResponseBuilder {
        HttpResponseBuilder::new(status_code)
    }

    /// Get the HTTP status code.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Check if the response indicates success (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Get the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get the Content-Type header value.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.content_type()
    }

    /// Check if the payload is a multipart sequence, or was one before it
    /// was taken.
    pub fn is_multipart(&self) -> bool {
        self.parts_taken || matches!(self.payload, Payload::Parts(_))
    }

    /// The single body, if the payload is one.
    pub fn body(&self) -> Option<&ResponseBody> {
        match &self.payload {
            Payload::Body(body) => Some(body),
            _ => None,
        }
    }

    /// Mutable access to the single body.
    pub fn body_mut(&mut self) -> Option<&mut ResponseBody> {
        match &mut self.payload {
            Payload::Body(body) => Some(body),
            _ => None,
        }
    }

    /// Take the single body.
    ///
    /// Returns `None` for responses without a body or with parts.
    pub fn into_body(self) -> Option<ResponseBody> {
        match self.payload {
            Payload::Body(body) => Some(body),
            _ => None,
        }
    }

    /// Take the multipart sequence.
    ///
    /// Fails with [`RelayError::AlreadyConsumed`] if the parts were already
    /// taken, or [`RelayError::Configuration`] if this is not a multipart
    /// response.
    pub fn take_parts(&mut self) -> Result<PartStream> {
        if self.parts_taken {
            return Err(RelayError::AlreadyConsumed("multipart response parts"));
        }
        match std::mem::take(&mut self.payload) {
            Payload::Parts(parts) => {
                self.parts_taken = true;
                Ok(parts)
            }
            other => {
                self.payload = other;
                Err(RelayError::Configuration(
                    "response does not carry multipart parts".to_string(),
                ))
            }
        }
    }

    /// A builder that takes over every field of this response, payload
    /// included.
    pub fn new_builder(self) -> HttpResponseBuilder {
        HttpResponseBuilder {
            status_code: self.status_code,
            headers: self.headers,
            payload: self.payload,
            parts_taken: self.parts_taken,
            misuse: None,
        }
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status_code", &self.status_code)
            .field("headers", &self.headers)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Builder for [`HttpResponse`].
///
/// Misuse (a body set twice, or a body combined with parts in either order)
/// is recorded and reported by [`build`](Self::build).
#[derive(Debug)]
pub struct HttpResponseBuilder {
    status_code: u16,
    headers: Headers,
    payload: Payload,
    /// Carried over from a response whose parts were already taken.
    parts_taken: bool,
    misuse: Option<&'static str>,
}

impl HttpResponseBuilder {
    /// Create a builder for the given status code.
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Headers::new(),
            payload: Payload::None,
            parts_taken: false,
            misuse: None,
        }
    }

    /// Override the status code.
    pub fn status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
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

    /// Set the single body.
    pub fn body(mut self, body: ResponseBody) -> Self {
        match self.payload {
            Payload::None => {
                self.payload = Payload::Body(body);
                self.parts_taken = false;
            }
            Payload::Body(_) => self.record("body() can only be called once"),
            Payload::Parts(_) => self.record("either body() or parts() can be called"),
        }
        self
    }

    /// Set a materialized body.
    pub fn body_bytes(self, bytes: impl Into<Bytes>) -> Self {
        self.body(ResponseBody::from_bytes(bytes))
    }

    /// Set a streaming body.
    pub fn body_stream(self, stream: ByteStream, content_length: ContentLength) -> Self {
        self.body(ResponseBody::from_stream(stream, content_length))
    }

    /// Set the multipart sequence.
    pub fn parts(mut self, parts: PartStream) -> Self {
        match self.payload {
            Payload::None => {
                self.payload = Payload::Parts(parts);
                self.parts_taken = false;
            }
            Payload::Body(_) => self.record("either body() or parts() can be called"),
            Payload::Parts(_) => self.record("parts() can only be called once"),
        }
        self
    }

    fn record(&mut self, misuse: &'static str) {
        self.misuse.get_or_insert(misuse);
    }

    /// Build the response.
    pub fn build(self) -> Result<HttpResponse> {
        if let Some(misuse) = self.misuse {
            return Err(RelayError::Configuration(misuse.to_string()));
        }
        Ok(HttpResponse {
            status_code: self.status_code,
            headers: self.headers,
            payload: self.payload,
            parts_taken: self.parts_taken,
        })
    }

    /// Build the response, decoding a streaming body as multipart when the
    /// headers declare a multipart envelope.
    pub(crate) fn build_detecting_parts(self) -> Result<HttpResponse> {
        let multipart_type = self
            .headers
            .content_type()
            .filter(|ct| is_multipart(ct))
            .map(str::to_string);
        match (multipart_type, self.payload) {
            (Some(content_type), Payload::Body(body)) => {
                let parts = PartStream::from_content_type(body, &content_type)?;
                Self {
                    payload: Payload::Parts(parts),
                    ..self
                }
                .build()
            }
            (_, payload) => Self { payload, ..self }.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn empty_parts() -> PartStream {
        PartStream::from_stream(futures_util::stream::empty().boxed())
    }

    #[test]
    fn test_body_twice_fails() {
        let result = HttpResponse::builder(200)
            .body_bytes("a")
            .body_bytes("b")
            .build();
        assert!(matches!(result, Err(RelayError::Configuration(_))));
    }

    #[test]
    fn test_body_and_parts_fail_in_any_order() {
        let result = HttpResponse::builder(200)
            .body_bytes("a")
            .parts(empty_parts())
            .build();
        assert!(matches!(result, Err(RelayError::Configuration(_))));

        let result = HttpResponse::builder(200)
            .parts(empty_parts())
            .body_bytes("a")
            .build();
        assert!(matches!(result, Err(RelayError::Configuration(_))));
    }

    #[test]
    fn test_take_parts_twice() {
        let mut response = HttpResponse::builder(200)
            .parts(empty_parts())
            .build()
            .unwrap();
        assert!(response.take_parts().is_ok());
        assert!(response.is_multipart());
        assert_eq!(
            response.take_parts().unwrap_err(),
            RelayError::AlreadyConsumed("multipart response parts")
        );
    }

    #[test]
    fn test_rebuilt_response_remembers_taken_parts() {
        let mut response = HttpResponse::builder(200)
            .parts(empty_parts())
            .build()
            .unwrap();
        response.take_parts().unwrap();

        let mut rebuilt = response.new_builder().build().unwrap();
        assert!(rebuilt.is_multipart());
        assert_eq!(
            rebuilt.take_parts().unwrap_err(),
            RelayError::AlreadyConsumed("multipart response parts")
        );

        let mut replaced = rebuilt.new_builder().parts(empty_parts()).build().unwrap();
        assert!(replaced.take_parts().is_ok());
    }

    #[test]
    fn test_take_parts_on_single_body_keeps_body() {
        let mut response = HttpResponse::builder(200).body_bytes("x").build().unwrap();
        assert!(matches!(
            response.take_parts(),
            Err(RelayError::Configuration(_))
        ));
        assert!(response.body().is_some());
    }
}
