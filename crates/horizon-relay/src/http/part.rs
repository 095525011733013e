//! One frame of a multipart response.

use super::body::ContentLength;
use super::header::{Headers, HttpHeader};
use super::source::ResponseBody;
use crate::error::{RelayError, Result};

/// A single part of a multipart response.
///
/// Each part owns its body independently of its siblings.
#[derive(Debug)]
pub struct HttpPart {
    headers: Headers,
    body: ResponseBody,
}

impl HttpPart {
    /// Start building a part.
    pub fn builder() -> HttpPartBuilder {
        HttpPartBuilder::new()
    }

    /// The part headers, in order.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The part body.
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Mutable access to the part body.
    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    /// Take the body, dropping the headers.
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Split into headers and body.
    pub fn into_parts(self) -> (Headers, ResponseBody) {
        (self.headers, self.body)
    }

    /// The part's `Content-Type`, if declared.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.content_type()
    }

    /// The part's declared `Content-Length`, falling back to the body's.
    pub fn content_length(&self) -> ContentLength {
        match self.headers.content_length() {
            Some(len) => ContentLength::Known(len),
            None => self.body.content_length(),
        }
    }
}

/// Builder for [`HttpPart`]. Exactly one body must be set.
#[derive(Debug, Default)]
pub struct HttpPartBuilder {
    headers: Headers,
    body: Option<ResponseBody>,
    misuse: Option<&'static str>,
}

impl HttpPartBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
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

    /// Set the body.
    pub fn body(mut self, body: ResponseBody) -> Self {
        if self.body.is_some() {
            self.misuse.get_or_insert("body() can only be called once");
        } else {
            self.body = Some(body);
        }
        self
    }

    /// Build the part.
    ///
    /// Fails with [`RelayError::Configuration`] if the body was set twice or
    /// never set.
    pub fn build(self) -> Result<HttpPart> {
        if let Some(misuse) = self.misuse {
            return Err(RelayError::Configuration(misuse.to_string()));
        }
        let body = self
            .body
            .ok_or_else(|| RelayError::Configuration("a part requires a body".to_string()))?;
        Ok(HttpPart {
            headers: self.headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_requires_body() {
        let err = HttpPart::builder().header("A", "b").build().unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn test_part_rejects_second_body() {
        let err = HttpPart::builder()
            .body(ResponseBody::from_bytes("a"))
            .body(ResponseBody::from_bytes("b"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn test_content_length_prefers_header() {
        let part = HttpPart::builder()
            .header("content-length", "3")
            .body(ResponseBody::from_bytes("abcdef"))
            .build()
            .unwrap();
        assert_eq!(part.content_length(), ContentLength::Known(3));
    }
}
