//! `multipart/mixed` response decoding.
//!
//! Servers that implement incremental delivery answer with a body framed like
//! this (boundary `-`):
//!
//! ```text
//! \r\n---\r\n
//! Content-Type: application/json; charset=utf-8\r\n
//! Content-Length: 37\r\n
//! \r\n
//! {"data":{"a":1},"hasNext":true}\r\n
//! ---\r\n
//! ...
//! \r\n-----\r\n
//! ```
//!
//! [`PartStream`] decodes such a body lazily: it reads just enough of the
//! underlying stream to produce the next part, buffering one part at a time.
//! The underlying stream is dropped exactly once, at the terminal boundary,
//! on the first framing error, or when the stream is abandoned.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use horizon_relay_core::logging::targets;

use super::header::Headers;
use super::part::HttpPart;
use super::source::{BufferedSource, ResponseBody};
use crate::error::{RelayError, Result};

/// Check if a `Content-Type` value declares a multipart envelope.
pub fn is_multipart(content_type: &str) -> bool {
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    media_type
        .get(..10)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("multipart/"))
}

/// Extract the `boundary` parameter of a `Content-Type` value.
///
/// Quoted and bare values are both accepted.
pub fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        (!value.is_empty()).then(|| value.to_string())
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReaderState {
    Preamble,
    Frames,
    Done,
}

/// Pull-based multipart decoder over a single body.
pub struct MultipartReader {
    source: Option<BufferedSource>,
    delimiter: Vec<u8>,
    state: ReaderState,
    parts_read: usize,
}

impl MultipartReader {
    /// Create a reader for `body`, framed by `boundary`.
    pub fn new(body: ResponseBody, boundary: &str) -> Self {
        Self {
            source: Some(BufferedSource::new(body)),
            delimiter: format!("--{boundary}").into_bytes(),
            state: ReaderState::Preamble,
            parts_read: 0,
        }
    }

    /// Read the next part.
    ///
    /// Returns `Ok(None)` after the terminal boundary. After an error the
    /// reader is finished and keeps returning `Ok(None)`.
    pub async fn next_part(&mut self) -> Result<Option<HttpPart>> {
        match self.advance().await {
            Ok(Some(part)) => {
                self.parts_read += 1;
                tracing::trace!(
                    target: targets::MULTIPART,
                    index = self.parts_read - 1,
                    content_type = part.content_type().unwrap_or_default(),
                    "Decoded part"
                );
                Ok(Some(part))
            }
            Ok(None) => {
                self.finish("terminal boundary");
                Ok(None)
            }
            Err(err) => {
                tracing::debug!(target: targets::MULTIPART, error = %err, "Multipart decoding failed");
                self.finish("error");
                Err(err)
            }
        }
    }

    fn finish(&mut self, reason: &'static str) {
        self.state = ReaderState::Done;
        if self.source.take().is_some() {
            tracing::trace!(
                target: targets::MULTIPART,
                reason,
                parts = self.parts_read,
                "Released multipart source"
            );
        }
    }

    async fn advance(&mut self) -> Result<Option<HttpPart>> {
        let delimiter = self.delimiter.clone();
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };

        if self.state == ReaderState::Preamble {
            loop {
                let Some(line) = source.read_line().await? else {
                    return Err(malformed("end of input before the first boundary"));
                };
                let line = line.trim_ascii_end();
                if line == delimiter.as_slice() {
                    self.state = ReaderState::Frames;
                    break;
                }
                if is_terminal(line, &delimiter) {
                    return Ok(None);
                }
            }
        }
        if self.state == ReaderState::Done {
            return Ok(None);
        }

        let headers = read_headers(source).await?;

        let mut close_delimiter = Vec::with_capacity(delimiter.len() + 2);
        close_delimiter.extend_from_slice(b"\r\n");
        close_delimiter.extend_from_slice(&delimiter);

        let body = match headers.content_length() {
            Some(len) => {
                let len = usize::try_from(len)
                    .map_err(|_| malformed("part Content-Length does not fit in memory"))?;
                let body = source
                    .read_exact(len)
                    .await?
                    .ok_or_else(|| malformed("truncated part body"))?;
                source
                    .read_until(&close_delimiter)
                    .await?
                    .ok_or_else(|| malformed("missing boundary after part body"))?;
                body
            }
            None => source
                .read_until(&close_delimiter)
                .await?
                .ok_or_else(|| malformed("truncated part body"))?,
        };

        if source.starts_with(b"--").await? {
            source.skip(2);
            self.state = ReaderState::Done;
        } else if source.read_line().await?.is_none() {
            return Err(malformed("end of input after boundary"));
        }

        HttpPart::builder()
            .headers(headers)
            .body(ResponseBody::from_bytes(body))
            .build()
            .map(Some)
    }
}

impl fmt::Debug for MultipartReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartReader")
            .field("delimiter", &String::from_utf8_lossy(&self.delimiter))
            .field("state", &self.state)
            .field("parts_read", &self.parts_read)
            .finish()
    }
}

async fn read_headers(source: &mut BufferedSource) -> Result<Headers> {
    let mut headers = Headers::new();
    loop {
        let Some(line) = source.read_line().await? else {
            return Err(malformed("end of input inside part headers"));
        };
        if line.is_empty() {
            return Ok(headers);
        }
        let line = String::from_utf8_lossy(&line);
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("invalid part header line '{line}'")))?;
        headers.add(name.trim(), value.trim());
    }
}

fn is_terminal(line: &[u8], delimiter: &[u8]) -> bool {
    line.len() == delimiter.len() + 2 && line.starts_with(delimiter) && line.ends_with(b"--")
}

fn malformed(message: impl Into<String>) -> RelayError {
    RelayError::MalformedMultipart(message.into())
}

/// A lazy, single-pass sequence of multipart parts.
///
/// Not `Clone`: the parts of a response can be consumed once. An error is
/// yielded once at the failing advance and the stream then ends; parts that
/// were already yielded are unaffected.
pub struct PartStream {
    inner: BoxStream<'static, Result<HttpPart>>,
}

impl PartStream {
    /// Decode `body` lazily, framed by `boundary`.
    pub fn new(body: ResponseBody, boundary: &str) -> Self {
        let reader = MultipartReader::new(body, boundary);
        let inner = stream::unfold(reader, |mut reader| async move {
            match reader.next_part().await {
                Ok(Some(part)) => Some((Ok(part), reader)),
                Ok(None) => None,
                Err(err) => Some((Err(err), reader)),
            }
        })
        .boxed();
        Self { inner }
    }

    /// Decode `body` using the boundary declared in `content_type`.
    pub fn from_content_type(body: ResponseBody, content_type: &str) -> Result<Self> {
        let boundary = boundary(content_type).ok_or_else(|| {
            malformed(format!("no boundary in content type '{content_type}'"))
        })?;
        Ok(Self::new(body, &boundary))
    }

    /// Wrap an already-decoded sequence of parts.
    pub fn from_stream(stream: BoxStream<'static, Result<HttpPart>>) -> Self {
        Self { inner: stream }
    }

    /// Read the next part.
    pub async fn next_part(&mut self) -> Option<Result<HttpPart>> {
        self.inner.next().await
    }
}

impl Stream for PartStream {
    type Item = Result<HttpPart>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for PartStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartStream").finish_non_exhaustive()
    }
}
