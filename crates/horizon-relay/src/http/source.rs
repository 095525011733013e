//! Response bodies and buffered reading.
//!
//! A [`ResponseBody`] is either *streaming* (a single-pass source backed by a
//! live connection) or *materialized* (an immutable buffer that can be read
//! any number of times). Engines hand out streaming bodies by default so
//! large responses are never buffered whole.
//!
//! The underlying stream is dropped exactly once: when the body is closed,
//! when its last chunk has been read, or when the body itself is dropped.
//!
//! # Example
//!
//! ```ignore
//! let mut body = response.into_body()?;
//! while let Some(chunk) = body.next_chunk().await? {
//!     sink.write_all(&chunk)?;
//! }
//! body.close()?;
//! ```

use std::fmt;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use serde::de::DeserializeOwned;

use horizon_relay_core::logging::targets;

use super::body::ContentLength;
use crate::error::{RelayError, Result};

/// A single-pass stream of body chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

enum BodyState {
    Streaming(ByteStream),
    Materialized { bytes: Bytes, read: bool },
    Exhausted,
    Closed,
}

/// The body of an HTTP response or of a multipart part.
pub struct ResponseBody {
    content_length: ContentLength,
    state: BodyState,
}

impl ResponseBody {
    /// Wrap a live byte stream.
    pub fn from_stream(stream: ByteStream, content_length: ContentLength) -> Self {
        Self {
            content_length,
            state: BodyState::Streaming(stream),
        }
    }

    /// Wrap an immutable buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            content_length: ContentLength::Known(bytes.len() as u64),
            state: BodyState::Materialized { bytes, read: false },
        }
    }

    /// An empty materialized body.
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// The declared length of the body.
    pub fn content_length(&self) -> ContentLength {
        self.content_length
    }

    /// Check if the body is still backed by a live stream.
    pub fn is_streaming(&self) -> bool {
        matches!(self.state, BodyState::Streaming(_))
    }

    /// Check if the body has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, BodyState::Closed)
    }

    /// The buffered bytes of a materialized body.
    ///
    /// Returns `None` for streaming, exhausted or closed bodies.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.state {
            BodyState::Materialized { bytes, .. } => Some(bytes),
            _ => None,
        }
    }

    /// Read the next chunk.
    ///
    /// Returns `Ok(None)` once the body is exhausted. The underlying stream is
    /// released as soon as it reports its end or an error.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match &mut self.state {
            BodyState::Streaming(stream) => match stream.next().await {
                Some(Ok(chunk)) => Ok(Some(chunk)),
                Some(Err(err)) => {
                    self.release("failed");
                    Err(err)
                }
                None => {
                    self.release("exhausted");
                    Ok(None)
                }
            },
            BodyState::Materialized { bytes, read } => {
                if *read || bytes.is_empty() {
                    *read = true;
                    Ok(None)
                } else {
                    *read = true;
                    Ok(Some(bytes.clone()))
                }
            }
            BodyState::Exhausted => Ok(None),
            BodyState::Closed => Err(RelayError::AlreadyClosed),
        }
    }

    /// Buffer the remaining stream in memory, turning this into a
    /// materialized body.
    ///
    /// Does nothing for bodies that are already materialized.
    pub async fn materialize(&mut self) -> Result<()> {
        match &self.state {
            BodyState::Materialized { .. } => return Ok(()),
            BodyState::Closed => return Err(RelayError::AlreadyClosed),
            BodyState::Exhausted => {
                self.state = BodyState::Materialized {
                    bytes: Bytes::new(),
                    read: false,
                };
                return Ok(());
            }
            BodyState::Streaming(_) => {}
        }

        let mut buffer = BytesMut::with_capacity(self.content_length.preallocation());
        while let Some(chunk) = self.next_chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        let bytes = buffer.freeze();
        self.content_length = ContentLength::Known(bytes.len() as u64);
        self.state = BodyState::Materialized { bytes, read: false };
        Ok(())
    }

    /// Collect the whole body.
    pub async fn bytes(mut self) -> Result<Bytes> {
        self.materialize().await?;
        match std::mem::replace(&mut self.state, BodyState::Closed) {
            BodyState::Materialized { bytes, .. } => Ok(bytes),
            _ => Err(RelayError::AlreadyClosed),
        }
    }

    /// Collect the whole body as UTF-8 text.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| RelayError::Decode(e.to_string()))
    }

    /// Collect the whole body and parse it as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Convert into a byte stream.
    ///
    /// A materialized body becomes a one-chunk stream; a closed body becomes a
    /// stream that yields [`RelayError::AlreadyClosed`].
    pub fn into_stream(mut self) -> ByteStream {
        match std::mem::replace(&mut self.state, BodyState::Exhausted) {
            BodyState::Streaming(stream) => stream,
            BodyState::Materialized { bytes, .. } => {
                stream::once(async move { Ok(bytes) }).boxed()
            }
            BodyState::Exhausted => stream::empty().boxed(),
            BodyState::Closed => {
                stream::once(async { Err(RelayError::AlreadyClosed) }).boxed()
            }
        }
    }

    /// Release the body without reading the rest of it.
    ///
    /// Closing twice fails with [`RelayError::AlreadyClosed`].
    pub fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            tracing::warn!(target: targets::BODY, "Body closed twice");
            return Err(RelayError::AlreadyClosed);
        }
        self.release("closed");
        self.state = BodyState::Closed;
        Ok(())
    }

    fn release(&mut self, reason: &'static str) {
        if let BodyState::Streaming(_) = self.state {
            tracing::trace!(target: targets::BODY, reason, "Releasing body stream");
            self.state = BodyState::Exhausted;
        }
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        self.release("dropped");
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            BodyState::Streaming(_) => "streaming",
            BodyState::Materialized { .. } => "materialized",
            BodyState::Exhausted => "exhausted",
            BodyState::Closed => "closed",
        };
        f.debug_struct("ResponseBody")
            .field("content_length", &self.content_length)
            .field("state", &state)
            .finish()
    }
}

/// A pull-based buffered reader over a [`ResponseBody`].
///
/// Pulls chunks only when the buffered bytes cannot satisfy a read.
pub struct BufferedSource {
    body: ResponseBody,
    buffer: BytesMut,
    eof: bool,
}

impl BufferedSource {
    /// Wrap a body.
    pub fn new(body: ResponseBody) -> Self {
        Self {
            body,
            buffer: BytesMut::new(),
            eof: false,
        }
    }

    /// Pull one more chunk into the buffer. Returns `false` at end of input.
    async fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        match self.body.next_chunk().await? {
            Some(chunk) => {
                self.buffer.extend_from_slice(&chunk);
                Ok(true)
            }
            None => {
                self.eof = true;
                Ok(false)
            }
        }
    }

    /// Check if every byte has been read.
    pub async fn exhausted(&mut self) -> Result<bool> {
        while self.buffer.is_empty() {
            if !self.fill().await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Read one line, without its `\n` or `\r\n` terminator.
    ///
    /// A final unterminated line is returned as is. Returns `None` at end of
    /// input.
    pub async fn read_line(&mut self) -> Result<Option<Bytes>> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buffer[scanned..].iter().position(|&b| b == b'\n') {
                let mut line = self.buffer.split_to(scanned + pos + 1);
                line.truncate(line.len() - 1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(Some(line.freeze()));
            }
            scanned = self.buffer.len();
            if !self.fill().await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.buffer.split().freeze()));
            }
        }
    }

    /// Read exactly `len` bytes.
    ///
    /// Returns `None` if the input ends first.
    pub async fn read_exact(&mut self, len: usize) -> Result<Option<Bytes>> {
        while self.buffer.len() < len {
            if !self.fill().await? {
                return Ok(None);
            }
        }
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Read up to the next occurrence of `delimiter`, consuming the delimiter
    /// but not returning it.
    ///
    /// Returns `None` if the input ends before the delimiter is found.
    pub async fn read_until(&mut self, delimiter: &[u8]) -> Result<Option<Bytes>> {
        if delimiter.is_empty() {
            return Ok(Some(Bytes::new()));
        }
        let mut scanned = 0;
        loop {
            if let Some(pos) = find(&self.buffer[scanned..], delimiter) {
                let found = self.buffer.split_to(scanned + pos).freeze();
                let _ = self.buffer.split_to(delimiter.len());
                return Ok(Some(found));
            }
            scanned = self.buffer.len().saturating_sub(delimiter.len() - 1);
            if !self.fill().await? {
                return Ok(None);
            }
        }
    }

    /// Check if the buffered input starts with `prefix`, pulling more input as
    /// needed. Nothing is consumed.
    pub async fn starts_with(&mut self, prefix: &[u8]) -> Result<bool> {
        while self.buffer.len() < prefix.len() {
            if !self.fill().await? {
                break;
            }
        }
        Ok(self.buffer.starts_with(prefix))
    }

    /// Discard `len` buffered bytes.
    pub fn skip(&mut self, len: usize) {
        let len = len.min(self.buffer.len());
        let _ = self.buffer.split_to(len);
    }
}

impl fmt::Debug for BufferedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedSource")
            .field("buffered", &self.buffer.len())
            .field("eof", &self.eof)
            .field("body", &self.body)
            .finish()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
