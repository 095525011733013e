//! Request bodies.

use std::fmt;
use std::io;

use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;

/// Declared length of a body.
///
/// `Unknown` is a real state and is never treated as zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ContentLength {
    /// The exact number of bytes is known up front.
    Known(u64),
    /// The length is not known until the body has been read.
    #[default]
    Unknown,
}

impl ContentLength {
    /// The known length, if any.
    pub fn known(self) -> Option<u64> {
        match self {
            Self::Known(len) => Some(len),
            Self::Unknown => None,
        }
    }

    /// Check if the length is known.
    pub fn is_known(self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Buffer capacity to reserve before reading a body of this length.
    ///
    /// Declared lengths come from the peer, so the reservation is capped at
    /// [`MAX_PREALLOCATION`]; the buffer grows with the bytes actually read.
    pub(crate) fn preallocation(self) -> usize {
        self.known()
            .map_or(0, |len| len.min(MAX_PREALLOCATION as u64) as usize)
    }
}

/// Upper bound on the capacity reserved up front from a declared length.
pub(crate) const MAX_PREALLOCATION: usize = 64 * 1024;

impl From<Option<u64>> for ContentLength {
    fn from(len: Option<u64>) -> Self {
        len.map_or(Self::Unknown, Self::Known)
    }
}

impl fmt::Display for ContentLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(len) => write!(f, "{len}"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A payload that can be attached to a request.
///
/// `write_to` must be repeatable: a request may be written for logging or
/// retried before it is finally sent.
pub trait HttpBody: Send + Sync {
    /// The body's media type.
    fn content_type(&self) -> &str;

    /// The body's length.
    fn content_length(&self) -> ContentLength;

    /// Write the full body to `sink`.
    fn write_to(&self, sink: &mut dyn io::Write) -> io::Result<()>;

    /// Collect the body into a single buffer.
    fn to_bytes(&self) -> io::Result<Bytes> {
        let mut buffer = Vec::with_capacity(self.content_length().preallocation());
        self.write_to(&mut buffer)?;
        Ok(Bytes::from(buffer))
    }
}

impl fmt::Debug for dyn HttpBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBody")
            .field("content_type", &self.content_type())
            .field("content_length", &self.content_length())
            .finish()
    }
}

/// An in-memory request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytesBody {
    content_type: String,
    bytes: Bytes,
}

impl BytesBody {
    /// Create a body from raw bytes.
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Create a JSON body from a serializable value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::new("application/json", bytes))
    }

    /// Create a UTF-8 text body.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new("text/plain; charset=utf-8", text.into())
    }

    /// The raw bytes of the body.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

impl HttpBody for BytesBody {
    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn content_length(&self) -> ContentLength {
        ContentLength::Known(self.bytes.len() as u64)
    }

    fn write_to(&self, sink: &mut dyn io::Write) -> io::Result<()> {
        sink.write_all(&self.bytes)
    }

    fn to_bytes(&self) -> io::Result<Bytes> {
        Ok(self.bytes.clone())
    }
}
