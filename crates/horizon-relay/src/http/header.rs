//! Ordered header collections.

use std::fmt;

/// A single HTTP header.
///
/// The name keeps the casing it was given; comparisons done through
/// [`Headers`] ignore ASCII case.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HttpHeader {
    /// Header name, as produced.
    pub name: String,
    /// Header value.
    pub value: String,
}

impl HttpHeader {
    /// Create a new header.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Check if this header has the given name, ignoring ASCII case.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for HttpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

impl<N: Into<String>, V: Into<String>> From<(N, V)> for HttpHeader {
    fn from((name, value): (N, V)) -> Self {
        Self::new(name, value)
    }
}

/// An ordered sequence of headers.
///
/// Duplicate names are allowed and keep their relative order. Lookups are
/// case-insensitive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<HttpHeader>,
}

impl Headers {
    /// Create an empty header sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(HttpHeader::new(name, value));
    }

    /// Append every header from `headers`.
    pub fn extend<I, H>(&mut self, headers: I)
    where
        I: IntoIterator<Item = H>,
        H: Into<HttpHeader>,
    {
        self.entries.extend(headers.into_iter().map(Into::into));
    }

    /// Replace the whole sequence.
    pub fn replace_all<I, H>(&mut self, headers: I)
    where
        I: IntoIterator<Item = H>,
        H: Into<HttpHeader>,
    {
        self.entries.clear();
        self.extend(headers);
    }

    /// Remove every header with the given name.
    pub fn remove_all(&mut self, name: &str) {
        self.entries.retain(|h| !h.is(name));
    }

    /// Value of the first header with the given name.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.is(name))
            .map(|h| h.value.as_str())
    }

    /// Values of every header with the given name, in order.
    pub fn values_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |h| h.is(name))
            .map(|h| h.value.as_str())
    }

    /// Check if a header with the given name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|h| h.is(name))
    }

    /// Iterate over headers in order.
    pub fn iter(&self) -> std::slice::Iter<'_, HttpHeader> {
        self.entries.iter()
    }

    /// Number of headers, counting duplicates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `Content-Type` value, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.value_of("Content-Type")
    }

    /// The `Content-Length` value, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.value_of("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }

    /// Copy headers from an `http` header map, in the map's iteration order.
    ///
    /// The map lowercases names and groups repeated names together, so
    /// headers interleaved on the wire (`A, B, A`) come back grouped
    /// (`a, a, b`). Values of one name keep their relative order.
    pub(crate) fn from_header_map(map: &http::HeaderMap) -> Self {
        let entries = map
            .iter()
            .map(|(name, value)| {
                HttpHeader::new(
                    name.as_str(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        Self { entries }
    }
}

impl<H: Into<HttpHeader>> FromIterator<H> for Headers {
    fn from_iter<I: IntoIterator<Item = H>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl IntoIterator for Headers {
    type Item = HttpHeader;
    type IntoIter = std::vec::IntoIter<HttpHeader>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a HttpHeader;
    type IntoIter = std::slice::Iter<'a, HttpHeader>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
