//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::Value;

use horizon_relay::http::{
    ByteStream, ContentLength, HttpEngine, HttpRequest, HttpResponse, PartStream, ResponseBody,
};
use horizon_relay::{CacheRead, NormalizedCache, RelayError, Result};

/// Content type used by servers that implement incremental delivery.
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/mixed; boundary=\"-\"; deferSpec=20220824";

/// Counts byte streams that are still alive.
#[derive(Clone, Default)]
pub struct OpenStreams(Arc<AtomicUsize>);

impl OpenStreams {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn open(&self) -> StreamGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        StreamGuard(self.0.clone())
    }

    /// A stream yielding `chunks` and then ending.
    pub fn stream(&self, chunks: Vec<Bytes>) -> ByteStream {
        self.build(chunks, false)
    }

    /// A stream yielding `chunks` and then never producing anything again.
    pub fn hanging_stream(&self, chunks: Vec<Bytes>) -> ByteStream {
        self.build(chunks, true)
    }

    fn build(&self, chunks: Vec<Bytes>, hang: bool) -> ByteStream {
        let guard = self.open();
        stream::unfold(
            (chunks.into_iter(), guard),
            move |(mut chunks, guard)| async move {
                match chunks.next() {
                    Some(chunk) => Some((Ok(chunk), (chunks, guard))),
                    None if hang => std::future::pending().await,
                    None => None,
                }
            },
        )
        .boxed()
    }
}

struct StreamGuard(Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Frame `payloads` the way incremental delivery servers do, with boundary `-`.
pub fn multipart_body(payloads: &[&str]) -> String {
    let mut body = String::from("\r\n---");
    for payload in payloads {
        body.push_str("\r\nContent-Type: application/json; charset=utf-8\r\n");
        body.push_str(&format!("Content-Length: {}\r\n\r\n", payload.len()));
        body.push_str(payload);
        body.push_str("\r\n---");
    }
    body.push_str("--\r\n");
    body
}

/// A 200 response with a JSON body.
pub fn json_response(body: &Value) -> Result<HttpResponse> {
    HttpResponse::builder(200)
        .header("Content-Type", "application/json")
        .body_bytes(body.to_string())
        .build()
}

/// A 200 multipart response decoding `stream` lazily.
pub fn multipart_response(stream: ByteStream) -> Result<HttpResponse> {
    let body = ResponseBody::from_stream(stream, ContentLength::Unknown);
    HttpResponse::builder(200)
        .header("Content-Type", MULTIPART_CONTENT_TYPE)
        .parts(PartStream::from_content_type(body, MULTIPART_CONTENT_TYPE)?)
        .build()
}

type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync>;

/// An engine answering from a closure and recording every request.
pub struct FakeHttpEngine {
    respond: Responder,
    requests: Mutex<Vec<HttpRequest>>,
    hang: bool,
    disposed: AtomicBool,
}

impl FakeHttpEngine {
    pub fn new(respond: impl Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
            hang: false,
            disposed: AtomicBool::new(false),
        })
    }

    /// Always answer with `data` under a 200 status.
    pub fn with_data(data: Value) -> Arc<Self> {
        let body = serde_json::json!({ "data": data });
        Self::new(move |_| json_response(&body))
    }

    /// Always fail with `error`.
    pub fn failing(error: RelayError) -> Arc<Self> {
        Self::new(move |_| Err(error.clone()))
    }

    /// Never answer.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(|_| Err(RelayError::Protocol("unreachable".into()))),
            requests: Mutex::new(Vec::new()),
            hang: true,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl HttpEngine for FakeHttpEngine {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        let result = (!self.hang).then(|| (self.respond)(&request));
        self.requests.lock().push(request);
        Box::pin(async move {
            match result {
                Some(result) => result,
                None => std::future::pending().await,
            }
        })
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// A cache whose every read and write fails with a storage fault.
#[derive(Default)]
pub struct FailingCache {
    reads: AtomicUsize,
}

impl FailingCache {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl NormalizedCache for FailingCache {
    fn read(&self, _key: &str) -> Result<CacheRead> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Err(RelayError::Cache("disk unavailable".into()))
    }

    fn write(&self, _key: &str, _data: Value) -> Result<()> {
        Err(RelayError::Cache("disk unavailable".into()))
    }
}
