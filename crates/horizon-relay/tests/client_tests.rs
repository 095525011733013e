//! Integration tests for the client facade and custom interceptors.

mod common;

use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use horizon_relay::interceptor::Chain;
use horizon_relay::{
    CallBack, EventSink, FetchPolicy, FetchSourceType, GraphQLRequest, HttpMethod, Interceptor,
    InterceptorEvent, InterceptorRequest, InterceptorResponse, MemoryCache, RelayClient,
    RelayError,
};

use horizon_relay_core::{AsyncRuntime, AsyncRuntimeConfig};

use common::{FakeHttpEngine, MULTIPART_CONTENT_TYPE, OpenStreams, multipart_body, multipart_response};

fn viewer_query() -> GraphQLRequest {
    GraphQLRequest::query("query Viewer { viewer { login } }").operation_name("Viewer")
}

#[tokio::test]
async fn test_query_over_http() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header_exists("accept"))
        .and(body_partial_json(json!({
            "operationName": "Viewer",
            "query": "query Viewer { viewer { login } }"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"viewer": {"login": "ada"}}})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RelayClient::builder(format!("{}/graphql", mock_server.uri()))
        .build()
        .expect("Failed to build client");

    let response = client.query(viewer_query()).response().await.expect("query");
    assert_eq!(response.data(), Some(&json!({"viewer": {"login": "ada"}})));
    assert_eq!(response.status_code, Some(200));
    assert!(!response.from_cache);
}

#[tokio::test]
async fn test_query_over_http_get() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/graphql"))
        .and(query_param("operationName", "Viewer"))
        .and(query_param("variables", r#"{"first":2}"#))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"viewer": {"login": "ada"}}})),
        )
        .mount(&mock_server)
        .await;

    let client = RelayClient::builder(format!("{}/graphql", mock_server.uri()))
        .http_method(HttpMethod::Get)
        .build()
        .expect("Failed to build client");

    let response = client
        .query(viewer_query().variable("first", 2))
        .response()
        .await
        .expect("query");
    assert!(response.has_data());
}

#[tokio::test]
async fn test_http_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&mock_server)
        .await;

    let client = RelayClient::builder(mock_server.uri())
        .build()
        .expect("Failed to build client");

    let err = client.query(viewer_query()).response().await.unwrap_err();
    assert_eq!(
        err,
        RelayError::HttpStatus {
            status: 503,
            message: Some("Service Unavailable".into()),
        }
    );
}

#[tokio::test]
async fn test_incremental_delivery_over_http() {
    let mock_server = MockServer::start().await;

    let first = r#"{"data":{"viewer":{"login":"ada"}},"hasNext":true}"#;
    let second = r#"{"incremental":[{"data":{"bio":"math"},"path":["viewer"]}],"hasNext":true}"#;
    let last = r#"{"hasNext":false}"#;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(multipart_body(&[first, second, last]), MULTIPART_CONTENT_TYPE),
        )
        .mount(&mock_server)
        .await;

    let client = RelayClient::builder(mock_server.uri())
        .build()
        .expect("Failed to build client");

    let snapshots: Vec<_> = client
        .query(viewer_query())
        .execute()
        .filter_map(|event| async move {
            match event {
                InterceptorEvent::Response(response) => response.data().cloned(),
                _ => None,
            }
        })
        .collect()
        .await;

    assert_eq!(
        snapshots,
        vec![
            json!({"viewer": {"login": "ada"}}),
            json!({"viewer": {"login": "ada", "bio": "math"}}),
        ]
    );
}

#[tokio::test]
async fn test_multipart_stream_released_after_completion() {
    let open = OpenStreams::default();
    let engine = {
        let open = open.clone();
        FakeHttpEngine::new(move |_| {
            let body = multipart_body(&[r#"{"data":{"a":1}}"#]);
            multipart_response(open.stream(vec![Bytes::from(body)]))
        })
    };
    let client = RelayClient::builder("https://api.example.com/graphql")
        .http_engine(engine)
        .build()
        .expect("Failed to build client");

    let response = client.query(viewer_query()).response().await.expect("query");
    assert_eq!(response.data(), Some(&json!({"a": 1})));
    assert_eq!(open.count(), 0);
}

#[tokio::test]
async fn test_graphql_errors_are_delivered_as_responses() {
    let engine = FakeHttpEngine::new(|_| {
        common::json_response(&json!({
            "data": null,
            "errors": [{"message": "Not authorized", "path": ["viewer"]}]
        }))
    });
    let client = RelayClient::builder("https://api.example.com/graphql")
        .http_engine(engine)
        .build()
        .expect("Failed to build client");

    let response = client.query(viewer_query()).response().await.expect("query");
    assert!(!response.has_data());
    let graphql = response.response.expect("payload");
    assert_eq!(graphql.error_message().as_deref(), Some("Not authorized"));
}

#[tokio::test]
async fn test_default_and_call_headers() {
    let engine = FakeHttpEngine::with_data(json!({"viewer": null}));
    let client = RelayClient::builder("https://api.example.com/graphql")
        .http_engine(engine.clone())
        .header("Authorization", "Bearer token")
        .build()
        .expect("Failed to build client");

    client
        .query(viewer_query())
        .header("X-Trace-Id", "42")
        .response()
        .await
        .expect("query");

    let request = engine.last_request().expect("request");
    assert_eq!(request.headers().value_of("authorization"), Some("Bearer token"));
    assert_eq!(request.headers().value_of("x-trace-id"), Some("42"));
    assert_eq!(request.url(), "https://api.example.com/graphql");
}

/// Adds a header and records every event it relays.
struct Recorder {
    seen: Arc<Mutex<Vec<InterceptorEvent>>>,
}

impl Interceptor for Recorder {
    fn intercept(
        &self,
        request: InterceptorRequest,
        chain: Chain,
        sink: EventSink,
    ) -> BoxFuture<'static, ()> {
        let seen = self.seen.clone();
        Box::pin(async move {
            let request = request.to_builder().header("X-Recorded", "yes").build();
            let mut events = chain.proceed(request);
            while let Some(event) = events.next().await {
                seen.lock().push(event.clone());
                if sink.emit(event).is_err() {
                    return;
                }
            }
        })
    }
}

#[tokio::test]
async fn test_custom_interceptor_sees_every_leg() {
    let engine = FakeHttpEngine::with_data(json!({"viewer": {"login": "ada"}}));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = RelayClient::builder("https://api.example.com/graphql")
        .http_engine(engine.clone())
        .normalized_cache(Arc::new(MemoryCache::default()))
        .add_interceptor(Arc::new(Recorder { seen: seen.clone() }))
        .build()
        .expect("Failed to build client");

    client
        .query(viewer_query())
        .fetch_policy(FetchPolicy::CacheFirst)
        .response()
        .await
        .expect("query");

    let seen = seen.lock().clone();
    // The cache leg fails with a miss, the network leg completes.
    assert!(seen.contains(&InterceptorEvent::Fetch(FetchSourceType::Cache)));
    assert!(seen.contains(&InterceptorEvent::Fetch(FetchSourceType::Network)));
    assert!(seen.iter().any(|e| matches!(e, InterceptorEvent::Failed(err) if err.is_cache_miss())));
    assert_eq!(seen.last(), Some(&InterceptorEvent::Completed));

    let request = engine.last_request().expect("request");
    assert_eq!(request.headers().value_of("X-Recorded"), Some("yes"));
}

/// Forwards events to a channel.
struct ChannelCallBack {
    events: mpsc::UnboundedSender<String>,
}

impl CallBack for ChannelCallBack {
    fn on_fetch(&self, source: FetchSourceType) {
        let _ = self.events.send(format!("fetch {source:?}"));
    }

    fn on_response(&self, response: InterceptorResponse) {
        let _ = self.events.send(format!("response {}", response.has_data()));
    }

    fn on_completed(&self) {
        let _ = self.events.send("completed".to_string());
    }

    fn on_failure(&self, error: RelayError) {
        let _ = self.events.send(format!("failure {error}"));
    }
}

#[tokio::test]
async fn test_enqueue_delivers_callbacks() {
    let engine = FakeHttpEngine::with_data(json!({"viewer": {"login": "ada"}}));
    let client = RelayClient::builder("https://api.example.com/graphql")
        .http_engine(engine)
        .fetch_policy(FetchPolicy::NetworkOnly)
        .build()
        .expect("Failed to build client");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = client
        .query(viewer_query())
        .enqueue(Arc::new(ChannelCallBack { events: tx }));

    let mut received = Vec::new();
    while let Some(event) = rx.recv().await {
        received.push(event);
    }
    assert_eq!(received, vec!["fetch Network", "response true", "completed"]);
    assert!(!handle.is_cancelled());
}

#[test]
fn test_enqueue_without_runtime_fails() {
    let client = RelayClient::builder("https://api.example.com/graphql")
        .build()
        .expect("Failed to build client");

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .query(viewer_query())
        .enqueue(Arc::new(ChannelCallBack { events: tx }));

    let event = rx.try_recv().expect("failure delivered");
    assert!(event.starts_with("failure Configuration error"));
}

#[tokio::test]
async fn test_dispose() {
    let engine = FakeHttpEngine::with_data(json!({"viewer": null}));
    let client = RelayClient::builder("https://api.example.com/graphql")
        .http_engine(engine.clone())
        .build()
        .expect("Failed to build client");

    client.dispose();
    client.dispose();
    assert!(client.is_disposed());
    assert!(engine.is_disposed());

    let err = client.query(viewer_query()).response().await.unwrap_err();
    assert!(matches!(err, RelayError::Configuration(_)));
    assert_eq!(engine.calls(), 0);
}

#[test]
fn test_builder_rejects_invalid_url() {
    let err = RelayClient::builder("not a url").build().unwrap_err();
    assert!(matches!(err, RelayError::InvalidUrl(_)));
}

#[test]
fn test_default_policies() {
    let client = RelayClient::builder("https://api.example.com/graphql")
        .build()
        .expect("Failed to build client");
    assert_eq!(client.default_fetch_policy(), FetchPolicy::CacheFirst);
}

#[test]
fn test_calls_on_owned_runtime() {
    let runtime = AsyncRuntime::new(AsyncRuntimeConfig::multi_threaded().with_worker_threads(2))
        .expect("Failed to create runtime");
    let engine = FakeHttpEngine::with_data(json!({"viewer": {"login": "ada"}}));
    let client = RelayClient::builder("https://api.example.com/graphql")
        .http_engine(engine.clone())
        .dispatcher(runtime.dispatcher())
        .build()
        .expect("Failed to build client");

    let response = runtime
        .block_on(client.query(viewer_query()).response())
        .expect("query");
    assert!(response.has_data());

    // enqueue spawns onto the client's runtime without an ambient one.
    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .query(viewer_query())
        .fetch_policy(FetchPolicy::NetworkOnly)
        .enqueue(Arc::new(ChannelCallBack { events: tx }));
    let last = runtime.block_on(async move {
        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        last
    });
    assert_eq!(last.as_deref(), Some("completed"));
    assert_eq!(engine.calls(), 2);

    runtime.shutdown();
}
