//! Integration tests for cancellation and resource release.

mod common;

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;

use horizon_relay::http::{ContentLength, HttpResponse};
use horizon_relay::{
    FetchPolicy, FetchSourceType, GraphQLRequest, InterceptorEvent, RelayClient, RelayError,
};
use horizon_relay_core::Dispatcher;

use common::{FakeHttpEngine, OpenStreams, multipart_response};

fn query() -> GraphQLRequest {
    GraphQLRequest::query("query Feed { feed { id } }").operation_name("Feed")
}

fn client(engine: std::sync::Arc<FakeHttpEngine>) -> RelayClient {
    RelayClient::builder("https://api.example.com/graphql")
        .http_engine(engine)
        .fetch_policy(FetchPolicy::NetworkOnly)
        .build()
        .expect("Failed to build client")
}

/// An engine whose response body delivers one chunk and then stalls.
fn stalled_body_engine(open: &OpenStreams) -> std::sync::Arc<FakeHttpEngine> {
    let open = open.clone();
    FakeHttpEngine::new(move |_| {
        let stream = open.hanging_stream(vec![Bytes::from_static(br#"{"data":"#)]);
        HttpResponse::builder(200)
            .header("Content-Type", "application/json")
            .body_stream(stream, ContentLength::Unknown)
            .build()
    })
}

#[tokio::test]
async fn test_cancel_in_flight_request() {
    let engine = FakeHttpEngine::hanging();
    let client = client(engine.clone());

    let mut call = client.query(query()).execute();
    assert_eq!(
        call.next().await,
        Some(InterceptorEvent::Fetch(FetchSourceType::Network))
    );

    call.cancel();
    assert_eq!(
        call.next().await,
        Some(InterceptorEvent::Failed(RelayError::Cancelled))
    );
    assert_eq!(call.next().await, None);
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn test_cancel_releases_streaming_body() {
    let open = OpenStreams::default();
    let client = client(stalled_body_engine(&open));

    let mut call = client.query(query()).execute();
    let cancel = call.cancel_handle();

    let stalled = tokio::time::timeout(Duration::from_millis(50), call.next()).await;
    // The fetch marker arrives; reading the body then stalls.
    assert_eq!(
        stalled.expect("fetch marker"),
        Some(InterceptorEvent::Fetch(FetchSourceType::Network))
    );
    assert!(
        tokio::time::timeout(Duration::from_millis(50), call.next())
            .await
            .is_err()
    );
    assert_eq!(open.count(), 1);

    cancel.cancel();
    assert!(cancel.is_cancelled());
    let rest: Vec<_> = call.collect().await;
    assert_eq!(rest, vec![InterceptorEvent::Failed(RelayError::Cancelled)]);
    assert_eq!(open.count(), 0);
}

#[tokio::test]
async fn test_dropping_call_releases_streaming_body() {
    let open = OpenStreams::default();
    let client = client(stalled_body_engine(&open));

    let mut call = client.query(query()).execute();
    let _ = tokio::time::timeout(Duration::from_millis(50), async {
        while call.next().await.is_some() {}
    })
    .await;
    assert_eq!(open.count(), 1);

    drop(call);
    assert_eq!(open.count(), 0);
}

#[tokio::test]
async fn test_cancel_between_multipart_parts() {
    let open = OpenStreams::default();
    let first = r#"{"data":{"feed":[]},"hasNext":true}"#;
    let head = format!(
        "\r\n---\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{first}\r\n---\r\n",
        first.len()
    );
    let engine = {
        let open = open.clone();
        FakeHttpEngine::new(move |_| {
            multipart_response(open.hanging_stream(vec![Bytes::from(head.clone())]))
        })
    };
    let client = client(engine);

    let mut call = client.query(query()).execute();
    assert_eq!(
        call.next().await,
        Some(InterceptorEvent::Fetch(FetchSourceType::Network))
    );
    match call.next().await {
        Some(InterceptorEvent::Response(response)) => assert!(response.has_next()),
        other => panic!("expected the first payload, got {other:?}"),
    }
    assert_eq!(open.count(), 1);

    call.cancel();
    assert_eq!(
        call.next().await,
        Some(InterceptorEvent::Failed(RelayError::Cancelled))
    );
    assert_eq!(open.count(), 0);
}

#[tokio::test]
async fn test_cancel_on_runtime_dispatcher() {
    let engine = FakeHttpEngine::hanging();
    let client = RelayClient::builder("https://api.example.com/graphql")
        .http_engine(engine)
        .dispatcher(Dispatcher::current())
        .build()
        .expect("Failed to build client");

    let call = client
        .query(query())
        .fetch_policy(FetchPolicy::NetworkOnly)
        .execute();
    let cancel = call.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    assert_eq!(call.response().await.unwrap_err(), RelayError::Cancelled);
}

#[tokio::test]
async fn test_cancel_after_completion_is_noop() {
    let engine = FakeHttpEngine::with_data(serde_json::json!({"feed": []}));
    let client = client(engine);

    let mut call = client.query(query()).execute();
    let mut events = Vec::new();
    while let Some(event) = call.next().await {
        events.push(event);
    }
    call.cancel();

    assert_eq!(events.last(), Some(&InterceptorEvent::Completed));
    assert_eq!(call.next().await, None);
}
