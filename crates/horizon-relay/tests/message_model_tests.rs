//! Integration tests for the HTTP message model.

use std::sync::Arc;

use horizon_relay::RelayError;
use horizon_relay::http::{
    BytesBody, ContentLength, Headers, HttpBody, HttpMethod, HttpPart, HttpRequest, HttpResponse,
    PartStream, ResponseBody,
};

#[test]
fn test_rebuild_round_trip() {
    let request = HttpRequest::builder(HttpMethod::Post, "https://api.example.com/graphql")
        .header("Accept", "application/json")
        .header("X-Trace-Id", "7")
        .body(BytesBody::text("{}"))
        .build();

    let copy = request.new_builder().build();
    assert_eq!(copy, request);

    let changed = request.new_builder().header("X-Extra", "1").build();
    assert_ne!(changed, request);
    assert_eq!(changed.headers().len(), 3);
    assert_eq!(request.headers().len(), 2);
    assert!(Arc::ptr_eq(
        changed.body().expect("body"),
        request.body().expect("body")
    ));
}

#[test]
fn test_get_with_body_is_allowed() {
    let request = HttpRequest::builder(HttpMethod::Get, "https://api.example.com")
        .body(BytesBody::text("payload"))
        .build();
    assert_eq!(request.method(), HttpMethod::Get);
    assert!(request.body().is_some());
}

#[test]
fn test_no_body_clears_body() {
    let request = HttpRequest::builder(HttpMethod::Post, "https://api.example.com")
        .body(BytesBody::text("payload"))
        .build();
    let cleared = request.new_builder().no_body().build();
    assert!(cleared.body().is_none());
}

#[test]
fn test_headers_are_case_insensitive() {
    let request = HttpRequest::builder(HttpMethod::Get, "https://api.example.com")
        .header("Content-Type", "application/json")
        .header("x-apollo-operation-name", "Viewer")
        .build();

    assert_eq!(request.headers().value_of("content-type"), Some("application/json"));
    assert_eq!(request.headers().value_of("X-Apollo-Operation-Name"), Some("Viewer"));
    assert!(request.headers().contains("CONTENT-TYPE"));
    assert!(!request.headers().contains("Authorization"));
}

#[test]
fn test_replace_headers() {
    let request = HttpRequest::builder(HttpMethod::Get, "https://api.example.com")
        .header("A", "1")
        .replace_headers([("B", "2")])
        .build();
    assert_eq!(request.headers().len(), 1);
    assert_eq!(request.headers().value_of("b"), Some("2"));
}

#[test]
fn test_bytes_body_json() {
    let body = BytesBody::json(&serde_json::json!({"query": "{ a }"})).expect("serialize");
    assert_eq!(body.content_type(), "application/json");
    assert_eq!(body.content_length(), ContentLength::Known(17));
    assert_eq!(&body.to_bytes().expect("bytes")[..], br#"{"query":"{ a }"}"#);
}

#[test]
fn test_content_length_unknown_is_not_zero() {
    assert_eq!(ContentLength::Unknown.known(), None);
    assert!(!ContentLength::Unknown.is_known());
    assert_eq!(ContentLength::from(Some(0)), ContentLength::Known(0));
}

#[test]
fn test_response_body_then_body_is_rejected() {
    let err = HttpResponse::builder(200)
        .body_bytes("a")
        .body_bytes("b")
        .build()
        .unwrap_err();
    assert!(matches!(err, RelayError::Configuration(_)));
}

#[test]
fn test_response_body_then_parts_is_rejected() {
    let err = HttpResponse::builder(200)
        .body_bytes("a")
        .parts(PartStream::new(ResponseBody::empty(), "-"))
        .build()
        .unwrap_err();
    assert!(matches!(err, RelayError::Configuration(_)));
}

#[test]
fn test_response_parts_then_body_is_rejected() {
    let err = HttpResponse::builder(200)
        .parts(PartStream::new(ResponseBody::empty(), "-"))
        .body_bytes("a")
        .build()
        .unwrap_err();
    assert!(matches!(err, RelayError::Configuration(_)));
}

#[test]
fn test_response_parts_then_parts_is_rejected() {
    let err = HttpResponse::builder(200)
        .parts(PartStream::new(ResponseBody::empty(), "-"))
        .parts(PartStream::new(ResponseBody::empty(), "-"))
        .build()
        .unwrap_err();
    assert!(matches!(err, RelayError::Configuration(_)));
}

#[test]
fn test_response_without_payload() {
    let response = HttpResponse::builder(204).build().expect("build");
    assert!(response.is_success());
    assert!(!response.is_multipart());
    assert!(response.into_body().is_none());
}

#[test]
fn test_take_parts_twice() {
    let mut response = HttpResponse::builder(200)
        .parts(PartStream::new(ResponseBody::empty(), "-"))
        .build()
        .expect("build");

    assert!(response.take_parts().is_ok());
    assert!(response.is_multipart());
    assert!(matches!(
        response.take_parts(),
        Err(RelayError::AlreadyConsumed(_))
    ));
}

#[test]
fn test_take_parts_of_single_body() {
    let mut response = HttpResponse::builder(200)
        .body_bytes("{}")
        .build()
        .expect("build");
    assert!(matches!(
        response.take_parts(),
        Err(RelayError::Configuration(_))
    ));
    assert!(response.body().is_some());
}

#[test]
fn test_part_body_set_twice_is_rejected() {
    let err = HttpPart::builder()
        .body(ResponseBody::empty())
        .body(ResponseBody::empty())
        .build()
        .unwrap_err();
    assert!(matches!(err, RelayError::Configuration(_)));
}

#[test]
fn test_headers_from_tuples() {
    let headers: Headers = [("Accept", "a"), ("accept", "b")].into_iter().collect();
    assert_eq!(headers.values_of("ACCEPT").collect::<Vec<_>>(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_materialized_body_reads() {
    let mut body = ResponseBody::from_bytes("hello");
    assert!(!body.is_streaming());
    assert_eq!(body.content_length(), ContentLength::Known(5));
    assert_eq!(body.as_bytes().map(|b| &b[..]), Some(&b"hello"[..]));

    body.close().expect("close");
    assert!(matches!(body.close(), Err(RelayError::AlreadyClosed)));
    assert!(matches!(
        body.next_chunk().await,
        Err(RelayError::AlreadyClosed)
    ));
}
