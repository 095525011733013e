//! Integration tests for multipart response decoding.

mod common;

use bytes::Bytes;
use futures_util::StreamExt;

use horizon_relay::RelayError;
use horizon_relay::http::{ContentLength, PartStream, ResponseBody};

use common::{OpenStreams, multipart_body};

const FIRST: &str = r#"{"data":{"viewer":{"id":"1"}},"hasNext":true}"#;
const SECOND: &str = r#"{"incremental":[{"data":{"login":"ada"},"path":["viewer"]}],"hasNext":false}"#;

fn streamed(open: &OpenStreams, body: &str, chunk_size: usize) -> ResponseBody {
    let chunks = body
        .as_bytes()
        .chunks(chunk_size)
        .map(Bytes::copy_from_slice)
        .collect();
    ResponseBody::from_stream(open.stream(chunks), ContentLength::Unknown)
}

#[tokio::test]
async fn test_two_parts_with_content_length() {
    let body = ResponseBody::from_bytes(multipart_body(&[FIRST, SECOND]));
    let mut parts = PartStream::new(body, "-");

    let first = parts.next_part().await.expect("first part").expect("decode");
    assert_eq!(first.content_type(), Some("application/json; charset=utf-8"));
    assert_eq!(first.content_length(), ContentLength::Known(FIRST.len() as u64));
    assert_eq!(first.into_body().text().await.expect("text"), FIRST);

    let second = parts.next_part().await.expect("second part").expect("decode");
    assert_eq!(second.into_body().text().await.expect("text"), SECOND);

    assert!(parts.next_part().await.is_none());
}

#[tokio::test]
async fn test_parts_across_small_chunks() {
    let open = OpenStreams::default();
    let body = streamed(&open, &multipart_body(&[FIRST, SECOND]), 3);
    let parts: Vec<_> = PartStream::new(body, "-").collect().await;

    assert_eq!(parts.len(), 2);
    assert!(parts.iter().all(Result::is_ok));
    assert_eq!(open.count(), 0);
}

#[tokio::test]
async fn test_empty_part_list() {
    let open = OpenStreams::default();
    let body = streamed(&open, "\r\n-----\r\n", 4);
    let mut parts = PartStream::new(body, "-");

    assert!(parts.next_part().await.is_none());
    assert_eq!(open.count(), 0);
}

#[tokio::test]
async fn test_parts_are_decoded_lazily() {
    let open = OpenStreams::default();
    // The first part and its closing boundary; the rest never arrives.
    let head = format!(
        "\r\n---\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{FIRST}\r\n---\r\n",
        FIRST.len()
    );
    let stream = open.hanging_stream(vec![Bytes::from(head)]);
    let mut parts = PartStream::new(ResponseBody::from_stream(stream, ContentLength::Unknown), "-");

    let first = parts.next_part().await.expect("first part").expect("decode");
    assert_eq!(first.into_body().text().await.expect("text"), FIRST);
    assert_eq!(open.count(), 1);

    drop(parts);
    assert_eq!(open.count(), 0);
}

#[tokio::test]
async fn test_truncated_body_is_malformed() {
    let open = OpenStreams::default();
    let body = streamed(
        &open,
        "\r\n---\r\nContent-Type: application/json\r\nContent-Length: 40\r\n\r\n{\"data\":",
        8,
    );
    let mut parts = PartStream::new(body, "-");

    let err = parts.next_part().await.expect("error").unwrap_err();
    assert!(matches!(err, RelayError::MalformedMultipart(_)));
    assert!(parts.next_part().await.is_none());
    assert_eq!(open.count(), 0);
}

#[tokio::test]
async fn test_missing_boundary_is_malformed() {
    let body = ResponseBody::from_bytes(r#"{"data":{}}"#);
    let mut parts = PartStream::new(body, "-");

    let err = parts.next_part().await.expect("error").unwrap_err();
    assert!(matches!(err, RelayError::MalformedMultipart(_)));
}

#[tokio::test]
async fn test_error_keeps_earlier_parts() {
    let framed = format!(
        "\r\n---\r\nContent-Length: {}\r\n\r\n{FIRST}\r\n---\r\nbroken header\r\n\r\n{{}}\r\n-----\r\n",
        FIRST.len()
    );
    let mut parts = PartStream::new(ResponseBody::from_bytes(framed), "-");

    let first = parts.next_part().await.expect("first part").expect("decode");
    let err = parts.next_part().await.expect("error").unwrap_err();
    assert!(matches!(err, RelayError::MalformedMultipart(_)));
    assert_eq!(first.into_body().text().await.expect("text"), FIRST);
}

#[test]
fn test_content_type_without_boundary() {
    let err = PartStream::from_content_type(ResponseBody::empty(), "multipart/mixed").unwrap_err();
    assert!(matches!(err, RelayError::MalformedMultipart(_)));
}
