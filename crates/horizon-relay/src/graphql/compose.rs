//! Turning operations into HTTP requests.

use serde_json::{Map, Value};

use super::request::Operation;
use crate::error::{RelayError, Result};
use crate::http::{BytesBody, Headers, HttpMethod, HttpRequest};

/// `Accept` header sent when the caller did not set one.
///
/// Advertises multipart incremental delivery first and plain JSON as the
/// fallback.
pub const DEFAULT_ACCEPT: &str = "multipart/mixed; deferSpec=20220824, application/json";

/// Build the HTTP request for an operation.
///
/// `POST` sends a JSON body with `query`, `operationName`, `variables` and
/// `extensions`. `GET` encodes the same members as URL query parameters,
/// with `variables` and `extensions` serialized as JSON strings.
///
/// `headers` are copied verbatim; `Accept` defaults to [`DEFAULT_ACCEPT`].
pub fn compose_http_request(
    operation: &dyn Operation,
    url: &str,
    method: HttpMethod,
    headers: &Headers,
) -> Result<HttpRequest> {
    let mut builder = match method {
        HttpMethod::Post => {
            let body = BytesBody::json(&Value::Object(payload(operation)))?;
            HttpRequest::builder(HttpMethod::Post, url).body(body)
        }
        HttpMethod::Get => HttpRequest::builder(HttpMethod::Get, url_with_params(operation, url)?),
    };

    if !headers.contains("Accept") {
        builder = builder.header("Accept", DEFAULT_ACCEPT);
    }
    Ok(builder.headers(headers.iter().cloned()).build())
}

fn payload(operation: &dyn Operation) -> Map<String, Value> {
    let mut payload = Map::new();
    if !operation.name().is_empty() {
        payload.insert("operationName".into(), operation.name().into());
    }
    payload.insert("query".into(), operation.document().into());
    if let Some(variables) = operation.variables() {
        payload.insert("variables".into(), variables.clone());
    }
    if let Some(extensions) = operation.extensions() {
        payload.insert("extensions".into(), extensions.clone());
    }
    payload
}

fn url_with_params(operation: &dyn Operation, url: &str) -> Result<String> {
    let mut url = url::Url::parse(url)?;
    {
        let mut params = url.query_pairs_mut();
        params.append_pair("query", operation.document());
        if !operation.name().is_empty() {
            params.append_pair("operationName", operation.name());
        }
        if let Some(variables) = operation.variables() {
            params.append_pair("variables", &variables.to_string());
        }
        if let Some(extensions) = operation.extensions() {
            params.append_pair("extensions", &extensions.to_string());
        }
    }
    if url.cannot_be_a_base() {
        return Err(RelayError::InvalidUrl(url.to_string()));
    }
    Ok(url.into())
}
