//! Response builders for the API.

use crate::router::RelayedResponse;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::error::ApiError;

/// Build a JSON response with status code.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_string(body) {
        Ok(json) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(json)))
            .expect("response builder should not fail"),
        Err(e) => ApiError::new(
            "SERIALIZATION_ERROR",
            format!("Serialization error: {}", e),
            StatusCode::INTERNAL_SERVER_ERROR,
        )
        .into_response(),
    }
}

/// Build a 200 OK JSON response.
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a 200 OK response with an empty body.
pub fn ok_empty() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .body(Full::new(Bytes::new()))
        .expect("response builder should not fail")
}

/// Relay the leader's response to a forwarded write unchanged.
pub fn relayed(relayed: RelayedResponse) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(relayed.body));
    *response.status_mut() = relayed.status;
    if let Some(content_type) = relayed.content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
}

/// Build a 404 Not Found response.
pub fn not_found() -> Response<Full<Bytes>> {
    ApiError::new("NOT_FOUND", "Not found", StatusCode::NOT_FOUND).into_response()
}

/// Build a 405 Method Not Allowed response.
pub fn method_not_allowed(allowed: &[&str]) -> Response<Full<Bytes>> {
    let mut response = ApiError::new(
        "METHOD_NOT_ALLOWED",
        format!("Method not allowed. Allowed: {}", allowed.join(", ")),
        StatusCode::METHOD_NOT_ALLOWED,
    )
    .into_response();

    if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}
