//! API error type and KvError → HTTP status mapping.

use crate::error::KvError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// API error with HTTP status code and error code.
#[derive(Debug)]
pub struct ApiError {
    /// Error code (e.g., "NOT_FOUND").
    pub code: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// HTTP status code.
    pub status: StatusCode,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(code: &'static str, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            code,
            message: message.into(),
            status,
        }
    }

    /// Convert to HTTP response.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let body = serde_json::json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "status": self.status.as_u16()
            }
        });

        Response::builder()
            .status(self.status)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .expect("response builder should not fail")
    }
}

impl From<KvError> for ApiError {
    fn from(err: KvError) -> Self {
        let code = err.code();
        let message = err.to_string();

        let status = match &err {
            // 400 Bad Request
            KvError::Decode(_)
            | KvError::MissingParameter(_)
            | KvError::InvalidParameter { .. }
            | KvError::MalformedBody(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            KvError::NotFound(_) => StatusCode::NOT_FOUND,

            // 413 Payload Too Large
            KvError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 502 Bad Gateway
            KvError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            KvError::LeaderUnknown | KvError::NotLeader { .. } | KvError::Fatal(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 Internal Server Error (commit, membership, everything else)
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            code,
            message,
            status,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
