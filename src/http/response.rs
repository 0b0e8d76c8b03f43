//! Response handling and transformation.
//!
//! # Responsibilities
//! - Relay a normalized upstream response to the client
//! - Map upstream client failures to gateway status codes
//!
//! # Mapping
//! ```text
//! BulkheadRejected         → 503 {"code":"BULKHEAD_REJECTED"}
//! Upstream(4xx)            → relayed as-is
//! anything else            → 502 {"code":"UPSTREAM_UNAVAILABLE"}
//! ```

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::upstream::{ClientError, RawResponse, ResponseBody};

impl IntoResponse for RawResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ResponseBody::Empty => Body::empty(),
            ResponseBody::Json(value) => Body::from(value.to_string()),
            ResponseBody::Text(text) => Body::from(text),
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Gateway-facing view of an upstream failure.
pub struct UpstreamFailure(pub ClientError);

impl IntoResponse for UpstreamFailure {
    fn into_response(self) -> Response {
        match self.0 {
            ClientError::Upstream { status, response } if status.is_client_error() => {
                response.into_response()
            }
            error @ ClientError::BulkheadRejected => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "code": error.code() })),
            )
                .into_response(),
            error => (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "code": error.code(),
                    "message": "Users service unavailable",
                })),
            )
                .into_response(),
        }
    }
}
