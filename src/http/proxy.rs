//! Auth relay handlers.
//!
//! Forwards `POST /api/auth/{action}` to `{upstream}/auth/{action}` through
//! the resilient client and relays the normalized response.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::http::correlation::{CorrelationId, X_CORRELATION_ID};
use crate::http::response::UpstreamFailure;
use crate::http::server::AppState;
use crate::upstream::OutboundRequest;

/// Actions the users service exposes under `/auth`.
pub const AUTH_ACTIONS: [&str; 4] = ["register", "login", "refresh", "logout"];

pub async fn auth_relay(
    State(state): State<AppState>,
    Path(action): Path<String>,
    correlation: Option<Extension<CorrelationId>>,
    body: Bytes,
) -> Response {
    if !AUTH_ACTIONS.contains(&action.as_str()) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let payload = match parse_body(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "code": "INVALID_JSON", "message": e.to_string() })),
            )
                .into_response();
        }
    };

    let url = state.client.upstream_url(&format!("/auth/{action}"));
    let mut request = OutboundRequest::post(url, payload);
    if let Some(value) = correlation.and_then(|Extension(id)| id.to_header_value()) {
        request = request.header(X_CORRELATION_ID, value);
    }

    match state.client.send(&request).await {
        Ok(response) => response.into_response(),
        Err(error) => UpstreamFailure(error).into_response(),
    }
}

/// An absent body relays as `{}`.
fn parse_body(body: &[u8]) -> Result<Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_becomes_empty_object() {
        assert_eq!(parse_body(b"").unwrap(), json!({}));
        assert_eq!(parse_body(b"  \n").unwrap(), json!({}));
        assert_eq!(
            parse_body(br#"{"email":"a@b.c"}"#).unwrap(),
            json!({ "email": "a@b.c" })
        );
        assert!(parse_body(b"{not json").is_err());
    }
}
