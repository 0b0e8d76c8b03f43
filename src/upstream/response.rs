//! Upstream response normalization.
//!
//! # Responsibilities
//! - Keep only allow-listed headers from the upstream response
//! - Guarantee the correlation ID header on relayed responses
//! - Decode the body according to status and content type
//!
//! # Design Decisions
//! - Upstream headers are never relayed verbatim (hop-by-hop and internal
//!   transport headers stay behind)
//! - 204 is never parsed

use reqwest::header::{HeaderMap, HeaderName, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;

use crate::http::correlation::{CorrelationId, X_CORRELATION_ID};

/// Headers copied from upstream responses.
pub const RELAYED_HEADERS: [HeaderName; 2] = [CONTENT_TYPE, X_CORRELATION_ID];

const JSON_MEDIA_TYPE: &str = "application/json";

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
}

/// A normalized upstream response ready to relay.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl RawResponse {
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    /// Build from what the upstream sent.
    ///
    /// `correlation` is injected when the upstream omitted the header.
    pub fn from_upstream(
        status: StatusCode,
        upstream_headers: &HeaderMap,
        body: &[u8],
        correlation: Option<&CorrelationId>,
    ) -> Self {
        let mut headers = HeaderMap::new();
        for name in &RELAYED_HEADERS {
            if let Some(value) = upstream_headers.get(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        if !headers.contains_key(&X_CORRELATION_ID) {
            if let Some(value) = correlation.and_then(CorrelationId::to_header_value) {
                headers.insert(X_CORRELATION_ID, value);
            }
        }

        let body = decode_body(status, &headers, body);
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.headers
            .get(&X_CORRELATION_ID)
            .and_then(|v| v.to_str().ok())
    }
}

fn decode_body(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> ResponseBody {
    if status == StatusCode::NO_CONTENT {
        return ResponseBody::Empty;
    }

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains(JSON_MEDIA_TYPE));

    if is_json {
        if let Ok(value) = serde_json::from_slice::<Value>(body) {
            return ResponseBody::Json(value);
        }
        tracing::debug!(status = %status, "Upstream declared JSON but body did not parse; relaying as text");
    }

    ResponseBody::Text(String::from_utf8_lossy(body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(k, v) in pairs {
            map.insert(HeaderName::from_static(k), HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn only_allow_listed_headers_survive() {
        let upstream = headers(&[
            ("content-type", "application/json"),
            ("x-correlation-id", "up-1"),
            ("set-cookie", "session=secret"),
            ("connection", "keep-alive"),
            ("x-powered-by", "Express"),
        ]);
        let response = RawResponse::from_upstream(StatusCode::OK, &upstream, b"{}", None);

        assert_eq!(response.headers.len(), 2);
        assert_eq!(response.correlation_id(), Some("up-1"));
        assert!(response.headers.get("set-cookie").is_none());
    }

    #[test]
    fn correlation_is_injected_when_missing() {
        let upstream = headers(&[("content-type", "text/plain")]);
        let id = CorrelationId::from("req-42");
        let response = RawResponse::from_upstream(StatusCode::OK, &upstream, b"hi", Some(&id));
        assert_eq!(response.correlation_id(), Some("req-42"));
    }

    #[test]
    fn upstream_correlation_wins() {
        let upstream = headers(&[("x-correlation-id", "from-upstream")]);
        let id = CorrelationId::from("local");
        let response = RawResponse::from_upstream(StatusCode::OK, &upstream, b"", Some(&id));
        assert_eq!(response.correlation_id(), Some("from-upstream"));
    }

    #[test]
    fn body_decoding() {
        let json_headers = headers(&[("content-type", "application/json; charset=utf-8")]);
        let text_headers = headers(&[("content-type", "text/html")]);

        let r = RawResponse::from_upstream(StatusCode::OK, &json_headers, br#"{"id":1}"#, None);
        assert_eq!(r.body, ResponseBody::Json(json!({"id": 1})));

        let r = RawResponse::from_upstream(StatusCode::OK, &text_headers, b"<p>hi</p>", None);
        assert_eq!(r.body, ResponseBody::Text("<p>hi</p>".into()));

        let r = RawResponse::from_upstream(StatusCode::NO_CONTENT, &json_headers, b"garbage", None);
        assert_eq!(r.body, ResponseBody::Empty);

        let r = RawResponse::from_upstream(StatusCode::OK, &json_headers, b"not json", None);
        assert_eq!(r.body, ResponseBody::Text("not json".into()));
    }
}
