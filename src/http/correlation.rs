//! Correlation ID handling.
//!
//! # Responsibilities
//! - Resolve the correlation ID of an inbound request (header or UUID v4)
//! - Make it readable by any code running inside that request's task
//! - Echo it on the response
//!
//! # Design Decisions
//! - Added as early as possible (outermost layer) so every log line has it
//! - Stored in a Tokio task-local; outbound calls read it without plumbing
//! - The inbound value is propagated unchanged when present and non-empty

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Header carrying the correlation ID in both directions.
pub const X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

tokio::task_local! {
    static CURRENT: CorrelationId;
}

/// Opaque identifier tagging all work done for one inbound request.
///
/// Inbound values keep their exact header bytes; `as_str` is a lossy view
/// used for logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId {
    text: Arc<str>,
    header: Option<HeaderValue>,
}

impl CorrelationId {
    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self::from(Uuid::new_v4().to_string().as_str())
    }

    /// Take the identifier from `headers` when present and non-empty,
    /// otherwise generate one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(&X_CORRELATION_ID)
            .and_then(Self::from_header_value)
            .unwrap_or_else(Self::generate)
    }

    /// `None` for an empty value.
    pub fn from_header_value(value: &HeaderValue) -> Option<Self> {
        if value.is_empty() {
            return None;
        }
        Some(Self {
            text: String::from_utf8_lossy(value.as_bytes()).into(),
            header: Some(value.clone()),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn to_header_value(&self) -> Option<HeaderValue> {
        self.header.clone()
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self {
            text: value.into(),
            header: HeaderValue::from_str(value).ok(),
        }
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Run `fut` with `id` as the current correlation ID.
pub async fn scope<F: Future>(id: CorrelationId, fut: F) -> F::Output {
    CURRENT.scope(id, fut).await
}

/// The correlation ID of the request being handled, if any.
pub fn current() -> Option<CorrelationId> {
    CURRENT.try_with(Clone::clone).ok()
}

/// Axum middleware establishing the correlation scope for a request.
pub async fn correlation_middleware(mut request: Request<Body>, next: Next) -> Response {
    let id = CorrelationId::from_headers(request.headers());

    // Normalize the header so inner layers (tracing, handlers) see the same value.
    if let Some(value) = id.to_header_value() {
        request.headers_mut().insert(X_CORRELATION_ID, value);
    }
    request.extensions_mut().insert(id.clone());

    let mut response = scope(id.clone(), next.run(request)).await;

    if let Some(value) = id.to_header_value() {
        response.headers_mut().insert(X_CORRELATION_ID, value);
    }
    response
}
