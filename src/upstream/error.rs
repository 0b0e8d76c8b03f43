//! Upstream client error taxonomy.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::upstream::response::RawResponse;

/// Errors surfaced by [`ResilientClient::send`](crate::upstream::ResilientClient::send).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Local capacity toward the upstream is exhausted. Never retried.
    #[error("bulkhead rejected the request: upstream concurrency limit reached")]
    BulkheadRejected,

    /// The attempt did not finish before its deadline.
    #[error("upstream attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream answered with a 4xx or 5xx status.
    #[error("upstream responded with status {status}")]
    Upstream {
        status: StatusCode,
        response: RawResponse,
    },

    /// Connection-level failure (refused, reset, DNS, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request could not be built (bad URL, unserializable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// An upstream status error with an empty body.
    pub fn upstream_status(status: StatusCode) -> Self {
        Self::Upstream {
            status,
            response: RawResponse::empty(status),
        }
    }

    /// Whether the failure kind allows another attempt at all.
    ///
    /// Method idempotency is decided by the retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => status.is_server_error(),
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::BulkheadRejected | Self::InvalidRequest(_) => false,
        }
    }

    /// Machine-readable code used at the HTTP boundary.
    ///
    /// Callers only distinguish local rejection from an unusable upstream.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BulkheadRejected => "BULKHEAD_REJECTED",
            _ => "UPSTREAM_UNAVAILABLE",
        }
    }

    /// Short label for metrics.
    pub(crate) fn outcome(&self) -> &'static str {
        match self {
            Self::BulkheadRejected => "bulkhead_rejected",
            Self::Timeout(_) => "timeout",
            Self::Upstream { status, .. } if status.is_server_error() => "server_error",
            Self::Upstream { .. } => "client_error",
            Self::Transport(_) => "transport_error",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}
