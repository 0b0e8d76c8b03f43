//! Resilient upstream client.
//!
//! # Responsibilities
//! - Dispatch an [`OutboundRequest`] to the configured upstream
//! - Enforce the bulkhead, the per-attempt deadline and the retry policy
//! - Propagate the correlation ID and normalize the response
//!
//! # Attempt Flow
//! ```text
//! send()
//!   loop:
//!     bulkhead.try_acquire()  ── full ──▶ BulkheadRejected (abort)
//!     deadline.run(call)      ── late ──▶ Timeout
//!     classify status         ── 4xx  ──▶ Upstream (terminal)
//!     release slot
//!     retryable & budget left? ── yes ──▶ sleep(backoff), next attempt
//!                              ── no  ──▶ last error
//! ```

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{GatewayConfig, UpstreamConfig};
use crate::http::correlation::{self, CorrelationId, X_CORRELATION_ID};
use crate::observability::metrics;
use crate::resilience::{Bulkhead, Deadline, RetryPolicy};
use crate::upstream::error::ClientError;
use crate::upstream::request::OutboundRequest;
use crate::upstream::response::RawResponse;

/// HTTP client bound to one bulkhead-protected upstream.
#[derive(Debug, Clone)]
pub struct ResilientClient {
    http: reqwest::Client,
    upstream_base: String,
    bulkhead: Arc<Bulkhead>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl ResilientClient {
    /// Create a client for `upstream` with the given retry policy.
    pub fn new(upstream: &UpstreamConfig, retry: RetryPolicy) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        let upstream_base = upstream.normalized_base().to_string();
        Ok(Self {
            http,
            bulkhead: Arc::new(Bulkhead::new(upstream_base.clone(), upstream.bulkhead_limit)),
            upstream_base,
            retry,
            attempt_timeout: upstream.timeout(),
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, ClientError> {
        Self::new(&config.upstream, RetryPolicy::from(&config.retries))
    }

    pub fn bulkhead(&self) -> &Arc<Bulkhead> {
        &self.bulkhead
    }

    /// Absolute URL of `path` on the protected upstream.
    pub fn upstream_url(&self, path: &str) -> String {
        format!("{}/{}", self.upstream_base, path.trim_start_matches('/'))
    }

    /// Whether `url` targets the protected upstream.
    pub fn protects(&self, url: &str) -> bool {
        url.strip_prefix(self.upstream_base.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
    }

    /// Dispatch `request`, retrying idempotent methods on retryable failures.
    ///
    /// # Errors
    /// The last observed [`ClientError`] once no further attempt is allowed.
    pub async fn send(&self, request: &OutboundRequest) -> Result<RawResponse, ClientError> {
        let url = Url::parse(request.url())
            .map_err(|e| ClientError::InvalidRequest(format!("{}: {e}", request.url())))?;
        let method = request.method();
        let protected = self.protects(request.url());
        let max_attempts = self.retry.max_attempts(method);
        let correlation = request
            .headers()
            .get(&X_CORRELATION_ID)
            .and_then(CorrelationId::from_header_value)
            .or_else(correlation::current);

        let mut attempt: u32 = 0;
        loop {
            let started = Instant::now();
            let outcome = self
                .attempt(request, url.clone(), protected, correlation.as_ref())
                .await;
            attempt += 1;

            let error = match outcome {
                Ok(response) => {
                    metrics::record_upstream_attempt(method.as_str(), "success", started);
                    tracing::debug!(
                        correlation_id = correlation.as_ref().map(CorrelationId::as_str),
                        method = %method,
                        url = %url,
                        status = %response.status,
                        attempt,
                        "Upstream request succeeded"
                    );
                    return Ok(response);
                }
                Err(error) => error,
            };
            metrics::record_upstream_attempt(method.as_str(), error.outcome(), started);

            if attempt >= max_attempts || !self.retry.should_retry(method, &error) {
                tracing::warn!(
                    correlation_id = correlation.as_ref().map(CorrelationId::as_str),
                    method = %method,
                    url = %url,
                    attempt,
                    error = %error,
                    "Upstream request failed"
                );
                return Err(error);
            }

            let delay = self.retry.backoff(attempt - 1);
            tracing::info!(
                correlation_id = correlation.as_ref().map(CorrelationId::as_str),
                method = %method,
                url = %url,
                attempt,
                delay = ?delay,
                error = %error,
                "Retrying upstream request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt. The bulkhead slot lives exactly as long as this call.
    async fn attempt(
        &self,
        request: &OutboundRequest,
        url: Url,
        protected: bool,
        correlation: Option<&CorrelationId>,
    ) -> Result<RawResponse, ClientError> {
        let _permit = if protected {
            match self.bulkhead.try_acquire() {
                Some(permit) => Some(permit),
                None => {
                    tracing::warn!(
                        upstream = %self.upstream_base,
                        limit = self.bulkhead.limit(),
                        "Bulkhead full, rejecting upstream request"
                    );
                    metrics::record_bulkhead_rejected(self.bulkhead.name());
                    return Err(ClientError::BulkheadRejected);
                }
            }
        } else {
            None
        };

        let builder = self.build(request, url, correlation)?;
        let deadline = Deadline::after(request.attempt_timeout().unwrap_or(self.attempt_timeout));

        let call = async {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };

        let (status, headers, body) = match deadline.run(call).await {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) => return Err(ClientError::Transport(describe(&e))),
            Err(exceeded) => return Err(ClientError::Timeout(exceeded.0)),
        };

        let response = RawResponse::from_upstream(status, &headers, &body, correlation);
        if status.is_client_error() || status.is_server_error() {
            return Err(ClientError::Upstream { status, response });
        }
        Ok(response)
    }

    fn build(
        &self,
        request: &OutboundRequest,
        url: Url,
        correlation: Option<&CorrelationId>,
    ) -> Result<reqwest::RequestBuilder, ClientError> {
        let mut headers = request.headers().clone();
        if !headers.contains_key(&X_CORRELATION_ID) {
            if let Some(value) = correlation.and_then(CorrelationId::to_header_value) {
                headers.insert(X_CORRELATION_ID, value);
            }
        }

        let mut builder = self.http.request(request.method().clone(), url);
        if let Some(body) = request.body() {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            let payload =
                serde_json::to_vec(body).map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
            builder = builder.body(payload);
        }
        Ok(builder.headers(headers))
    }
}

/// Flatten a reqwest error and its sources into one line.
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}
