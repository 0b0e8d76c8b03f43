//! Fixed-window admission control backed by a shared counter store.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{RateLimitConfig, StoreKind};
use crate::observability::metrics;
use crate::security::connection::{ConnectionManager, ConnectionStatus, Lease};
use crate::security::store::{
    MemoryConnector, MemoryStore, RedisConnector, StoreConnector, StoreError,
};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Reject,
}

/// Counter key: client, path and window bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub client: String,
    pub path: String,
    pub bucket: u64,
}

impl RateLimitKey {
    /// Key for a request seen at `now` with windows of `window_secs`.
    pub fn new(client: &str, path: &str, now: SystemTime, window_secs: u64) -> Self {
        let epoch_secs = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            client: client.to_string(),
            path: path.to_string(),
            bucket: epoch_secs / window_secs.max(1),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rl:{}:{}:{}", self.client, self.path, self.bucket)
    }
}

/// Per-(client, path) fixed-window limiter that fails open.
pub struct AdmissionLimiter {
    connection: ConnectionManager,
    window_secs: u64,
    max_requests: u64,
    operation_timeout: Duration,
}

impl AdmissionLimiter {
    pub fn new(connector: Arc<dyn StoreConnector>, config: &RateLimitConfig) -> Self {
        Self {
            connection: ConnectionManager::new(
                connector,
                Duration::from_millis(config.connect_timeout_ms),
            ),
            window_secs: config.window_secs.max(1),
            max_requests: config.max_requests,
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
        }
    }

    /// Build the limiter with the store selected by `config.store`.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, StoreError> {
        let connector: Arc<dyn StoreConnector> = match config.store {
            StoreKind::Redis => Arc::new(RedisConnector::new(&config.redis_url)?),
            StoreKind::Memory => Arc::new(MemoryConnector::new(Arc::new(MemoryStore::new()))),
        };
        Ok(Self::new(connector, config))
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Count this request and decide. Never fails.
    pub async fn check_and_increment(&self, client_id: &str, path: &str) -> Decision {
        self.check_and_increment_at(client_id, path, SystemTime::now())
            .await
    }

    /// [`check_and_increment`](Self::check_and_increment) at an explicit time.
    pub async fn check_and_increment_at(
        &self,
        client_id: &str,
        path: &str,
        now: SystemTime,
    ) -> Decision {
        let key = RateLimitKey::new(client_id, path, now, self.window_secs);

        let Some(lease) = self.connection.acquire().await else {
            metrics::record_rate_limit_fail_open("unavailable");
            return Decision::Allow;
        };

        match self.increment(&lease, &key).await {
            Ok(count) if count > self.max_requests => {
                tracing::warn!(
                    client = %client_id,
                    path = %path,
                    count,
                    limit = self.max_requests,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limited();
                Decision::Reject
            }
            Ok(_) => Decision::Allow,
            Err(e) => {
                tracing::warn!(
                    client = %client_id,
                    path = %path,
                    error = %e,
                    "Rate limit skipped due to store error"
                );
                self.connection.mark_failed(&lease);
                metrics::record_rate_limit_fail_open("error");
                Decision::Allow
            }
        }
    }

    /// INCR, then EXPIRE on the first hit of the window.
    ///
    /// Not atomic: a crash between the two leaves a key without TTL. The key
    /// embeds its bucket, so that only costs memory.
    async fn increment(&self, lease: &Lease, key: &RateLimitKey) -> Result<u64, StoreError> {
        let key = key.to_string();
        let count = self.bounded(lease.store().incr(&key)).await?;
        if count == 1 {
            self.bounded(lease.store().expire(&key, Duration::from_secs(self.window_secs)))
                .await?;
        }
        Ok(count)
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.operation_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.operation_timeout))?
    }
}

/// Middleware function for per-client admission control.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<AdmissionLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string());
    let path = request.uri().path().to_string();

    match limiter.check_and_increment(&client, &path).await {
        Decision::Allow => next.run(request).await,
        Decision::Reject => (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response(),
    }
}
