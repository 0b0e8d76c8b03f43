//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Inbound listener settings.
    pub server: ServerConfig,

    /// The bulkhead-protected upstream service.
    pub upstream: UpstreamConfig,

    /// Retry policy for idempotent upstream calls.
    pub retries: RetryConfig,

    /// Admission (rate limit) settings.
    pub rate_limit: RateLimitConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Inbound listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,

    /// Overall inbound request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_body_bytes: 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Upstream service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the protected upstream (e.g., "http://users:3001").
    pub base_url: String,

    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,

    /// Maximum concurrent in-flight attempts toward this upstream.
    pub bulkhead_limit: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3001".to_string(),
            timeout_ms: 2000,
            bulkhead_limit: 50,
        }
    }
}

impl UpstreamConfig {
    /// Base URL without a trailing slash.
    pub fn normalized_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts for idempotent methods (total = max_retries + 1).
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound of the random jitter added to each delay, in milliseconds.
    /// Defaults to the base delay when absent.
    pub jitter_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 100,
            jitter_ms: None,
        }
    }
}

/// Which counter store backs the admission limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Redis,
    Memory,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable admission control on `/api`.
    pub enabled: bool,

    /// Counter store backend.
    pub store: StoreKind,

    /// Redis connection URL (used when `store = "redis"`).
    pub redis_url: String,

    /// Fixed window length in seconds.
    pub window_secs: u64,

    /// Requests allowed per (client, path) per window.
    pub max_requests: u64,

    /// Store connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Store operation timeout in milliseconds.
    pub operation_timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store: StoreKind::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            window_secs: 60,
            max_requests: 60,
            connect_timeout_ms: 500,
            operation_timeout_ms: 500,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Service name attached to every log line.
    pub service_name: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            service_name: "gateway".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
