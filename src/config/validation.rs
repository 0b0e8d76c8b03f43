//! Configuration validation.
//!
//! Semantic checks only; serde already handled syntax. Every problem is
//! collected so an operator sees the full list in one run.

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a fully-merged configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be positive"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be positive"));
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("upstream.base_url", e.to_string())),
    }
    if config.upstream.timeout_ms == 0 {
        errors.push(ValidationError::new("upstream.timeout_ms", "must be positive"));
    }
    if config.upstream.bulkhead_limit == 0 {
        errors.push(ValidationError::new("upstream.bulkhead_limit", "must be positive"));
    }

    let rl = &config.rate_limit;
    if rl.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be positive"));
    }
    if rl.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be positive"));
    }
    if rl.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("rate_limit.connect_timeout_ms", "must be positive"));
    }
    if rl.operation_timeout_ms == 0 {
        errors.push(ValidationError::new("rate_limit.operation_timeout_ms", "must be positive"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = GatewayConfig::default();
        config.upstream.base_url = "ftp://users".into();
        config.upstream.bulkhead_limit = 0;
        config.rate_limit.window_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["upstream.base_url", "upstream.bulkhead_limit", "rate_limit.window_secs"]
        );
    }
}
