//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, LogFormat, StoreKind};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: optional TOML file, then process environment, then validation.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment-style overrides from `lookup`.
///
/// Empty values are treated as unset.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(addr) = get("GATEWAY_BIND_ADDRESS") {
        config.server.bind_address = addr;
    } else if let Some(port) = get("PORT") {
        let port: u16 = parse("PORT", &port)?;
        config.server.bind_address = format!("0.0.0.0:{port}");
    }

    if let Some(url) = get("USERS_SERVICE_URL") {
        config.upstream.base_url = url;
    }
    if let Some(v) = get("UPSTREAM_TIMEOUT_MS") {
        config.upstream.timeout_ms = parse("UPSTREAM_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = get("UPSTREAM_BULKHEAD_LIMIT") {
        config.upstream.bulkhead_limit = parse("UPSTREAM_BULKHEAD_LIMIT", &v)?;
    }
    if let Some(v) = get("UPSTREAM_MAX_RETRIES") {
        config.retries.max_retries = parse("UPSTREAM_MAX_RETRIES", &v)?;
    }
    if let Some(v) = get("UPSTREAM_RETRY_BASE_DELAY_MS") {
        config.retries.base_delay_ms = parse("UPSTREAM_RETRY_BASE_DELAY_MS", &v)?;
    }

    if let Some(v) = get("RATE_LIMIT_ENABLED") {
        config.rate_limit.enabled = parse("RATE_LIMIT_ENABLED", &v)?;
    }
    if let Some(v) = get("RATE_LIMIT_STORE") {
        config.rate_limit.store = match v.to_ascii_lowercase().as_str() {
            "redis" => StoreKind::Redis,
            "memory" => StoreKind::Memory,
            _ => return Err(ConfigError::Env { var: "RATE_LIMIT_STORE", value: v }),
        };
    }
    if let Some(url) = get("REDIS_URL") {
        config.rate_limit.redis_url = url;
    }
    if let Some(v) = get("RATE_LIMIT_WINDOW_SEC") {
        config.rate_limit.window_secs = parse("RATE_LIMIT_WINDOW_SEC", &v)?;
    }
    if let Some(v) = get("RATE_LIMIT_MAX") {
        config.rate_limit.max_requests = parse("RATE_LIMIT_MAX", &v)?;
    }
    if let Some(v) = get("RATE_LIMIT_CONNECT_TIMEOUT_MS") {
        config.rate_limit.connect_timeout_ms = parse("RATE_LIMIT_CONNECT_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = get("RATE_LIMIT_OPERATION_TIMEOUT_MS") {
        config.rate_limit.operation_timeout_ms = parse("RATE_LIMIT_OPERATION_TIMEOUT_MS", &v)?;
    }

    if let Some(level) = get("LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(v) = get("LOG_FORMAT") {
        config.observability.log_format = match v.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => return Err(ConfigError::Env { var: "LOG_FORMAT", value: v }),
        };
    } else if get("APP_ENV").as_deref() == Some("production") {
        config.observability.log_format = LogFormat::Json;
    }

    Ok(())
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}
