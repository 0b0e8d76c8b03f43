//! Startup orchestration.
//!
//! Config is loaded and validated by the caller; this module builds the
//! server components and binds the listener. Any error here is fatal.

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::security::StoreError;
use crate::upstream::ClientError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] ClientError),

    #[error("failed to build rate limit store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Bind the inbound listener described by `config.server`.
pub async fn bind(config: &GatewayConfig) -> Result<TcpListener, StartupError> {
    let address = config.server.bind_address.clone();
    TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_reports_the_address() {
        let mut config = GatewayConfig::default();
        config.server.bind_address = "127.0.0.1:0".into();
        assert!(bind(&config).await.is_ok());

        config.server.bind_address = "not-an-address".into();
        let err = bind(&config).await.unwrap_err();
        assert!(err.to_string().contains("not-an-address"));
    }
}
