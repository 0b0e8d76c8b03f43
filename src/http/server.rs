//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the health and auth relay handlers
//! - Wire up middleware (correlation, tracing, timeout, body limit)
//! - Apply admission control to everything under `/api`
//! - Serve until the shutdown signal fires
//!
//! # Layer Order (outermost first)
//! ```text
//! correlation → trace → timeout → body limit → router
//!                                              └─ /api: rate limit → handlers
//! ```

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::http::correlation::{correlation_middleware, CorrelationId};
use crate::http::proxy::{auth_relay, health};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::lifecycle::startup::StartupError;
use crate::security::{rate_limit_middleware, AdmissionLimiter};
use crate::upstream::ResilientClient;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: ResilientClient,
    pub limiter: Option<Arc<AdmissionLimiter>>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a server with the client and limiter described by `config`.
    pub fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let client = ResilientClient::from_config(&config)?;
        let limiter = if config.rate_limit.enabled {
            Some(Arc::new(AdmissionLimiter::from_config(&config.rate_limit)?))
        } else {
            tracing::warn!("Rate limiting disabled");
            None
        };
        Ok(Self::with_components(config, client, limiter))
    }

    /// Create a server around already-built components.
    pub fn with_components(
        config: GatewayConfig,
        client: ResilientClient,
        limiter: Option<Arc<AdmissionLimiter>>,
    ) -> Self {
        let state = AppState { client, limiter };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut api = Router::new().route("/auth/{action}", post(auth_relay));
        if let Some(limiter) = state.limiter.clone() {
            api = api.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }

        let service = config.observability.service_name.clone();
        Router::new()
            .route("/health", get(health))
            .nest("/api", api)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            )))
            .layer(
                TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
                    let correlation_id = request
                        .extensions()
                        .get::<CorrelationId>()
                        .map(CorrelationId::to_string)
                        .unwrap_or_default();
                    tracing::info_span!(
                        "request",
                        service = %service,
                        method = %request.method(),
                        uri = %request.uri(),
                        correlation_id = %correlation_id,
                    )
                }),
            )
            .layer(middleware::from_fn(correlation_middleware))
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.normalized_base(),
            rate_limit = self.config.rate_limit.enabled,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreKind;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server(rate_limit: bool) -> HttpServer {
        let mut config = GatewayConfig::default();
        config.rate_limit.enabled = rate_limit;
        config.rate_limit.store = StoreKind::Memory;
        config.rate_limit.max_requests = 1;
        HttpServer::new(config).unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_not_rate_limited() {
        let router = server(true).router();
        for _ in 0..3 {
            let response = router.clone().oneshot(request("GET", "/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().contains_key("x-correlation-id"));
        }
    }

    #[tokio::test]
    async fn unknown_auth_action_is_not_found() {
        let router = server(false).router();
        let response = router
            .oneshot(request("POST", "/api/auth/delete-everything"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn api_requests_past_the_limit_get_429() {
        let router = server(true).router();

        // First request spends the budget; the unknown action keeps it off the network.
        let first = router
            .clone()
            .oneshot(request("POST", "/api/auth/nope"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::NOT_FOUND);

        let second = router
            .oneshot(request("POST", "/api/auth/nope"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = axum::body::to_bytes(second.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Too Many Requests");
    }
}
