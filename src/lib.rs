//! Resilient API gateway library.
//!
//! Bulkhead-protected, retrying upstream client; fail-open fixed-window
//! admission control; correlation ID propagation.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod upstream;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use upstream::ResilientClient;
