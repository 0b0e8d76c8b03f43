//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → correlation.rs (resolve and scope the correlation ID)
//!     → [security: admission control on /api]
//!     → proxy.rs (auth relay through the resilient client)
//!     → response.rs (relay upstream response or map failure)
//!     → Send to client
//! ```

pub mod correlation;
pub mod proxy;
pub mod response;
pub mod server;

pub use correlation::{CorrelationId, X_CORRELATION_ID};
pub use server::{AppState, HttpServer};
