//! Upstream dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! handler builds OutboundRequest
//!     → client.rs (bulkhead, deadline, retry loop)
//!     → response.rs (allow-listed headers, decoded body)
//!     → RawResponse relayed by the HTTP layer
//! ```

pub mod client;
pub mod error;
pub mod request;
pub mod response;

pub use client::ResilientClient;
pub use error::ClientError;
pub use request::OutboundRequest;
pub use response::{RawResponse, ResponseBody};
