//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming /api request:
//!     → rate_limit.rs (fixed-window check per client + path)
//!     → connection.rs (lazy, shared store connection)
//!     → store.rs (INCR / EXPIRE on Redis or in memory)
//!     → Pass to handler, or 429
//! ```
//!
//! # Design Decisions
//! - Fail open: an unreachable store never blocks traffic
//! - Reject instead of queueing when over the limit
//! - Store calls are bounded by connect and operation timeouts

pub mod connection;
pub mod rate_limit;
pub mod store;

pub use connection::{ConnectionManager, ConnectionStatus};
pub use rate_limit::{rate_limit_middleware, AdmissionLimiter, Decision, RateLimitKey};
pub use store::{CounterStore, MemoryStore, RedisConnector, StoreConnector, StoreError};
