//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → bulkhead.rs (take a slot or reject immediately)
//!     → timeouts.rs (per-attempt deadline)
//!     → On failure: retries.rs (check if retryable)
//!     → backoff.rs (wait, slot released meanwhile)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream attempt has a deadline
//! - Retries only for GET and HEAD
//! - Backpressure is immediate rejection, never a queue

pub mod backoff;
pub mod bulkhead;
pub mod retries;
pub mod timeouts;

pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use retries::RetryPolicy;
pub use timeouts::{Deadline, DeadlineExceeded};
