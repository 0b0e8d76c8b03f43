//! Timeout enforcement.
//!
//! # Responsibilities
//! - Give every upstream attempt its own deadline
//! - Cancel the attempt's in-flight future when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timer; dropping the timed-out future cancels the call
//! - A deadline covers one attempt only, never siblings or the retry loop

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// The deadline passed before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

/// A point in time by which one attempt must complete.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Drive `fut` until it completes or the deadline passes.
    pub async fn run<F: Future>(self, fut: F) -> Result<F::Output, DeadlineExceeded> {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| DeadlineExceeded(self.budget))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn completes_before_deadline() {
        let deadline = Deadline::after(Duration::from_millis(100));
        let out = deadline
            .run(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                7
            })
            .await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_cancels_the_operation() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let deadline = Deadline::after(Duration::from_millis(50));
        let out = deadline
            .run(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                flag.store(true, Ordering::SeqCst);
            })
            .await;

        assert_eq!(out, Err(DeadlineExceeded(Duration::from_millis(50))));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
