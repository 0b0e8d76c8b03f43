//! Counter store connection state machine.
//!
//! # States
//! - Disconnected: no connection, next caller starts a connect attempt
//! - Connecting: one attempt in flight, every caller awaits that same attempt
//! - Connected: operations run concurrently on the shared connection
//!
//! # State Transitions
//! ```text
//! Disconnected → Connecting: first caller needing the store
//! Connecting → Connected: attempt succeeded within connect timeout
//! Connecting → Disconnected: attempt failed or timed out
//! Connected → Disconnected: any operation on the connection failed
//! ```
//!
//! # Design Decisions
//! - Failures resolve to "no connection", never to an error
//! - Generations stop a stale failure report from tearing down a newer connection

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::security::store::{CounterStore, StoreConnector};

type PendingConnect = Shared<BoxFuture<'static, Option<Arc<dyn CounterStore>>>>;

enum ConnectionState {
    Disconnected,
    Connecting {
        generation: u64,
        attempt: PendingConnect,
    },
    Connected {
        generation: u64,
        store: Arc<dyn CounterStore>,
    },
}

/// Observable connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// A usable connection handed to one caller.
#[derive(Clone)]
pub struct Lease {
    generation: u64,
    store: Arc<dyn CounterStore>,
}

impl Lease {
    pub fn store(&self) -> &dyn CounterStore {
        self.store.as_ref()
    }
}

/// Lazily connects to the counter store and shares the connection.
pub struct ConnectionManager {
    connector: Arc<dyn StoreConnector>,
    connect_timeout: Duration,
    state: Mutex<ConnectionState>,
    next_generation: AtomicU64,
    connect_attempts: AtomicU64,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn StoreConnector>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            state: Mutex::new(ConnectionState::Disconnected),
            next_generation: AtomicU64::new(1),
            connect_attempts: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        match &*self.lock() {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::Connecting { .. } => ConnectionStatus::Connecting,
            ConnectionState::Connected { .. } => ConnectionStatus::Connected,
        }
    }

    /// Number of connect attempts started so far.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Return a usable connection, connecting first if needed.
    ///
    /// `None` when the store cannot be reached within the connect timeout.
    pub async fn acquire(&self) -> Option<Lease> {
        let (generation, attempt) = {
            let mut state = self.lock();
            match &*state {
                ConnectionState::Connected { generation, store } => {
                    return Some(Lease {
                        generation: *generation,
                        store: store.clone(),
                    });
                }
                ConnectionState::Connecting {
                    generation,
                    attempt,
                } => (*generation, attempt.clone()),
                ConnectionState::Disconnected => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let attempt = self.start_connect();
                    *state = ConnectionState::Connecting {
                        generation,
                        attempt: attempt.clone(),
                    };
                    (generation, attempt)
                }
            }
        };

        let result = attempt.await;

        let mut state = self.lock();
        if matches!(&*state, ConnectionState::Connecting { generation: g, .. } if *g == generation) {
            *state = match &result {
                Some(store) => ConnectionState::Connected {
                    generation,
                    store: store.clone(),
                },
                None => ConnectionState::Disconnected,
            };
        }

        result.map(|store| Lease { generation, store })
    }

    /// Report that an operation on `lease` failed.
    pub fn mark_failed(&self, lease: &Lease) {
        let mut state = self.lock();
        if matches!(&*state, ConnectionState::Connected { generation, .. } if *generation == lease.generation)
        {
            tracing::warn!(
                target_store = %self.connector.target(),
                "Counter store connection dropped after operation failure"
            );
            *state = ConnectionState::Disconnected;
        }
    }

    fn start_connect(&self) -> PendingConnect {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        let connector = self.connector.clone();
        let timeout = self.connect_timeout;

        async move {
            let target = connector.target();
            match tokio::time::timeout(timeout, connector.connect()).await {
                Ok(Ok(store)) => {
                    tracing::info!(target_store = %target, "Counter store connected");
                    Some(store)
                }
                Ok(Err(e)) => {
                    tracing::warn!(target_store = %target, error = %e, "Counter store unavailable");
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        target_store = %target,
                        timeout = ?timeout,
                        "Counter store connect timed out"
                    );
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
