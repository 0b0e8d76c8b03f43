//! OS signal handling.
//!
//! SIGINT and SIGTERM both trigger the shared [`Shutdown`] coordinator.

use tokio::signal;

use crate::lifecycle::shutdown::Shutdown;

/// Wait for SIGINT or SIGTERM.
pub async fn wait_for_signal() -> std::io::Result<()> {
    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            tracing::info!("Received SIGINT");
        }
        result = wait_sigterm() => {
            result?;
            tracing::info!("Received SIGTERM");
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_sigterm() -> std::io::Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_sigterm() -> std::io::Result<()> {
    std::future::pending().await
}

/// Spawn a task that fires `shutdown` on the first termination signal.
///
/// A failure to install the handlers is logged and also triggers shutdown.
pub fn spawn_signal_handler(shutdown: &Shutdown) -> tokio::task::JoinHandle<()> {
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signals");
        }
        trigger.trigger();
    })
}
