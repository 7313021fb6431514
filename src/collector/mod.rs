//! Collection loop orchestration.
//!
//! This module drives the fetch, merge, persist, analyze and wait cycle
//! until the runtime ceiling is reached or an operator asks it to stop.

pub mod collector_loop;

pub use collector_loop::{
    Collector, CollectorSettings, CollectorState, RunSummary, TerminationReason,
};

use tokio::sync::watch;
use tracing::info;

/// Flip `tx` to `true` on Ctrl-C (and SIGTERM on Unix).
pub async fn forward_shutdown_signal(tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Collection stop requested");
    let _ = tx.send(true);
}
