//! Lock watch command.

use vending_storefront::error::{Result, StorefrontError};
use vending_storefront::render;
use vending_storefront::state::AppState;

/// Print every lock status change until Ctrl+C, then release the lock.
pub async fn watch(state: &AppState) -> Result<()> {
    let lock = state.start_lock_client()?;
    let mut changes = lock.subscribe();

    let result = async {
        let initial = *changes.borrow_and_update();
        render::lock_snapshot(&mut std::io::stdout().lock(), &initial)?;

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = *changes.borrow_and_update();
                    render::lock_snapshot(&mut std::io::stdout().lock(), &snapshot)?;
                }
            }
        }
        Ok::<_, StorefrontError>(())
    }
    .await;

    lock.shutdown().await;
    result
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received, releasing the machine");
}
