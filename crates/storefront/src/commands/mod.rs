//! Command implementations.

use vending_storefront::error::{Result, StorefrontError};
use vending_storefront::machine_lock::{MESSAGE_BUSY, MachineLockClient};
use vending_storefront::state::AppState;

pub mod cart;
pub mod catalog;
pub mod pay;
pub mod session;
pub mod watch;

/// Start the lock client and wait for its first outcome. Fails with
/// `MachineBusy` while another session holds the machine; an unreachable
/// hub lets the command through.
///
/// The returned client keeps the lock until it is shut down.
pub async fn gate(state: &AppState) -> Result<MachineLockClient> {
    let lock = state.start_lock_client()?;
    let status = lock.wait_settled(state.config().lock_settle_timeout).await;

    if status.is_busy {
        let message = status.message.unwrap_or(MESSAGE_BUSY);
        lock.shutdown().await;
        return Err(StorefrontError::MachineBusy(message.to_string()));
    }
    if let Some(message) = status.message {
        tracing::warn!(message, "Continuing without the machine lock");
    }
    Ok(lock)
}

/// Run `work` while holding the lock, then release it whatever the
/// outcome. `work` does not start before the lock is settled.
pub async fn gated<T>(state: &AppState, work: impl Future<Output = Result<T>>) -> Result<T> {
    let lock = gate(state).await?;
    let result = work.await;
    lock.shutdown().await;
    result
}
