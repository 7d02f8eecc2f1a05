//! Machine lock client.
//!
//! Holds one realtime channel to the machine hub per storefront session.
//! On connect the client asks for the lock (`TryLock`); server pushes
//! (`MachineBusy`, `MachineLocked`, `MachineUnlocked`) update the
//! observable [`LockStatus`]. An unlock push re-arms the client: the old
//! channel is released and a fresh cycle starts, which asks for the lock
//! again. Failing to reach the hub never blocks the storefront.
//!
//! # Example
//!
//! ```rust,ignore
//! let client = MachineLockClient::start(&config.machine_lock, session_id)?;
//! let status = client.wait_settled(Duration::from_secs(3)).await;
//! if status.is_busy {
//!     // block purchase flows
//! }
//! client.shutdown().await;
//! ```

mod client;
mod connection;
pub mod protocol;
mod reconnect;
mod state;

pub use client::MachineLockClient;
pub use reconnect::{ReconnectPolicy, next_delay};
pub use state::{
    LockEffect, LockEvent, LockMachine, LockSnapshot, LockState, LockStatus,
    MESSAGE_ACQUIRE_REFUSED, MESSAGE_BUSY, MESSAGE_CONNECTION_ERROR, MESSAGE_LOCKED,
    MachineNotification,
};

use thiserror::Error;

use protocol::ProtocolError;

/// Errors from the hub transport.
///
/// None of these reach storefront callers through the lock status; they
/// are logged by the driver and reflected as a connection error.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("negotiation failed: {0}")]
    Negotiate(String),

    #[error("connection error: {0}")]
    Connect(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    Closed,

    #[error("timed out connecting to the hub")]
    Timeout,

    #[error("invalid hub URL: {0}")]
    InvalidUrl(String),
}
