//! Lock client handle and its connection driver.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use vending_core::SessionId;

use super::LockError;
use super::connection::{HubConnection, HubConnector};
use super::protocol::{HubMessage, TRY_LOCK};
use super::reconnect::{ReconnectOutcome, ReconnectPolicy, reconnect_loop};
use super::state::{
    LockEffect, LockEvent, LockMachine, LockSnapshot, LockState, LockStatus, MachineNotification,
};
use crate::config::MachineLockConfig;

/// How long [`MachineLockClient::shutdown`] waits for the driver.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owned handle to a running lock client.
///
/// Dropping the handle cancels the driver, which still attempts to release
/// the lock. Call [`shutdown`](Self::shutdown) to wait for that release.
pub struct MachineLockClient {
    snapshot_rx: watch::Receiver<LockSnapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for MachineLockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineLockClient")
            .field("snapshot", &*self.snapshot_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl MachineLockClient {
    /// Spawn the driver for `session_id`. Must be called inside a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns `LockError::Http` if the HTTP client cannot be built.
    pub fn start(config: &MachineLockConfig, session_id: SessionId) -> Result<Self, LockError> {
        let http = reqwest::Client::builder()
            .timeout(config.handshake_timeout)
            .build()?;
        let connector = HubConnector::new(
            http,
            config.hub_url.clone(),
            session_id,
            config.skip_negotiation,
            config.handshake_timeout,
        );

        let (snapshot_tx, snapshot_rx) = watch::channel(LockSnapshot::default());
        let cancel = CancellationToken::new();

        let driver = LockDriver {
            connector,
            policy: config.reconnect.clone(),
            keep_alive_interval: config.keep_alive_interval,
            server_timeout: config.server_timeout,
            machine: LockMachine::new(),
            snapshot_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(driver.run());

        Ok(Self {
            snapshot_rx,
            cancel,
            task: Some(task),
        })
    }

    /// Current busy flag and message.
    #[must_use]
    pub fn status(&self) -> LockStatus {
        self.snapshot_rx.borrow().status
    }

    #[must_use]
    pub fn state(&self) -> LockState {
        self.snapshot_rx.borrow().state
    }

    #[must_use]
    pub fn snapshot(&self) -> LockSnapshot {
        *self.snapshot_rx.borrow()
    }

    /// Observe every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LockSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Wait until the outcome of the current cycle is known, or `timeout`
    /// elapses, and return the status at that point.
    pub async fn wait_settled(&self, timeout: Duration) -> LockStatus {
        let mut rx = self.snapshot_rx.clone();
        if let Ok(Ok(snapshot)) =
            tokio::time::timeout(timeout, rx.wait_for(LockSnapshot::is_settled)).await
        {
            return snapshot.status;
        }
        self.status()
    }

    /// Cancel the driver and wait for it to release the lock.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
            tracing::warn!("Machine lock driver did not stop in time");
        }
    }
}

impl Drop for MachineLockClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How one connected session ended.
enum SessionEnd {
    Shutdown,
    Rearm,
    TransportLost(String),
    Closed(Option<String>),
}

struct LockDriver {
    connector: HubConnector,
    policy: ReconnectPolicy,
    keep_alive_interval: Duration,
    server_timeout: Duration,
    machine: LockMachine,
    snapshot_tx: watch::Sender<LockSnapshot>,
    cancel: CancellationToken,
}

impl LockDriver {
    async fn run(mut self) {
        'cycles: loop {
            self.apply(LockEvent::ConnectStarted);

            let connected = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break 'cycles,
                result = self.connector.connect() => result,
            };
            let mut conn = match connected {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "Machine hub unreachable, continuing without a lock");
                    self.fail_and_idle().await;
                    break 'cycles;
                }
            };

            loop {
                match self.drive(&mut conn).await {
                    SessionEnd::Shutdown => {
                        conn.release().await;
                        break 'cycles;
                    }
                    SessionEnd::Rearm => {
                        tracing::info!("Machine unlocked, re-arming");
                        conn.release().await;
                        continue 'cycles;
                    }
                    SessionEnd::Closed(error) => {
                        tracing::warn!(error = ?error, "Machine hub closed the connection");
                        drop(conn);
                        self.fail_and_idle().await;
                        break 'cycles;
                    }
                    SessionEnd::TransportLost(reason) => {
                        tracing::warn!(reason = %reason, "Machine hub connection lost");
                        self.apply(LockEvent::ConnectStarted);
                        match reconnect_loop(&self.connector, &self.policy, &self.cancel).await {
                            ReconnectOutcome::Connected(fresh) => conn = fresh,
                            ReconnectOutcome::Cancelled => break 'cycles,
                            ReconnectOutcome::Exhausted => {
                                drop(conn);
                                self.fail_and_idle().await;
                                break 'cycles;
                            }
                        }
                    }
                }
            }
        }

        self.apply(LockEvent::Disconnected);
        tracing::debug!("Machine lock driver stopped");
    }

    /// Report the failure and stay idle until cancelled.
    async fn fail_and_idle(&mut self) {
        self.apply(LockEvent::ConnectFailed);
        self.cancel.cancelled().await;
    }

    /// Run one connected session: ask for the lock, then process server
    /// traffic until something ends the session.
    async fn drive(&mut self, conn: &mut HubConnection) -> SessionEnd {
        let mut try_lock_id = None;
        if self.apply(LockEvent::Connected) == Some(LockEffect::TryLock) {
            match conn.invoke(TRY_LOCK).await {
                Ok(id) => try_lock_id = Some(id),
                Err(e) => return SessionEnd::TransportLost(e.to_string()),
            }
        }

        let mut keep_alive = tokio::time::interval_at(
            Instant::now() + self.keep_alive_interval,
            self.keep_alive_interval,
        );
        let silence = tokio::time::sleep(self.server_timeout);
        tokio::pin!(silence);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return SessionEnd::Shutdown,
                () = &mut silence => {
                    return SessionEnd::TransportLost("server timeout".to_string());
                }
                _ = keep_alive.tick() => {
                    if let Err(e) = conn.ping().await {
                        return SessionEnd::TransportLost(e.to_string());
                    }
                }
                message = conn.recv() => {
                    silence.as_mut().reset(Instant::now() + self.server_timeout);
                    let message = match message {
                        Ok(message) => message,
                        Err(e) => return SessionEnd::TransportLost(e.to_string()),
                    };
                    if let Some(end) = self.handle(message, &mut try_lock_id) {
                        return end;
                    }
                }
            }
        }
    }

    fn handle(&mut self, message: HubMessage, try_lock_id: &mut Option<String>) -> Option<SessionEnd> {
        match message {
            HubMessage::Ping => None,
            HubMessage::Invocation { target, .. } => {
                let Some(notification) = MachineNotification::from_target(&target) else {
                    tracing::debug!(target = %target, "Ignoring unknown hub method");
                    return None;
                };
                tracing::debug!(notification = ?notification, "Machine notification");
                match self.apply(LockEvent::Notification(notification)) {
                    Some(LockEffect::Rearm) => Some(SessionEnd::Rearm),
                    _ => None,
                }
            }
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                if try_lock_id.as_deref() != Some(invocation_id.as_str()) {
                    tracing::debug!(invocation_id = %invocation_id, "Ignoring completion");
                    return None;
                }
                *try_lock_id = None;

                if let Some(error) = error {
                    tracing::warn!(error = %error, "TryLock failed on the server");
                    return None;
                }
                match result.as_ref().and_then(serde_json::Value::as_bool) {
                    Some(acquired) => {
                        tracing::info!(acquired, "TryLock resolved");
                        self.apply(LockEvent::AcquireResolved(acquired));
                    }
                    None => tracing::warn!(result = ?result, "TryLock returned a non-boolean result"),
                }
                None
            }
            HubMessage::Close {
                error,
                allow_reconnect,
            } => Some(if allow_reconnect {
                SessionEnd::TransportLost(error.unwrap_or_else(|| "closed by server".to_string()))
            } else {
                SessionEnd::Closed(error)
            }),
            HubMessage::Other(kind) => {
                tracing::debug!(kind, "Ignoring hub message");
                None
            }
        }
    }

    /// Step the state machine and publish the new snapshot if it changed.
    fn apply(&mut self, event: LockEvent) -> Option<LockEffect> {
        let effect = self.machine.apply(event);
        let snapshot = self.machine.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        effect
    }
}
