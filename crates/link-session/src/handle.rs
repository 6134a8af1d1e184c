//! Client-side handle to a running session

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::actor::{run_session_actor, SessionBackend, SessionCommand};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::Outbound;
use crate::state::SessionStatus;

/// Completion of a call handed to the session
#[derive(Debug)]
pub struct PendingCall {
    rx: oneshot::Receiver<Result<Value, SessionError>>,
}

impl PendingCall {
    /// Wait for the session to complete the call
    pub async fn completion(self) -> Result<Value, SessionError> {
        self.rx.await.map_err(|_| SessionError::Disposed)?
    }
}

/// Cloneable handle to a session actor
///
/// The session is disposed when `dispose` is called or when the last handle
/// is dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Spawn a session actor on the current runtime
    ///
    /// Returns the handle and the receiver of everything the session sends
    /// to the peer outside call completions.
    pub fn spawn(
        backend: SessionBackend,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.channel_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.channel_capacity);
        tokio::spawn(run_session_actor(backend, config, cmd_rx, outbound_tx));
        (Self { cmd_tx }, outbound_rx)
    }

    /// Hand `method` to the session without waiting for its completion
    ///
    /// Calls submitted from one task reach the session in submission order.
    pub async fn submit(&self, method: &str, params: Value) -> Result<PendingCall, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Call {
                method: method.to_string(),
                params,
                reply,
            })
            .await
            .map_err(|_| SessionError::Disposed)?;
        Ok(PendingCall { rx })
    }

    /// Invoke `method` and wait for its completion
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        self.submit(method, params).await?.completion().await
    }

    /// Snapshot the session state
    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Status { reply })
            .await
            .map_err(|_| SessionError::Disposed)?;
        rx.await.map_err(|_| SessionError::Disposed)
    }

    /// Dispose the session; safe to call any number of times
    pub async fn dispose(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SessionCommand::Dispose { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}
