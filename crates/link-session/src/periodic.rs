//! Cancellable periodic tasks
//!
//! Discovery and the liveness watchdog both run as a `PeriodicTask`: a
//! spawned loop over a tokio interval that checks its cancellation token
//! before every tick. Dropping the task cancels it, so a task can never
//! outlive the session state that owns it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Handle to a running periodic task
#[derive(Debug)]
pub struct PeriodicTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn a task calling `tick` every `period`, starting immediately
    ///
    /// The loop ends when the task is cancelled or when `tick` returns `false`.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = timer.tick() => {
                        if child.is_cancelled() || !tick().await {
                            break;
                        }
                    }
                }
            }
            trace!("Periodic task {} stopped", name);
        });

        Self {
            token,
            handle,
        }
    }

    /// Stop the task; further ticks are not delivered
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
