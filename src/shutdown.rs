use crate::time::Clock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn shutdown_signal() -> (ShutdownHandle, ShutdownSignal) {
    let token = CancellationToken::new();

    (
        ShutdownHandle { token: token.clone() },
        ShutdownSignal { token },
    )
}

/// Triggers shutdown of every loop holding a matching [`ShutdownSignal`]. Dropping the handle
/// triggers shutdown as well.
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.token.cancel();
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been triggered. Resolves immediately if it already has been.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Sleeps on `clock` unless shutdown interrupts first. Returns false if interrupted.
    pub async fn sleep_unless_triggered<C: Clock>(&self, clock: &C, duration: Duration) -> bool {
        tokio::select! {
            _ = clock.sleep(duration) => !self.is_triggered(),
            _ = self.token.cancelled() => false,
        }
    }
}
