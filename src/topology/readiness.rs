use std::sync::Arc;
use tokio::sync::watch;

/// ReadinessSignal is a one-shot latch: it starts unset, is set at most once, and is never reset.
/// Any number of clones may wait on it. Everything written before `set()` is visible to a waiter
/// that `wait()` released.
#[derive(Clone)]
pub struct ReadinessSignal {
    snd: Arc<watch::Sender<bool>>,
}

impl ReadinessSignal {
    pub fn new() -> Self {
        let (snd, _) = watch::channel(false);
        ReadinessSignal { snd: Arc::new(snd) }
    }

    /// Returns true if this call is the one that set the signal.
    pub fn set(&self) -> bool {
        !self.snd.send_replace(true)
    }

    pub fn is_set(&self) -> bool {
        *self.snd.borrow()
    }

    /// Resolves once the signal is set. Resolves immediately if it already is.
    pub async fn wait(&self) {
        let mut rcv = self.snd.subscribe();
        loop {
            if *rcv.borrow_and_update() {
                return;
            }
            // We hold the sender through `self`, so the channel can't close under us.
            if rcv.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}
