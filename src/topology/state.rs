use tokio::sync::watch;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootstrapState {
    Unstarted,
    Electing,
    Polling { acquired: bool },
    Ready { acquired: bool },
    /// Shutdown arrived before the topology was confirmed.
    Cancelled,
}

pub(super) fn new() -> (BootstrapStateNotifier, BootstrapStateListener) {
    let (snd, rcv) = watch::channel(BootstrapState::Unstarted);

    (BootstrapStateNotifier { snd }, BootstrapStateListener { rcv })
}

pub(super) struct BootstrapStateNotifier {
    snd: watch::Sender<BootstrapState>,
}

impl BootstrapStateNotifier {
    pub(super) fn notify_new_state(&self, new_state: BootstrapState) {
        self.snd.send_replace(new_state);
    }
}

#[derive(Clone)]
pub struct BootstrapStateListener {
    rcv: watch::Receiver<BootstrapState>,
}

impl BootstrapStateListener {
    pub fn current(&self) -> BootstrapState {
        *self.rcv.borrow()
    }

    /// Waits for the next transition. Intermediate states may be clobbered by later ones. Returns
    /// `None` once the bootstrapper has finished and no further transition can happen.
    pub async fn next(&mut self) -> Option<BootstrapState> {
        match self.rcv.changed().await {
            Ok(_) => Some(*self.rcv.borrow()),
            Err(_) => None,
        }
    }
}
