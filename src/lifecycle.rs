use crate::error::{Result, SmuxError};
use std::sync::Arc;
use tokio::sync::watch;

/// Where a duplex is in its life.
///
/// States only move forward. `Closed` and `Errored` are terminal and each
/// duplex reaches exactly one of them, exactly once.
#[derive(Debug, Clone)]
pub enum DuplexState {
    Created,
    /// Handshake queued for the transport.
    Open,
    /// Accepting application writes and inbound segments.
    Active,
    /// Flushing queued segments before shutting the transport down.
    Closing,
    Closed,
    Errored(Arc<SmuxError>),
}

impl DuplexState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DuplexState::Closed | DuplexState::Errored(_))
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, DuplexState::Active)
    }

    fn rank(&self) -> u8 {
        match self {
            DuplexState::Created => 0,
            DuplexState::Open => 1,
            DuplexState::Active => 2,
            DuplexState::Closing => 3,
            DuplexState::Closed | DuplexState::Errored(_) => 4,
        }
    }

    /// Error to hand a caller that tried to use a duplex in this state.
    pub(crate) fn unusable(&self) -> SmuxError {
        match self {
            DuplexState::Errored(e) => SmuxError::Aborted(Arc::clone(e)),
            _ => SmuxError::Closed,
        }
    }
}

/// Publishes [`DuplexState`] transitions to everyone holding a receiver.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    tx: watch::Sender<DuplexState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(DuplexState::Created);
        Self { tx }
    }

    pub fn current(&self) -> DuplexState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DuplexState> {
        self.tx.subscribe()
    }

    /// Moves to a later non-terminal state. Returns false if `next` is not
    /// ahead of the current state.
    pub fn advance(&self, next: DuplexState) -> bool {
        debug_assert!(!next.is_terminal());
        self.transition(next)
    }

    pub fn close(&self) -> bool {
        self.transition(DuplexState::Closed)
    }

    pub fn fail(&self, error: SmuxError) -> bool {
        self.transition(DuplexState::Errored(Arc::new(error)))
    }

    fn transition(&self, next: DuplexState) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_terminal() || next.rank() <= state.rank() {
                return false;
            }

            tracing::debug!("Duplex {:?} -> {:?}", state, next);
            *state = next;
            true
        })
    }

    /// Outcome once terminal: `Ok` for a clean close.
    pub fn outcome(&self) -> Result<()> {
        match &*self.tx.borrow() {
            DuplexState::Errored(e) => Err(SmuxError::Aborted(Arc::clone(e))),
            _ => Ok(()),
        }
    }
}

/// Resolves once the watched lifecycle is terminal.
pub(crate) async fn terminated(rx: &mut watch::Receiver<DuplexState>) {
    loop {
        if rx.borrow_and_update().is_terminal() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
