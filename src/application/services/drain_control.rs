//! Primitives shared by the dispatcher worker and the components that ask it
//! to run: a single-permit gate and a coalescing wake-up channel.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::warn;

/// At most one holder at a time. The dispatcher holds it for a whole drain
/// pass; queue maintenance that must not interleave with a pass holds it too.
#[derive(Clone, Default)]
pub struct DrainGate {
    inner: Arc<Mutex<()>>,
}

/// Proof that the gate is held. Released on drop.
pub struct DrainHold {
    _guard: OwnedMutexGuard<()>,
}

impl DrainGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_hold(&self) -> Option<DrainHold> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .ok()
            .map(|guard| DrainHold { _guard: guard })
    }

    /// Waits until the current holder releases the gate.
    pub async fn hold(&self) -> DrainHold {
        DrainHold {
            _guard: Arc::clone(&self.inner).lock_owned().await,
        }
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Wakes the dispatcher worker. Requests made while one is already pending
/// collapse into it.
#[derive(Clone)]
pub struct DrainTrigger {
    sender: mpsc::Sender<()>,
}

impl DrainTrigger {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn request(&self) {
        match self.sender.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!(
                    target: "fieldsync::dispatcher",
                    "drain requested but the dispatcher worker has stopped"
                );
            }
        }
    }
}
