//! Cancellable one-shot deferred call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use tracing::trace;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELED: u8 = 2;

/// Runs a task once after a delay unless canceled first.
///
/// Cancelling an already-fired or already-canceled call is a no-op, not an
/// error. Dropping the handle cancels a still-pending call.
pub struct DeferredCall {
    cancel_tx: Sender<()>,
    state: Arc<AtomicU8>,
}

impl DeferredCall {
    pub fn spawn<F>(delay: Duration, task: F) -> DeferredCall
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let state = Arc::new(AtomicU8::new(PENDING));
        let thread_state = Arc::clone(&state);

        thread::spawn(move || {
            match cancel_rx.recv_timeout(delay) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    thread_state.store(CANCELED, Ordering::SeqCst);
                    trace!("Deferred call canceled");
                }
                Err(RecvTimeoutError::Timeout) => {
                    // The transition decides the race with a late cancel.
                    if thread_state
                        .compare_exchange(PENDING, FIRED, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        task();
                    }
                }
            }
        });

        DeferredCall { cancel_tx, state }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::SeqCst) == PENDING
    }

    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FIRED
    }
}
