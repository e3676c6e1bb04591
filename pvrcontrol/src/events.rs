use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};

use pvrclient::ClientId;

/// Events broadcast by the orchestration core.
#[derive(Clone, Debug)]
pub enum CoreEvent {
    /// The set of created clients changed.
    ClientsChanged,
    /// Timers were added, edited or deleted.
    TimersChanged,
    PlaybackStarted { client_id: ClientId },
    PlaybackStopped,
    ReminderAnnounced { timer_id: u32 },
}

/// Broadcast bus. Subscribers that drop their receiver are pruned on the
/// next broadcast.
#[derive(Clone, Default)]
pub struct CoreEventBus {
    subscribers: Arc<Mutex<Vec<Sender<CoreEvent>>>>,
}

impl CoreEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        let (tx, rx) = unbounded::<CoreEvent>();
        {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.push(tx);
        }
        rx
    }

    pub(crate) fn broadcast(&self, event: CoreEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
