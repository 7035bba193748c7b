/// Event emitter: best-effort fan-out of state changes to connected observers
use crate::thread_types::StateEvent;
use tokio::sync::broadcast;
use tracing::debug;

pub const DEFAULT_EVENT_CAPACITY: usize = 64;

pub struct EventEmitter {
    tx: broadcast::Sender<StateEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to whoever is listening right now.
    ///
    /// Returns how many observers received the event. Nobody listening is
    /// the normal idle case and not an error.
    pub fn emit(&self, event: StateEvent) -> usize {
        match self.tx.send(event) {
            Ok(n) => {
                debug!("broadcast delivered to {} observer(s)", n);
                n
            }
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl Clone for EventEmitter {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}
