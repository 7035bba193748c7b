/// Observer side of the state protocol: boot from a full snapshot, then keep
/// a local copy current by applying broadcast events.
use crate::coordinator::Coordinator;
use crate::thread_types::{Ack, GlobalState, JobKind, LastSelection, Message, StateEvent, Status};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

/// Local copy of the global state held by one observer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserverView {
    pub thread: Vec<Message>,
    pub status: Status,
    pub last_selection: Option<LastSelection>,
}

impl ObserverView {
    /// Events carry whole values, so applying one is a plain replacement
    pub fn apply(&mut self, event: &StateEvent) {
        match event {
            StateEvent::ThreadUpdated { thread } => self.thread = thread.clone(),
            StateEvent::StatusUpdated { status } => self.status = status.clone(),
            StateEvent::ThreadCleared => {
                self.thread.clear();
                self.status = Status::default();
            }
        }
    }
}

impl From<GlobalState> for ObserverView {
    fn from(state: GlobalState) -> Self {
        Self {
            thread: state.thread,
            status: state.status,
            last_selection: state.last_selection,
        }
    }
}

/// Build the prompt actually sent for a typed question.
///
/// With `include_selection` and a non-blank selection the question is
/// prefixed by the selected text. Blank input yields an empty string.
pub fn compose_prompt(
    input: &str,
    selection: Option<&LastSelection>,
    include_selection: bool,
) -> String {
    let input = input.trim();
    if input.is_empty() {
        return String::new();
    }
    if !include_selection {
        return input.to_string();
    }
    match selection.map(|s| s.text.trim()).filter(|s| !s.is_empty()) {
        Some(sel) => format!("Selected text:\n{}\n\nQuestion:\n{}", sel, input),
        None => input.to_string(),
    }
}

pub struct Observer {
    coordinator: Coordinator,
    events: broadcast::Receiver<StateEvent>,
    view: ObserverView,
}

impl Observer {
    /// Subscribe before pulling the snapshot so nothing published in
    /// between is missed. Duplicates are harmless under replacement.
    pub fn boot(coordinator: Coordinator) -> Self {
        let events = coordinator.subscribe();
        let view = ObserverView::from(coordinator.global_state());
        debug!("Observer booted with {} message(s)", view.thread.len());
        Self {
            coordinator,
            events,
            view,
        }
    }

    pub fn view(&self) -> &ObserverView {
        &self.view
    }

    pub fn thread(&self) -> &[Message] {
        &self.view.thread
    }

    pub fn status(&self) -> &Status {
        &self.view.status
    }

    pub fn last_selection(&self) -> Option<&LastSelection> {
        self.view.last_selection.as_ref()
    }

    /// Wait for the next event and apply it. `None` only if the event channel
    /// closes, which cannot happen while this observer holds its coordinator.
    pub async fn next_event(&mut self) -> Option<StateEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    self.view.apply(&event);
                    return Some(event);
                }
                Err(RecvError::Lagged(n)) => {
                    warn!("Observer lagged {} events, resyncing", n);
                    self.resync();
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Apply everything already delivered without waiting. Returns the
    /// number of events applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.view.apply(&event);
                    applied += 1;
                }
                Err(TryRecvError::Lagged(n)) => {
                    warn!("Observer lagged {} events, resyncing", n);
                    self.resync();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return applied,
            }
        }
    }

    /// Replace the local copy with a fresh snapshot. The receiver is
    /// renewed first: anything still buffered predates the snapshot.
    pub fn resync(&mut self) {
        self.events = self.events.resubscribe();
        self.view = ObserverView::from(self.coordinator.global_state());
    }

    /// Submit a typed question, optionally prefixed with the last selection
    pub async fn submit_text(&self, input: &str, include_selection: bool) -> Ack {
        let prompt = compose_prompt(input, self.last_selection(), include_selection);
        self.coordinator.submit(JobKind::Text, &prompt).await
    }

    pub async fn submit_image(&self, url: &str) -> Ack {
        self.coordinator.submit(JobKind::Image, url).await
    }

    pub async fn clear(&self) -> Ack {
        self.coordinator.clear().await
    }
}
