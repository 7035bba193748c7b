/// State persistence: thread, status and last selection stored in sled DB
/// One key per record, each written atomically. No cross-key transactions.
use crate::error::Result;
use crate::thread_types::{
    now_ms, GlobalState, LastSelection, Message, StateEvent, Status, StatusKind,
};
use crate::utils::EventEmitter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

pub const THREAD_KEY: &str = "thread";
pub const STATUS_KEY: &str = "status";
pub const LAST_SELECTION_KEY: &str = "lastSelection";

pub struct StateStore {
    db: sled::Db,
    emitter: EventEmitter,
    /// Serializes thread appends, status writes and clear, so each write
    /// lands in storage in the same order its event is broadcast
    state_lock: Arc<Mutex<()>>,
}

impl StateStore {
    /// Open (or create) the store under `data_dir`
    pub fn open(data_dir: &Path, emitter: EventEmitter) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db = sled::open(data_dir.join("state.db"))?;
        Ok(Self::with_db(db, emitter))
    }

    /// Throwaway store, removed when dropped
    pub fn temporary(emitter: EventEmitter) -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::with_db(db, emitter))
    }

    fn with_db(db: sled::Db, emitter: EventEmitter) -> Self {
        Self {
            db,
            emitter,
            state_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Read a key, falling back to the type's default when it was never written
    fn get<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        match self.db.get(key.as_bytes())? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(T::default()),
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_vec(value)?;
        self.db.insert(key.as_bytes(), raw)?;
        Ok(())
    }

    pub fn thread(&self) -> Result<Vec<Message>> {
        self.get(THREAD_KEY)
    }

    pub fn status(&self) -> Result<Status> {
        self.get(STATUS_KEY)
    }

    pub fn last_selection(&self) -> Result<Option<LastSelection>> {
        self.get(LAST_SELECTION_KEY)
    }

    /// Append one message and broadcast the resulting thread
    pub async fn append_message(&self, msg: Message) -> Result<Vec<Message>> {
        let _guard = self.state_lock.lock().await;
        let mut thread = self.thread()?;
        thread.push(msg);
        self.set(THREAD_KEY, &thread)?;
        self.emitter.emit(StateEvent::ThreadUpdated {
            thread: thread.clone(),
        });
        Ok(thread)
    }

    /// Overwrite the status record and broadcast it
    pub async fn set_status(&self, text: impl Into<String>, kind: StatusKind) -> Result<Status> {
        let _guard = self.state_lock.lock().await;
        let status = Status::new(text, kind);
        self.set(STATUS_KEY, &status)?;
        self.emitter.emit(StateEvent::StatusUpdated {
            status: status.clone(),
        });
        Ok(status)
    }

    pub fn set_last_selection(&self, text: impl Into<String>) -> Result<LastSelection> {
        let selection = LastSelection {
            text: text.into(),
            at: now_ms(),
        };
        self.set(LAST_SELECTION_KEY, &Some(selection.clone()))?;
        Ok(selection)
    }

    /// Drop thread and status. The last selection survives.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.state_lock.lock().await;
        self.db.remove(THREAD_KEY.as_bytes())?;
        self.db.remove(STATUS_KEY.as_bytes())?;

        self.emitter.emit(StateEvent::StatusUpdated {
            status: Status::default(),
        });
        self.emitter.emit(StateEvent::ThreadCleared);
        self.emitter
            .emit(StateEvent::ThreadUpdated { thread: Vec::new() });
        Ok(())
    }

    /// Full snapshot for observer boot. Never fails: unreadable records
    /// degrade to their defaults.
    pub fn snapshot(&self) -> GlobalState {
        let thread = self.thread().unwrap_or_else(|e| {
            warn!("Failed to read thread, using empty: {}", e);
            Vec::new()
        });
        let status = self.status().unwrap_or_else(|e| {
            warn!("Failed to read status, using neutral: {}", e);
            Status::default()
        });
        let last_selection = self.last_selection().unwrap_or_else(|e| {
            warn!("Failed to read last selection: {}", e);
            None
        });

        GlobalState {
            thread,
            status,
            last_selection,
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl Clone for StateStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            emitter: self.emitter.clone(),
            state_lock: self.state_lock.clone(),
        }
    }
}
