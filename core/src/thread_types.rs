/// Shared types for the conversation thread, status record and job queue
use serde::{Deserialize, Serialize};

/// Fallback answer text when the backend replies with nothing
pub const NO_ANSWER: &str = "No answer.";

/// Milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Time-based id with a random suffix; unique, not secret
pub fn make_id() -> String {
    format!("{}-{:x}", now_ms(), rand::random::<u64>())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// One entry in the global thread. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    /// Creation time, ms since epoch
    pub ts: i64,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: make_id(),
            role,
            text: text.into(),
            ts: now_ms(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Role::Bot, text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatusKind {
    #[default]
    #[serde(rename = "")]
    Neutral,
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "error")]
    Error,
}

/// Progress/result of the most recent operation. Last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Status {
    pub text: String,
    pub kind: StatusKind,
    /// 0 until the first update
    pub at: i64,
}

impl Status {
    pub fn new(text: impl Into<String>, kind: StatusKind) -> Self {
        Self {
            text: text.into(),
            kind,
            at: now_ms(),
        }
    }
}

/// Most recently captured selection, used to prefix a follow-up question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSelection {
    pub text: String,
    pub at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Text,
    Image,
}

/// Queued unit of work for the answering backend.
///
/// Serializes as `{"kind": "text", "payload": {"text": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum Job {
    Text { text: String },
    Image { url: String },
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Job::Text { .. } => JobKind::Text,
            Job::Image { .. } => JobKind::Image,
        }
    }

    /// Status text published when the job starts
    pub fn pending_status(&self) -> &'static str {
        match self {
            Job::Text { .. } => "Sending…",
            Job::Image { .. } => "Analyzing image…",
        }
    }
}

/// State-change notifications fanned out to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateEvent {
    ThreadUpdated { thread: Vec<Message> },
    StatusUpdated { status: Status },
    ThreadCleared,
}

/// Full snapshot pulled by an observer at boot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    pub thread: Vec<Message>,
    pub status: Status,
    pub last_selection: Option<LastSelection>,
}

/// Acknowledgment returned to submitters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(msg.into()),
        }
    }
}

impl<E: std::fmt::Display> From<std::result::Result<(), E>> for Ack {
    fn from(r: std::result::Result<(), E>) -> Self {
        match r {
            Ok(()) => Ack::ok(),
            Err(e) => Ack::error(e.to_string()),
        }
    }
}
