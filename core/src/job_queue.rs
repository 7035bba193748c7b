/// Job queue and single-flight executor
///
/// `JobQueue` is the cheap, cloneable handle callers enqueue through.
/// `JobWorker` owns the receiving end and is the only place a backend call is
/// made, so at most one job is ever in flight. The worker loop is the pump:
/// Idle until a job arrives, Executing while it runs, back to Idle, and it
/// keeps draining until the queue is empty.
use crate::backend::AnswerBackend;
use crate::error::{AskError, RemoteError, Result};
use crate::state_store::StateStore;
use crate::thread_types::{Job, Message, StatusKind, NO_ANSWER};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Executing,
}

/// Read-only view of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub state: ExecutorState,
    /// Jobs waiting behind the one executing
    pub pending: usize,
}

impl QueueStatus {
    pub fn is_drained(&self) -> bool {
        self.state == ExecutorState::Idle && self.pending == 0
    }
}

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
    status: Arc<watch::Sender<QueueStatus>>,
}

pub struct JobWorker {
    rx: mpsc::UnboundedReceiver<Job>,
    status: Arc<watch::Sender<QueueStatus>>,
    store: StateStore,
    backend: Arc<dyn AnswerBackend>,
    call_timeout: Duration,
}

impl JobQueue {
    /// Create the queue handle and the worker that drains it.
    /// The worker does nothing until `run` is spawned.
    pub fn new(
        store: StateStore,
        backend: Arc<dyn AnswerBackend>,
        call_timeout: Duration,
    ) -> (Self, JobWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(QueueStatus {
            state: ExecutorState::Idle,
            pending: 0,
        });
        let status = Arc::new(status);

        let queue = Self {
            tx,
            status: status.clone(),
        };
        let worker = JobWorker {
            rx,
            status,
            store,
            backend,
            call_timeout,
        };
        (queue, worker)
    }

    /// Append to the tail and return immediately
    pub fn enqueue(&self, job: Job) -> Result<()> {
        self.status.send_modify(|s| s.pending += 1);
        if self.tx.send(job).is_err() {
            self.status
                .send_modify(|s| s.pending = s.pending.saturating_sub(1));
            return Err(AskError::QueueClosed);
        }
        Ok(())
    }

    /// True once the worker is gone; nothing enqueued now would ever run
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn status(&self) -> QueueStatus {
        *self.status.borrow()
    }

    pub fn state(&self) -> ExecutorState {
        self.status().state
    }

    pub fn pending(&self) -> usize {
        self.status().pending
    }

    /// Resolve once nothing is executing and nothing is waiting
    pub async fn wait_idle(&self) {
        let mut rx = self.status.subscribe();
        let _ = rx.wait_for(|s| s.is_drained()).await;
    }
}

impl JobWorker {
    pub async fn run(mut self) {
        info!("Job worker started");

        while let Some(job) = self.rx.recv().await {
            self.status.send_modify(|s| {
                s.pending = s.pending.saturating_sub(1);
                s.state = ExecutorState::Executing;
            });

            self.execute(job).await;

            self.status.send_modify(|s| s.state = ExecutorState::Idle);
        }

        info!("Job worker stopped");
    }

    /// Run one job to completion. Success and failure both end with a bot
    /// message and a final status; nothing escapes to the loop.
    async fn execute(&self, job: Job) {
        let kind = job.kind();
        debug!("Executing {:?} job", kind);
        self.publish_status(job.pending_status(), StatusKind::Neutral)
            .await;

        match self.call_backend(&job).await {
            Ok(answer) => {
                let text = if answer.trim().is_empty() {
                    NO_ANSWER.to_string()
                } else {
                    answer
                };
                self.record(Message::bot(text)).await;
                self.publish_status("Done.", StatusKind::Ok).await;
                info!("{:?} job answered", kind);
            }
            Err(e) => {
                warn!("{:?} job failed: {}", kind, e);
                self.record(Message::bot(format!("Error: {}", e.message)))
                    .await;
                self.publish_status(e.message, StatusKind::Error).await;
            }
        }
    }

    async fn call_backend(&self, job: &Job) -> std::result::Result<String, RemoteError> {
        let backend = self.backend.clone();
        let job = job.clone();

        // Own task, so a panicking backend fails this job instead of the worker
        let mut call = tokio::spawn(async move {
            match job {
                Job::Text { text } => backend.answer_text(&text).await,
                Job::Image { url } => backend.answer_image(&url).await,
            }
        });

        match timeout(self.call_timeout, &mut call).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Answering service call aborted: {}", e);
                Err(RemoteError::new("Answering service call panicked"))
            }
            Err(_) => {
                // Wait for the abort to land so the next job never overlaps it
                call.abort();
                let _ = call.await;
                Err(RemoteError::new(format!(
                    "Request timed out after {:?}",
                    self.call_timeout
                )))
            }
        }
    }

    async fn record(&self, msg: Message) {
        if let Err(e) = self.store.append_message(msg).await {
            error!("Failed to append answer to thread: {}", e);
        }
    }

    async fn publish_status(&self, text: impl Into<String>, kind: StatusKind) {
        if let Err(e) = self.store.set_status(text, kind).await {
            error!("Failed to update status: {}", e);
        }
    }
}
