/// Coordinator: owns the state store and the job queue, and is the single
/// entry point for capture triggers, observer submissions and snapshots.
use crate::api::start_api_server;
use crate::backend::AnswerBackend;
use crate::config::Config;
use crate::error::{AskError, Result};
use crate::job_queue::{JobQueue, QueueStatus};
use crate::observer::Observer;
use crate::observer_api::start_observer_api;
use crate::state_store::StateStore;
use crate::thread_types::{Ack, GlobalState, Job, JobKind, Message, StateEvent};
use crate::utils::EventEmitter;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

pub struct Coordinator {
    config: Config,
    store: StateStore,
    queue: JobQueue,

    /// Keeps "append user message" and "enqueue job" in the same order
    submit_lock: Arc<Mutex<()>>,
}

impl Coordinator {
    /// Open the on-disk store and start the job worker.
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config, backend: Arc<dyn AnswerBackend>) -> Result<Self> {
        let emitter = EventEmitter::new(config.event_capacity);
        let store = StateStore::open(&config.data_dir, emitter)?;
        Ok(Self::with_store(config, store, backend))
    }

    /// Start the job worker over an already opened store
    pub fn with_store(config: Config, store: StateStore, backend: Arc<dyn AnswerBackend>) -> Self {
        let (queue, worker) = JobQueue::new(store.clone(), backend, config.backend_timeout);
        tokio::spawn(worker.run());

        Self {
            config,
            store,
            queue,
            submit_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Full state for observer boot. Never fails.
    pub fn global_state(&self) -> GlobalState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.store.emitter().subscribe()
    }

    /// Connect a new observer: subscribe, then pull the snapshot
    pub fn observe(&self) -> Observer {
        Observer::boot(self.clone())
    }

    pub fn observer_count(&self) -> usize {
        self.store.emitter().observer_count()
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Wait until every queued job has finished
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }

    /// Observer submission. Acknowledges once the request is queued; the
    /// answer arrives later as a thread broadcast.
    pub async fn submit(&self, kind: JobKind, content: &str) -> Ack {
        let result = match kind {
            JobKind::Text => self.submit_text(content).await,
            JobKind::Image => self.submit_image(content).await,
        };
        if let Err(e) = &result {
            warn!("Rejected {:?} submission: {}", kind, e);
        }
        result.into()
    }

    pub async fn submit_text(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AskError::Validation("Empty text".to_string()));
        }
        self.append_and_enqueue(
            Message::user(text),
            Job::Text {
                text: text.to_string(),
            },
        )
        .await
    }

    pub async fn submit_image(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AskError::Validation("Empty url".to_string()));
        }
        self.append_and_enqueue(
            Message::user(format!("Analyze this image:\n{}", url)),
            Job::Image {
                url: url.to_string(),
            },
        )
        .await
    }

    /// Selection captured outside any observer: remember it, then ask about it
    pub async fn capture_selection(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AskError::Validation("Empty selection".to_string()));
        }
        self.store.set_last_selection(text)?;
        self.submit_text(text).await
    }

    /// Clear thread and status; the last selection is kept
    pub async fn clear(&self) -> Ack {
        let _guard = self.submit_lock.lock().await;
        let result = self.store.clear().await;
        match &result {
            Ok(()) => info!("Thread cleared"),
            Err(e) => error!("Failed to clear thread: {}", e),
        }
        result.into()
    }

    async fn append_and_enqueue(&self, msg: Message, job: Job) -> Result<()> {
        let _guard = self.submit_lock.lock().await;
        // A question nobody will answer must not reach the thread
        if self.queue.is_closed() {
            return Err(AskError::QueueClosed);
        }
        self.store.append_message(msg).await?;
        self.queue.enqueue(job)
    }

    /// Serve the command and observer APIs until Ctrl+C / SIGTERM
    pub async fn run(&self) -> Result<()> {
        info!("Starting askpanel coordinator");
        info!("Data dir: {}", self.config.data_dir.display());
        info!("Answering backend: {}", self.config.backend_url);

        let api_handle = {
            let coordinator = self.clone();
            let addr = self.config.api_addr;
            tokio::spawn(async move {
                if let Err(e) = start_api_server(coordinator, addr).await {
                    error!("Command API stopped: {}", e);
                }
            })
        };

        let observer_handle = {
            let coordinator = self.clone();
            let addr = self.config.observer_addr;
            tokio::spawn(async move {
                if let Err(e) = start_observer_api(coordinator, addr).await {
                    error!("Observer API stopped: {}", e);
                }
            })
        };

        wait_for_shutdown().await;
        info!("Shutdown signal received, stopping coordinator...");

        api_handle.abort();
        observer_handle.abort();

        // Queued jobs live only in memory and are not recovered on restart
        let status = self.queue.status();
        if !status.is_drained() {
            warn!(
                "Dropping {} queued job(s) ({:?})",
                status.pending, status.state
            );
        }

        self.store.flush()?;
        info!("Coordinator stopped");
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("SIGTERM received");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

impl Clone for Coordinator {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            queue: self.queue.clone(),
            submit_lock: self.submit_lock.clone(),
        }
    }
}
