//! Shared test helpers: scripted answering backend and coordinator setup
#![allow(dead_code)]

use askpanel_core::backend::AnswerBackend;
use askpanel_core::state_store::StateStore;
use askpanel_core::utils::EventEmitter;
use askpanel_core::{Config, Coordinator, RemoteError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend whose reply depends on the input:
///   "hello" -> "X"
///   "hang"  -> never resolves
///   "fail"  -> RemoteError "backend exploded" (500)
///   "empty" -> blank answer
///   "boom"  -> panics
///   other   -> "answer:<input>"
/// Images answer "image:<url>".
pub struct ScriptedBackend {
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, input: &str) -> InFlight<'_> {
        self.calls.lock().unwrap().push(input.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        guard
    }
}

#[async_trait]
impl AnswerBackend for ScriptedBackend {
    async fn answer_text(&self, text: &str) -> Result<String, RemoteError> {
        let _guard = self.enter(text).await;
        match text {
            "hello" => Ok("X".to_string()),
            "hang" => std::future::pending().await,
            "fail" => Err(RemoteError::with_status("backend exploded", 500)),
            "empty" => Ok("   ".to_string()),
            "boom" => panic!("backend blew up"),
            other => Ok(format!("answer:{}", other)),
        }
    }

    async fn answer_image(&self, url: &str) -> Result<String, RemoteError> {
        let _guard = self.enter(url).await;
        Ok(format!("image:{}", url))
    }
}

pub fn coordinator(backend: Arc<ScriptedBackend>) -> Coordinator {
    coordinator_with(backend, Duration::from_secs(5), 64)
}

pub fn coordinator_with(
    backend: Arc<ScriptedBackend>,
    backend_timeout: Duration,
    event_capacity: usize,
) -> Coordinator {
    let config = Config {
        backend_timeout,
        event_capacity,
        ..Default::default()
    };
    let store = StateStore::temporary(EventEmitter::new(event_capacity)).unwrap();
    Coordinator::with_store(config, store, backend)
}

/// Wait for the queue to drain, failing the test instead of hanging
pub async fn settle(coordinator: &Coordinator) {
    tokio::time::timeout(Duration::from_secs(5), coordinator.wait_idle())
        .await
        .expect("queue did not drain");
}
