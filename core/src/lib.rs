/// askpanel - single-thread question coordinator
///
/// Serializes text and image questions into one global conversation thread,
/// sends them one at a time to an answering backend, and keeps any number of
/// observer views in sync through broadcast state events.

pub mod error;
pub mod config;
pub mod thread_types;
pub mod state_store;
pub mod backend;
pub mod job_queue;
pub mod coordinator;
pub mod observer;
pub mod utils;
pub mod api;
pub mod observer_api;
pub mod cli_app;

pub use error::{AskError, RemoteError, Result};
pub use config::Config;
pub use coordinator::Coordinator;
pub use observer::Observer;
