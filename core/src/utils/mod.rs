/// Shared utilities
pub mod event_emitter;

pub use event_emitter::EventEmitter;
