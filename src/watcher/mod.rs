//! Change Watcher
//!
//! Turns raw platform notifications into re-evaluation decisions:
//! - `signal` - which notifications matter and how soon
//! - `debounce` - trailing-edge coalescing with injected time
//! - `sweep` - periodic liveness check for missed signals
//! - `history` - reference-counted history API interception

pub mod debounce;
pub mod history;
pub mod signal;
pub mod sweep;

pub use debounce::Debouncer;
pub use history::HistoryInterceptor;
pub use signal::{is_relevant_mutation, Signal, Urgency};
pub use sweep::{LivenessDetector, SweepSchedule};
