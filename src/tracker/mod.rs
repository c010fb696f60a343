//! Trackers: one per displayed comment marker

pub mod core;
pub mod set;
pub mod state;

#[cfg(test)]
mod tests;

pub use self::core::{Subscriber, Tracker};
pub use set::TrackerSet;
pub use state::{PositionUpdate, TrackedState, TrackerPhase, TrackerStats};
