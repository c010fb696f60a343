//! Periodic liveness sweep
//!
//! Catches what the observers miss (delayed renders, finished CSS
//! transitions). The sweep acts only when a fresh resolution disagrees with
//! the last known state: the element appeared, disappeared or, when position
//! tracking is enabled, drifted.

use std::time::Duration;

use instant::Instant;
use serde::{Deserialize, Serialize};

use crate::anchor::types::Point;

// =============================================================================
// Types
// =============================================================================

/// Result of comparing a fresh resolution against the last known state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SweepVerdict {
    /// Found / not-found flipped
    pub liveness_changed: bool,
    /// Same liveness, different anchor point
    pub drifted: bool,
}

impl SweepVerdict {
    pub fn disagrees(&self) -> bool {
        self.liveness_changed || self.drifted
    }
}

// =============================================================================
// LivenessDetector
// =============================================================================

#[derive(Debug, Clone)]
pub struct LivenessDetector {
    last_found: Option<bool>,
    last_position: Option<Point>,
    track_position: bool,
    /// Number of sweeps checked
    check_count: u64,
    /// Number of sweeps that disagreed
    hit_count: u64,
}

impl LivenessDetector {
    pub fn new(track_position: bool) -> Self {
        Self {
            last_found: None,
            last_position: None,
            track_position,
            check_count: 0,
            hit_count: 0,
        }
    }

    /// Remember the state produced by a committed evaluation.
    pub fn record(&mut self, found: bool, position: Option<Point>) {
        self.last_found = Some(found);
        self.last_position = position;
    }

    /// Compare a fresh observation with the recorded state.
    /// Never-recorded state always disagrees.
    pub fn check(&mut self, found: bool, position: Option<Point>) -> SweepVerdict {
        self.check_count += 1;

        let verdict = match self.last_found {
            None => SweepVerdict {
                liveness_changed: true,
                drifted: false,
            },
            Some(prev) if prev != found => SweepVerdict {
                liveness_changed: true,
                drifted: false,
            },
            Some(_) => SweepVerdict {
                liveness_changed: false,
                drifted: self.track_position && self.last_position != position,
            },
        };

        if verdict.disagrees() {
            self.hit_count += 1;
        }
        verdict
    }

    pub fn check_count(&self) -> u64 {
        self.check_count
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }
}

// =============================================================================
// SweepSchedule
// =============================================================================

/// Fixed-interval timer; rearms itself from the moment it fires
#[derive(Debug, Clone)]
pub struct SweepSchedule {
    interval: Duration,
    next: Option<Instant>,
}

impl SweepSchedule {
    pub fn new(interval: Duration) -> Self {
        Self { interval, next: None }
    }

    pub fn start(&mut self, now: Instant) {
        self.next = Some(now + self.interval);
    }

    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.next {
            Some(next) if next <= now => {
                self.next = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    pub fn cancel(&mut self) {
        self.next = None;
    }
}
