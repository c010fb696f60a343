//! Trailing-edge debouncer over injected time
//!
//! One pending deadline at most. A new trigger pushes the deadline out to
//! `now + delay` but never pulls an existing later deadline in, so a
//! navigation settle delay is not shortened by a scroll that follows it.

use std::time::Duration;

use instant::Instant;

#[derive(Debug, Clone, Default)]
pub struct Debouncer {
    deadline: Option<Instant>,
    /// Triggers absorbed into an already-pending evaluation
    coalesced: u64,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the trigger was folded into a pending evaluation.
    pub fn trigger(&mut self, now: Instant, delay: Duration) -> bool {
        let target = now + delay;
        match self.deadline {
            Some(pending) => {
                self.deadline = Some(pending.max(target));
                self.coalesced += 1;
                true
            }
            None => {
                self.deadline = Some(target);
                false
            }
        }
    }

    /// Consume the pending deadline if it has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(50);

    #[test]
    fn test_trailing_edge() {
        let t0 = Instant::now();
        let mut d = Debouncer::new();
        assert!(!d.trigger(t0, WINDOW));
        assert!(d.trigger(t0 + Duration::from_millis(30), WINDOW));

        // original deadline passed, but the second trigger pushed it out
        assert!(!d.take_due(t0 + Duration::from_millis(60)));
        assert!(d.take_due(t0 + Duration::from_millis(80)));
        assert!(!d.is_pending());
        assert_eq!(d.coalesced(), 1);
    }

    #[test]
    fn test_longer_delay_is_kept() {
        let t0 = Instant::now();
        let mut d = Debouncer::new();
        d.trigger(t0, Duration::from_millis(100));
        d.trigger(t0 + Duration::from_millis(10), WINDOW);
        assert_eq!(d.deadline(), Some(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut d = Debouncer::new();
        d.trigger(t0, WINDOW);
        d.cancel();
        assert!(!d.take_due(t0 + Duration::from_secs(1)));
        assert_eq!(d.deadline(), None);
    }
}
