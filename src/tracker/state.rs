//! Tracker state and the update handed to subscribers

use instant::Instant;
use serde::{Deserialize, Serialize};

use crate::anchor::resolver::Tier;
use crate::anchor::types::Point;

/// What the presentation layer renders for one comment
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    /// Viewport coordinates; `None` when the element is gone and there is no fallback
    pub position: Option<Point>,
    pub is_visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackerPhase {
    Idle,
    Observing,
    /// Observer setup failed; holds one best-effort evaluation, never retries
    Degraded,
    TornDown,
}

/// Last committed evaluation. Holds no element handle.
#[derive(Debug, Clone, Default)]
pub struct TrackedState {
    pub update: Option<PositionUpdate>,
    pub found: bool,
    pub matched_tier: Option<Tier>,
    /// Last intersection report for the resolved element
    pub in_view: Option<bool>,
    pub evaluated_at: Option<Instant>,
}

/// Counters in the spirit of a change detector's check/skip stats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStats {
    /// Full resolve + position passes committed
    pub evaluations: u64,
    /// Relevant signals received
    pub signals: u64,
    /// Signals absorbed into an already-pending evaluation
    pub coalesced: u64,
    pub sweeps: u64,
    /// Sweeps that disagreed with the known state
    pub sweep_hits: u64,
    /// Updates delivered to subscribers
    pub notifications: u64,
}

impl TrackerStats {
    /// Share of signals absorbed by debouncing, as a percentage
    pub fn coalesce_rate(&self) -> f64 {
        if self.signals == 0 {
            return 0.0;
        }
        (self.coalesced as f64 / self.signals as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_json_shape() {
        let update = PositionUpdate {
            position: Some(Point::new(210.0, 305.0)),
            is_visible: true,
        };
        let json = serde_json::to_value(update).unwrap();
        assert_eq!(json["position"]["x"], 210.0);
        assert_eq!(json["isVisible"], true);

        let lost = serde_json::to_value(PositionUpdate::default()).unwrap();
        assert!(lost["position"].is_null());
    }

    #[test]
    fn test_coalesce_rate() {
        let stats = TrackerStats {
            signals: 4,
            coalesced: 3,
            ..TrackerStats::default()
        };
        assert_eq!(stats.coalesce_rate(), 75.0);
        assert_eq!(TrackerStats::default().coalesce_rate(), 0.0);
    }
}
