//! Configuration types and defaults for tracking and capture

use serde::{Deserialize, Serialize};

use crate::anchor::resolver::{VerificationPolicy, DEFAULT_MARKER_ATTRIBUTE};
use crate::error::ConfigError;

/// Root container id of the injected widget
pub const DEFAULT_WIDGET_ROOT_ID: &str = "reviewcycle-root";
/// Class prefix dropped from generated selectors
pub const DEFAULT_WIDGET_CLASS_PREFIX: &str = "rc-";
/// Class worn by the widget's hover overlay, which sits outside the root
pub const DEFAULT_WIDGET_MARKER_CLASS: &str = "rc-hover-overlay";

// =============================================================================
// TrackerConfig
// =============================================================================

/// Per-tracker timing and observation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    /// Trailing debounce window for scroll/resize/mutation signals. Default: 50
    pub debounce_ms: u32,
    /// Extra settle delay after navigation signals. Default: 100
    pub navigation_settle_ms: u32,
    /// Periodic liveness sweep. Default: 2000
    pub sweep_interval_ms: u32,
    /// Sweep also reacts to position drift of a live element. Default: true
    pub sweep_tracks_position: bool,
    /// Attribute mutations outside this set never trigger re-evaluation
    pub watched_attributes: Vec<String>,
    pub intersection_thresholds: Vec<f64>,
    pub marker_attribute: String,
    pub verification: VerificationPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            navigation_settle_ms: 100,
            sweep_interval_ms: 2000,
            sweep_tracks_position: true,
            watched_attributes: vec!["class".into(), "style".into(), "hidden".into()],
            intersection_thresholds: vec![0.0, 0.1, 0.5, 1.0],
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
            verification: VerificationPolicy::default(),
        }
    }
}

impl TrackerConfig {
    /// Snappier updates for pages with few markers
    pub fn responsive() -> Self {
        Self {
            debounce_ms: 16,
            navigation_settle_ms: 60,
            sweep_interval_ms: 1000,
            ..Self::default()
        }
    }

    /// Fewer wake-ups for pages with many markers or on battery
    pub fn low_power() -> Self {
        Self {
            debounce_ms: 150,
            navigation_settle_ms: 200,
            sweep_interval_ms: 5000,
            sweep_tracks_position: false,
            ..Self::default()
        }
    }

    /// Parse a (possibly partial) JSON config; missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "debounceMs" });
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "sweepIntervalMs",
            });
        }
        if self.sweep_interval_ms <= self.debounce_ms {
            return Err(ConfigError::SweepTooFrequent {
                sweep_ms: self.sweep_interval_ms,
                debounce_ms: self.debounce_ms,
            });
        }
        if self.marker_attribute.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "markerAttribute",
            });
        }
        if let Some(t) = self
            .intersection_thresholds
            .iter()
            .find(|t| !(0.0..=1.0).contains(*t))
        {
            return Err(ConfigError::Threshold(*t));
        }
        Ok(())
    }
}

// =============================================================================
// CaptureConfig
// =============================================================================

/// How capture identifies the widget's own elements and marks targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    pub marker_attribute: String,
    pub widget_root_id: String,
    /// Elements wearing this class are widget-owned wherever they sit
    pub widget_marker_class: String,
    /// Only affects selector generation; host classes may share the prefix
    pub widget_class_prefix: String,
    /// Ancestor levels recorded in the DOM context. Default: 5
    pub ancestor_depth: usize,
    /// Graphemes kept from ancestor text previews. Default: 50
    pub text_preview_len: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
            widget_root_id: DEFAULT_WIDGET_ROOT_ID.to_string(),
            widget_marker_class: DEFAULT_WIDGET_MARKER_CLASS.to_string(),
            widget_class_prefix: DEFAULT_WIDGET_CLASS_PREFIX.to_string(),
            ancestor_depth: 5,
            text_preview_len: 50,
        }
    }
}

impl CaptureConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.marker_attribute.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "markerAttribute",
            });
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.navigation_settle_ms, 100);
        assert_eq!(config.sweep_interval_ms, 2000);
        assert_eq!(config.watched_attributes, vec!["class", "style", "hidden"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(TrackerConfig::responsive().validate().is_ok());
        assert!(TrackerConfig::low_power().validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = TrackerConfig::from_json(r#"{"debounceMs": 20, "verification": "failOpen"}"#).unwrap();
        assert_eq!(config.debounce_ms, 20);
        assert_eq!(config.verification, VerificationPolicy::FailOpen);
        assert_eq!(config.sweep_interval_ms, 2000);
    }

    #[test]
    fn test_validation_errors() {
        let zero = TrackerConfig {
            debounce_ms: 0,
            ..TrackerConfig::default()
        };
        assert_eq!(zero.validate(), Err(ConfigError::ZeroDuration { field: "debounceMs" }));

        let tight = TrackerConfig {
            sweep_interval_ms: 40,
            ..TrackerConfig::default()
        };
        assert!(matches!(tight.validate(), Err(ConfigError::SweepTooFrequent { .. })));

        let threshold = TrackerConfig {
            intersection_thresholds: vec![0.0, 1.5],
            ..TrackerConfig::default()
        };
        assert_eq!(threshold.validate(), Err(ConfigError::Threshold(1.5)));

        assert!(matches!(TrackerConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_capture_config_json() {
        let config = CaptureConfig::from_json(r#"{"widgetRootId": "my-widget"}"#).unwrap();
        assert_eq!(config.widget_root_id, "my-widget");
        assert_eq!(config.widget_class_prefix, "rc-");
        assert_eq!(config.widget_marker_class, "rc-hover-overlay");

        let config = CaptureConfig::from_json(r#"{"widgetMarkerClass": "fb-overlay"}"#).unwrap();
        assert_eq!(config.widget_marker_class, "fb-overlay");
        assert_eq!(config.widget_root_id, "reviewcycle-root");
        assert!(CaptureConfig::from_json(r#"{"markerAttribute": " "}"#).is_err());
    }
}
