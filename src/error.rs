//! Error taxonomy for AnchorCore
//!
//! Only setup-time failures ever leave the crate as `Err`. Locator and
//! verification failures are absorbed by the resolver and surface as state
//! (`visible = false`), see [`crate::anchor::resolver`].

use thiserror::Error;

/// A stored CSS selector or XPath expression that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },
    #[error("invalid xpath `{expression}`: {reason}")]
    XPath { expression: String, reason: String },
}

impl LocatorError {
    pub fn selector(selector: &str, reason: impl Into<String>) -> Self {
        LocatorError::Selector {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }

    pub fn xpath(expression: &str, reason: impl Into<String>) -> Self {
        LocatorError::XPath {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

/// Which observer the platform declined to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverKind {
    Mutation,
    Intersection,
    Viewport,
}

impl std::fmt::Display for ObserverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObserverKind::Mutation => write!(f, "mutation"),
            ObserverKind::Intersection => write!(f, "intersection"),
            ObserverKind::Viewport => write!(f, "viewport"),
        }
    }
}

/// The environment cannot support continuous tracking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to create {kind} observer: {reason}")]
pub struct ObserverSetupError {
    pub kind: ObserverKind,
    pub reason: String,
}

impl ObserverSetupError {
    pub fn new(kind: ObserverKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history api unavailable: {0}")]
    Unavailable(String),
    #[error("failed to wrap history.{method}: {reason}")]
    WrapFailed { method: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("element belongs to the widget's own subtree")]
    WidgetElement,
    #[error("element is not attached to the document")]
    Detached,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("sweep interval ({sweep_ms}ms) must exceed the debounce window ({debounce_ms}ms)")]
    SweepTooFrequent { sweep_ms: u32, debounce_ms: u32 },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("intersection threshold {0} is outside [0, 1]")]
    Threshold(f64),
    #[error("config parse error: {0}")]
    Parse(String),
}

/// Errors returned by tracker lifecycle operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Observer(#[from] ObserverSetupError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("tracker has been torn down")]
    TornDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_error_messages() {
        let e = LocatorError::selector("div[", "unterminated attribute selector");
        assert_eq!(
            e.to_string(),
            "invalid selector `div[`: unterminated attribute selector"
        );
        let e = LocatorError::xpath("/html/[", "expected node test");
        assert!(e.to_string().starts_with("invalid xpath"));
    }

    #[test]
    fn test_observer_error_converts_into_tracker_error() {
        let e: TrackerError = ObserverSetupError::new(ObserverKind::Mutation, "denied").into();
        assert_eq!(e.to_string(), "failed to create mutation observer: denied");
    }
}
