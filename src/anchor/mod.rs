//! Anchors: capture an element, find it again, place a marker on it

pub mod capture;
pub mod position;
pub mod resolver;
pub mod types;

pub use capture::{Capture, CapturedAnchor, ElementContext};
pub use position::{compute_position, fallback_position, AnchorPosition};
pub use resolver::{IdentityResolver, Resolution, Tier, TierOutcome, VerificationPolicy};
pub use types::{AnchorDescriptor, ClickOffset, Point, Rect};
