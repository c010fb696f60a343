//! Position Computer
//!
//! Anchor point = rect top-left + click offset, or the rect centre when no
//! offset was captured. All results are viewport coordinates.

use serde::{Deserialize, Serialize};

use crate::anchor::types::{AnchorDescriptor, ClickOffset, Point, Rect};
use crate::dom::Dom;

/// Screen-space anchor for one element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPosition {
    pub point: Point,
    /// Zero-area boxes are not visible; no opacity or occlusion checks
    pub visible: bool,
}

pub fn anchor_point(rect: &Rect, offset: Option<ClickOffset>) -> Point {
    match offset {
        Some(o) => Point::new(rect.left() + o.dx, rect.top() + o.dy),
        None => rect.center(),
    }
}

pub fn compute_position<D: Dom + ?Sized>(dom: &D, element: &D::Node, offset: Option<ClickOffset>) -> AnchorPosition {
    let rect = dom.bounding_client_rect(element);
    AnchorPosition {
        point: anchor_point(&rect, offset),
        visible: rect.has_area(),
    }
}

/// Point derived from the stored page-space `fallback_rect`, converted to
/// viewport coordinates for the given scroll offset. Never visible.
pub fn fallback_position(descriptor: &AnchorDescriptor, scroll: Point) -> Option<AnchorPosition> {
    let rect = descriptor.fallback_rect?;
    let page = anchor_point(&rect, descriptor.click_offset);
    Some(AnchorPosition {
        point: page.offset(-scroll.x, -scroll.y),
        visible: false,
    })
}
