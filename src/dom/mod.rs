//! Platform seam: everything the core needs from a document
//!
//! # Architecture
//! - [`Dom`] - queries, geometry, attributes and tree navigation
//! - [`Observers`] - mutation / intersection / window observers owned by a tracker
//! - [`HistoryHooks`] - install and restore the history-API wrappers
//! - `memory` - arena-backed document used natively and in tests
//! - `web` - `web-sys` backed document (wasm32 only)
//!
//! `selector` and `xpath` are generic over [`Dom`], so any tree that can
//! answer the navigation questions gets querying for free.

pub mod memory;
pub mod selector;
pub mod xpath;

#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::anchor::types::{Point, Rect};
use crate::error::{HistoryError, LocatorError, ObserverSetupError};

pub use memory::{MemoryDom, NodeId};

/// Style properties recorded with a captured element
pub const RELEVANT_STYLES: &[&str] = &[
    "display",
    "position",
    "width",
    "height",
    "padding",
    "margin",
    "border",
    "background-color",
    "color",
    "font-size",
    "font-weight",
    "text-align",
];

// =============================================================================
// Document access
// =============================================================================

/// Read/write access to a live document.
///
/// Nodes are handles; holding one never keeps an element alive in the
/// document, and trackers re-resolve instead of caching them.
pub trait Dom {
    type Node: Clone + PartialEq + Debug;

    /// The `<html>` element
    fn root_element(&self) -> Option<Self::Node>;

    fn body(&self) -> Option<Self::Node>;

    /// First element matching `selector` in document order
    fn query_selector(&self, selector: &str) -> Result<Option<Self::Node>, LocatorError>;

    /// Number of elements matching `selector`
    fn query_selector_count(&self, selector: &str) -> Result<usize, LocatorError>;

    /// First ordered node produced by `expression`, evaluated against the document
    fn evaluate_xpath(&self, expression: &str) -> Result<Option<Self::Node>, LocatorError>;

    /// Lowercase tag name
    fn tag_name(&self, node: &Self::Node) -> String;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    fn attribute_names(&self, node: &Self::Node) -> Vec<String>;

    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str);

    /// Concatenated text of the element and its descendants (`textContent`)
    fn text_content(&self, node: &Self::Node) -> String;

    /// Layout box in viewport coordinates
    fn bounding_client_rect(&self, node: &Self::Node) -> Rect;

    fn scroll_offset(&self) -> Point;

    fn parent_element(&self, node: &Self::Node) -> Option<Self::Node>;

    fn previous_element_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    fn is_connected(&self, node: &Self::Node) -> bool;

    fn element_id(&self, node: &Self::Node) -> Option<String> {
        self.attribute(node, "id").filter(|id| !id.is_empty())
    }

    fn class_list(&self, node: &Self::Node) -> Vec<String> {
        self.attribute(node, "class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Non-empty values of [`RELEVANT_STYLES`].
    ///
    /// Without a style engine only inline `style` declarations are seen;
    /// documents that compute styles override this.
    fn computed_styles(&self, node: &Self::Node) -> BTreeMap<String, String> {
        self.attribute(node, "style")
            .map(|style| inline_styles(&style))
            .unwrap_or_default()
    }

    /// Inclusive: a node contains itself.
    fn contains(&self, ancestor: &Self::Node, node: &Self::Node) -> bool {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if &n == ancestor {
                return true;
            }
            current = self.parent_element(&n);
        }
        false
    }

    /// Element whose attribute `name` equals `value` exactly
    fn find_by_attribute(&self, name: &str, value: &str) -> Option<Self::Node> {
        let selector = format!("[{}=\"{}\"]", name, selector::escape_string(value));
        self.query_selector(&selector).ok().flatten()
    }
}

/// Parse `prop: value; ...`, keeping relevant properties. Later
/// declarations win, as they do in CSS.
pub fn inline_styles(style: &str) -> BTreeMap<String, String> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .map(|(prop, value)| (prop.trim().to_ascii_lowercase(), value.trim()))
        .filter(|(prop, value)| !value.is_empty() && RELEVANT_STYLES.contains(&prop.as_str()))
        .map(|(prop, value)| (prop, value.to_string()))
        .collect()
}

// =============================================================================
// Observers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes { name: String },
    CharacterData,
}

/// A single observed change below `<body>`
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord<N> {
    pub kind: MutationKind,
    pub target: N,
}

/// Intersection transition of the observed target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub is_intersecting: bool,
    pub ratio: f64,
}

impl IntersectionEntry {
    pub fn in_view(&self) -> bool {
        self.is_intersecting && self.ratio > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    Scroll,
    Resize,
    PopState,
    HashChange,
    /// Emitted by the wrapped `history.pushState`
    PushState,
    /// Emitted by the wrapped `history.replaceState`
    ReplaceState,
}

/// Observer handles a tracker owns and releases together on teardown.
///
/// Records are queued by the platform and drained by the owner; a
/// disconnected observer never yields records again.
pub trait Observers: Dom {
    /// Subtree child-list + filtered attribute observer rooted at `<body>`
    fn observe_mutations(
        &mut self,
        attribute_filter: &[String],
    ) -> Result<ObserverId, ObserverSetupError>;

    fn observe_intersection(&mut self, thresholds: &[f64]) -> Result<ObserverId, ObserverSetupError>;

    /// Point an intersection observer at a new element (or none).
    /// Re-targeting to the current target is a no-op and returns `false`.
    fn retarget_intersection(&mut self, observer: ObserverId, target: Option<&Self::Node>) -> bool;

    /// Scroll, resize and navigation events on the window
    fn observe_window(&mut self) -> Result<ObserverId, ObserverSetupError>;

    fn take_mutations(&mut self, observer: ObserverId) -> Vec<MutationRecord<Self::Node>>;

    fn take_intersections(&mut self, observer: ObserverId) -> Vec<IntersectionEntry>;

    fn take_window_events(&mut self, observer: ObserverId) -> Vec<WindowEvent>;

    /// Idempotent; unknown ids are ignored.
    fn disconnect(&mut self, observer: ObserverId);
}

/// Replaces `history.pushState` / `history.replaceState` with wrappers that
/// perform the original mutation and then emit a [`WindowEvent`].
///
/// Installation is reference counted by
/// [`crate::watcher::history::HistoryInterceptor`]; implementors only
/// need to install once and restore once.
pub trait HistoryHooks {
    fn install_history_wrappers(&mut self) -> Result<(), HistoryError>;

    fn restore_history(&mut self);
}

/// Everything a tracker needs from its host
pub trait Platform: Observers + HistoryHooks {}

impl<T: Observers + HistoryHooks> Platform for T {}
