//! MemoryDom: arena-backed document
//!
//! A small but faithful stand-in for a browser document: elements with
//! attributes, text and a page-space layout box; `hidden` / `display:none`
//! collapse the box of the element and its subtree; mutation records are
//! queued for every connected observer the way `MutationObserver` batches
//! them; history wrappers emit `PushState` / `ReplaceState` window events.

use std::collections::BTreeMap;

use crate::anchor::types::{Point, Rect};
use crate::dom::{
    selector, xpath, Dom, HistoryHooks, IntersectionEntry, MutationKind, MutationRecord, ObserverId,
    Observers, WindowEvent,
};
use crate::error::{HistoryError, LocatorError, ObserverKind, ObserverSetupError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Layout box in page coordinates
    rect: Rect,
}

#[derive(Debug, Default)]
struct MutationObserverState {
    attribute_filter: Vec<String>,
    queue: Vec<MutationRecord<NodeId>>,
}

#[derive(Debug, Default)]
struct IntersectionObserverState {
    target: Option<NodeId>,
    queue: Vec<IntersectionEntry>,
    retargets: usize,
}

/// In-memory document
#[derive(Debug)]
pub struct MemoryDom {
    nodes: Vec<NodeData>,
    html: NodeId,
    body: NodeId,
    scroll: Point,
    viewport: (f64, f64),
    url: String,
    next_observer: u32,
    mutation_observers: BTreeMap<ObserverId, MutationObserverState>,
    intersection_observers: BTreeMap<ObserverId, IntersectionObserverState>,
    window_observers: BTreeMap<ObserverId, Vec<WindowEvent>>,
    /// Number of wrapper layers currently installed over the history api
    history_wrappers: u32,
    history_installs: u32,
    refuse_observer: Option<ObserverKind>,
    refuse_history: bool,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    /// Document with `<html><head/><body/></html>` and a 1280x800 viewport
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            html: NodeId(0),
            body: NodeId(0),
            scroll: Point::default(),
            viewport: (1280.0, 800.0),
            url: "http://localhost/".to_string(),
            next_observer: 1,
            mutation_observers: BTreeMap::new(),
            intersection_observers: BTreeMap::new(),
            window_observers: BTreeMap::new(),
            history_wrappers: 0,
            history_installs: 0,
            refuse_observer: None,
            refuse_history: false,
        };
        dom.html = dom.alloc("html");
        let head = dom.alloc("head");
        dom.body = dom.alloc("body");
        dom.link(dom.html, head, None);
        dom.link(dom.html, dom.body, None);
        dom.nodes[dom.html.0].rect = Rect::new(0.0, 0.0, 1280.0, 800.0);
        dom.nodes[dom.body.0].rect = Rect::new(0.0, 0.0, 1280.0, 800.0);
        dom
    }

    pub fn body_id(&self) -> NodeId {
        self.body
    }

    pub fn html_id(&self) -> NodeId {
        self.html
    }

    fn alloc(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
            rect: Rect::default(),
        });
        id
    }

    fn link(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        self.unlink(child);
        let siblings = &mut self.nodes[parent.0].children;
        let index = before
            .and_then(|b| siblings.iter().position(|&c| c == b))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    fn unlink(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes[child.0].parent.take()?;
        self.nodes[parent.0].children.retain(|&c| c != child);
        Some(parent)
    }

    // =========================================================================
    // Tree construction & mutation
    // =========================================================================

    /// Detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(tag)
    }

    /// Create an element with attributes and text and append it to `parent`
    pub fn element(&mut self, parent: NodeId, tag: &str, attributes: &[(&str, &str)], text: &str) -> NodeId {
        let id = self.alloc(tag);
        for (name, value) in attributes {
            self.nodes[id.0].attributes.push((name.to_string(), value.to_string()));
        }
        self.nodes[id.0].text = text.to_string();
        self.append_child(parent, id);
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let old_parent = self.nodes[child.0].parent;
        self.link(parent, child, None);
        if let Some(old) = old_parent {
            self.record(MutationKind::ChildList, old);
        }
        self.record(MutationKind::ChildList, parent);
    }

    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        let old_parent = self.nodes[child.0].parent;
        self.link(parent, child, Some(reference));
        if let Some(old) = old_parent {
            self.record(MutationKind::ChildList, old);
        }
        self.record(MutationKind::ChildList, parent);
    }

    /// Detach `node` (and its subtree) from the document
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.unlink(node) {
            self.record(MutationKind::ChildList, parent);
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        let before = self.nodes[node.0].attributes.len();
        self.nodes[node.0].attributes.retain(|(n, _)| n != name);
        if self.nodes[node.0].attributes.len() != before {
            self.record(MutationKind::Attributes { name: name.to_string() }, node);
        }
    }

    /// Replace the element's own text (`textContent = ...` on a leaf)
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.nodes[node.0].text = text.to_string();
        self.record(MutationKind::ChildList, node);
    }

    /// Layout change; like real layout this queues no mutation record.
    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        self.nodes[node.0].rect = rect;
    }

    // =========================================================================
    // Window
    // =========================================================================

    pub fn scroll_to(&mut self, x: f64, y: f64) {
        self.scroll = Point::new(x, y);
        self.emit(WindowEvent::Scroll);
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport = (width, height);
        self.emit(WindowEvent::Resize);
    }

    pub fn viewport(&self) -> (f64, f64) {
        self.viewport
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `history.pushState(..., url)` as called by a router on the page
    pub fn push_state(&mut self, url: &str) {
        self.url = url.to_string();
        if self.history_wrappers > 0 {
            self.emit(WindowEvent::PushState);
        }
    }

    pub fn replace_state(&mut self, url: &str) {
        self.url = url.to_string();
        if self.history_wrappers > 0 {
            self.emit(WindowEvent::ReplaceState);
        }
    }

    /// Back/forward navigation; browsers always dispatch `popstate`
    pub fn pop_state(&mut self, url: &str) {
        self.url = url.to_string();
        self.emit(WindowEvent::PopState);
    }

    pub fn set_hash(&mut self, hash: &str) {
        let base = self.url.split('#').next().unwrap_or_default().to_string();
        self.url = format!("{}#{}", base, hash.trim_start_matches('#'));
        self.emit(WindowEvent::HashChange);
    }

    /// Queue an intersection entry for every observer targeting `node`
    pub fn notify_intersection(&mut self, node: NodeId, entry: IntersectionEntry) {
        for state in self.intersection_observers.values_mut() {
            if state.target == Some(node) {
                state.queue.push(entry);
            }
        }
    }

    fn emit(&mut self, event: WindowEvent) {
        for queue in self.window_observers.values_mut() {
            queue.push(event);
        }
    }

    // =========================================================================
    // Introspection (tests and hosts)
    // =========================================================================

    pub fn active_observer_count(&self) -> usize {
        self.mutation_observers.len() + self.intersection_observers.len() + self.window_observers.len()
    }

    pub fn mutation_observer_count(&self) -> usize {
        self.mutation_observers.len()
    }

    pub fn intersection_target(&self, observer: ObserverId) -> Option<NodeId> {
        self.intersection_observers.get(&observer).and_then(|s| s.target)
    }

    pub fn intersection_retargets(&self, observer: ObserverId) -> usize {
        self.intersection_observers.get(&observer).map_or(0, |s| s.retargets)
    }

    /// Wrapper layers currently installed over `pushState`/`replaceState`
    pub fn history_wrapper_depth(&self) -> u32 {
        self.history_wrappers
    }

    pub fn history_install_count(&self) -> u32 {
        self.history_installs
    }

    /// Make the platform decline to create the next observer of `kind`
    pub fn refuse_observer(&mut self, kind: ObserverKind) {
        self.refuse_observer = Some(kind);
    }

    pub fn refuse_history(&mut self, refuse: bool) {
        self.refuse_history = refuse;
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn record(&mut self, kind: MutationKind, target: NodeId) {
        if !self.in_body(target) {
            return;
        }
        for state in self.mutation_observers.values_mut() {
            if let MutationKind::Attributes { name } = &kind {
                if !state.attribute_filter.is_empty() && !state.attribute_filter.iter().any(|f| f == name) {
                    continue;
                }
            }
            state.queue.push(MutationRecord {
                kind: kind.clone(),
                target,
            });
        }
    }

    fn in_body(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == self.body {
                return true;
            }
            current = self.nodes[n.0].parent;
        }
        false
    }

    fn is_hidden(&self, node: NodeId) -> bool {
        let data = &self.nodes[node.0];
        data.attributes.iter().any(|(name, value)| {
            name == "hidden"
                || (name == "style" && value.replace(' ', "").to_ascii_lowercase().contains("display:none"))
        })
    }

    fn next_observer_id(&mut self, kind: ObserverKind) -> Result<ObserverId, ObserverSetupError> {
        if self.refuse_observer == Some(kind) {
            self.refuse_observer = None;
            return Err(ObserverSetupError::new(kind, "refused by host"));
        }
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        Ok(id)
    }
}

impl Dom for MemoryDom {
    type Node = NodeId;

    fn root_element(&self) -> Option<NodeId> {
        Some(self.html)
    }

    fn body(&self) -> Option<NodeId> {
        Some(self.body)
    }

    fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, LocatorError> {
        selector::query_first(self, selector)
    }

    fn query_selector_count(&self, selector: &str) -> Result<usize, LocatorError> {
        selector::query_count(self, selector)
    }

    fn evaluate_xpath(&self, expression: &str) -> Result<Option<NodeId>, LocatorError> {
        xpath::evaluate_first(self, expression)
    }

    fn tag_name(&self, node: &NodeId) -> String {
        self.nodes[node.0].tag.clone()
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.nodes[node.0]
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    fn attribute_names(&self, node: &NodeId) -> Vec<String> {
        self.nodes[node.0].attributes.iter().map(|(n, _)| n.clone()).collect()
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) {
        let attributes = &mut self.nodes[node.0].attributes;
        match attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => attributes.push((name.to_string(), value.to_string())),
        }
        self.record(MutationKind::Attributes { name: name.to_string() }, *node);
    }

    fn text_content(&self, node: &NodeId) -> String {
        let data = &self.nodes[node.0];
        let mut out = data.text.clone();
        for child in &data.children {
            out.push_str(&self.text_content(child));
        }
        out
    }

    fn bounding_client_rect(&self, node: &NodeId) -> Rect {
        if !self.is_connected(node) {
            return Rect::default();
        }
        let mut current = Some(*node);
        while let Some(n) = current {
            if self.is_hidden(n) {
                return Rect::default();
            }
            current = self.nodes[n.0].parent;
        }
        self.nodes[node.0].rect.translate(-self.scroll.x, -self.scroll.y)
    }

    fn scroll_offset(&self) -> Point {
        self.scroll
    }

    fn parent_element(&self, node: &NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    fn previous_element_sibling(&self, node: &NodeId) -> Option<NodeId> {
        let parent = self.nodes[node.0].parent?;
        let siblings = &self.nodes[parent.0].children;
        let index = siblings.iter().position(|c| c == node)?;
        index.checked_sub(1).map(|i| siblings[i])
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.nodes[node.0].children.clone()
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        let mut current = Some(*node);
        while let Some(n) = current {
            if n == self.html {
                return true;
            }
            current = self.nodes[n.0].parent;
        }
        false
    }
}

impl Observers for MemoryDom {
    fn observe_mutations(&mut self, attribute_filter: &[String]) -> Result<ObserverId, ObserverSetupError> {
        let id = self.next_observer_id(ObserverKind::Mutation)?;
        self.mutation_observers.insert(
            id,
            MutationObserverState {
                attribute_filter: attribute_filter.to_vec(),
                queue: Vec::new(),
            },
        );
        Ok(id)
    }

    fn observe_intersection(&mut self, _thresholds: &[f64]) -> Result<ObserverId, ObserverSetupError> {
        let id = self.next_observer_id(ObserverKind::Intersection)?;
        self.intersection_observers.insert(id, IntersectionObserverState::default());
        Ok(id)
    }

    fn retarget_intersection(&mut self, observer: ObserverId, target: Option<&NodeId>) -> bool {
        let Some(state) = self.intersection_observers.get_mut(&observer) else {
            return false;
        };
        let target = target.copied();
        if state.target == target {
            return false;
        }
        state.target = target;
        state.retargets += 1;
        true
    }

    fn observe_window(&mut self) -> Result<ObserverId, ObserverSetupError> {
        let id = self.next_observer_id(ObserverKind::Viewport)?;
        self.window_observers.insert(id, Vec::new());
        Ok(id)
    }

    fn take_mutations(&mut self, observer: ObserverId) -> Vec<MutationRecord<NodeId>> {
        self.mutation_observers
            .get_mut(&observer)
            .map(|s| std::mem::take(&mut s.queue))
            .unwrap_or_default()
    }

    fn take_intersections(&mut self, observer: ObserverId) -> Vec<IntersectionEntry> {
        self.intersection_observers
            .get_mut(&observer)
            .map(|s| std::mem::take(&mut s.queue))
            .unwrap_or_default()
    }

    fn take_window_events(&mut self, observer: ObserverId) -> Vec<WindowEvent> {
        self.window_observers
            .get_mut(&observer)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    fn disconnect(&mut self, observer: ObserverId) {
        self.mutation_observers.remove(&observer);
        self.intersection_observers.remove(&observer);
        self.window_observers.remove(&observer);
    }
}

impl HistoryHooks for MemoryDom {
    fn install_history_wrappers(&mut self) -> Result<(), HistoryError> {
        if self.refuse_history {
            return Err(HistoryError::Unavailable("history is frozen".into()));
        }
        self.history_wrappers += 1;
        self.history_installs += 1;
        Ok(())
    }

    fn restore_history(&mut self) {
        self.history_wrappers = self.history_wrappers.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_shape() {
        let dom = MemoryDom::new();
        assert_eq!(dom.tag_name(&dom.html_id()), "html");
        assert_eq!(dom.children(&dom.html_id()).len(), 2);
        assert_eq!(dom.parent_element(&dom.body_id()), Some(dom.html_id()));
    }

    #[test]
    fn test_text_content_concatenates_descendants() {
        let mut dom = MemoryDom::new();
        let body = dom.body_id();
        let p = dom.element(body, "p", &[], "Hello ");
        dom.element(p, "b", &[], "world");
        assert_eq!(dom.text_content(&p), "Hello world");
    }

    #[test]
    fn test_hidden_ancestor_collapses_rect() {
        let mut dom = MemoryDom::new();
        let body = dom.body_id();
        let wrap = dom.element(body, "div", &[], "");
        let btn = dom.element(wrap, "button", &[], "Go");
        dom.set_rect(btn, Rect::new(10.0, 10.0, 50.0, 20.0));
        assert!(dom.bounding_client_rect(&btn).has_area());

        dom.set_attribute(&wrap, "style", "display: none");
        assert!(!dom.bounding_client_rect(&btn).has_area());
    }

    #[test]
    fn test_rect_is_viewport_relative() {
        let mut dom = MemoryDom::new();
        let body = dom.body_id();
        let el = dom.element(body, "div", &[], "");
        dom.set_rect(el, Rect::new(100.0, 900.0, 10.0, 10.0));
        dom.scroll_to(0.0, 500.0);
        assert_eq!(dom.bounding_client_rect(&el), Rect::new(100.0, 400.0, 10.0, 10.0));
    }

    #[test]
    fn test_removed_node_is_disconnected() {
        let mut dom = MemoryDom::new();
        let body = dom.body_id();
        let el = dom.element(body, "div", &[], "");
        dom.set_rect(el, Rect::new(0.0, 0.0, 10.0, 10.0));
        dom.remove(el);
        assert!(!dom.is_connected(&el));
        assert_eq!(dom.bounding_client_rect(&el), Rect::default());
    }

    #[test]
    fn test_mutation_records_respect_attribute_filter() {
        let mut dom = MemoryDom::new();
        let body = dom.body_id();
        let el = dom.element(body, "div", &[], "");
        let id = dom.observe_mutations(&["class".to_string()]).unwrap();

        dom.set_attribute(&el, "title", "ignored");
        dom.set_attribute(&el, "class", "x");
        dom.element(el, "span", &[], "");

        let records = dom.take_mutations(id);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, MutationKind::Attributes { name: "class".into() });
        assert_eq!(records[1].kind, MutationKind::ChildList);
        assert!(dom.take_mutations(id).is_empty());
    }

    #[test]
    fn test_push_state_only_emits_when_wrapped() {
        let mut dom = MemoryDom::new();
        let id = dom.observe_window().unwrap();
        dom.push_state("/a");
        assert!(dom.take_window_events(id).is_empty());

        dom.install_history_wrappers().unwrap();
        dom.push_state("/b");
        dom.replace_state("/c");
        assert_eq!(
            dom.take_window_events(id),
            vec![WindowEvent::PushState, WindowEvent::ReplaceState]
        );
        dom.restore_history();
        assert_eq!(dom.history_wrapper_depth(), 0);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut dom = MemoryDom::new();
        let id = dom.observe_window().unwrap();
        dom.disconnect(id);
        dom.disconnect(id);
        assert_eq!(dom.active_observer_count(), 0);
    }

    #[test]
    fn test_refused_observer() {
        let mut dom = MemoryDom::new();
        dom.refuse_observer(ObserverKind::Mutation);
        assert!(dom.observe_mutations(&[]).is_err());
        // only the next request is refused
        assert!(dom.observe_mutations(&[]).is_ok());
    }
}
