//! Capture: derive an anchor from a clicked element
//!
//! The inverse of the resolver. Writes a stable id onto the element (or
//! reuses one already there), generates a selector and an absolute XPath,
//! and snapshots text, click offset and page-space rect.
//!
//! Selector generation, in order:
//! - `#id` when the id is unique in the document
//! - `tag.class...` (widget classes removed) when it matches exactly one element
//! - `tag:nth-of-type(i)` segments from the element up to `<body>`
//!
//! Generation is deterministic: the same tree always yields the same strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::anchor::types::{normalize_text, AnchorDescriptor, ClickOffset, Point};
use crate::comment::{DomContext, ElementInfo};
use crate::config::CaptureConfig;
use crate::dom::selector::{escape_ident, sibling_index};
use crate::dom::Dom;
use crate::error::CaptureError;

const RELEVANT_ATTRIBUTES: &[&str] = &["href", "src", "alt", "title", "placeholder", "type", "name"];

/// Descriptor plus the surrounding context stored alongside a comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedAnchor {
    pub descriptor: AnchorDescriptor,
    pub context: ElementContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementContext {
    pub tag: String,
    pub dom_context: DomContext,
    pub attributes: BTreeMap<String, String>,
    pub computed_styles: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct Capture {
    config: CaptureConfig,
}

impl Capture {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture `element`, clicked at viewport point `click`.
    pub fn capture<D: Dom + ?Sized>(
        &self,
        dom: &mut D,
        element: &D::Node,
        click: Point,
    ) -> Result<CapturedAnchor, CaptureError> {
        if !dom.is_connected(element) {
            return Err(CaptureError::Detached);
        }
        if self.is_widget_element(dom, element) {
            return Err(CaptureError::WidgetElement);
        }

        let context = self.element_context(dom, element);
        let css_selector = self.generate_selector(dom, element);
        let xpath = generate_xpath(dom, element);

        let rect = dom.bounding_client_rect(element);
        let scroll = dom.scroll_offset();
        let text_snapshot = normalize_text(&dom.text_content(element));

        let stable_id = match dom.attribute(element, &self.config.marker_attribute) {
            Some(existing) if !existing.is_empty() => existing,
            _ => {
                let id = uuid::Uuid::new_v4().to_string();
                dom.set_attribute(element, &self.config.marker_attribute, &id);
                id
            }
        };

        debug!(selector = %css_selector, xpath = %xpath, "captured anchor");

        Ok(CapturedAnchor {
            descriptor: AnchorDescriptor {
                stable_id: Some(stable_id),
                css_selector: Some(css_selector),
                xpath: Some(xpath),
                text_snapshot,
                click_offset: Some(ClickOffset::new(click.x - rect.left(), click.y - rect.top())),
                fallback_rect: Some(rect.translate(scroll.x, scroll.y)),
            },
            context,
        })
    }

    // =========================================================================
    // Self-filtering
    // =========================================================================

    /// The widget root, anything inside it, or the widget's marker class.
    ///
    /// The class prefix is not consulted here: host pages routinely use
    /// `rc-` classes of their own, such as `rc-select`.
    pub fn is_widget_element<D: Dom + ?Sized>(&self, dom: &D, element: &D::Node) -> bool {
        let marker = self.config.widget_marker_class.as_str();
        if !marker.is_empty() && dom.class_list(element).iter().any(|c| c == marker) {
            return true;
        }
        let mut current = Some(element.clone());
        while let Some(node) = current {
            if dom.element_id(&node).as_deref() == Some(self.config.widget_root_id.as_str()) {
                return true;
            }
            current = dom.parent_element(&node);
        }
        false
    }

    // =========================================================================
    // Selector generation
    // =========================================================================

    pub fn generate_selector<D: Dom + ?Sized>(&self, dom: &D, element: &D::Node) -> String {
        if let Some(id) = dom.element_id(element) {
            let selector = format!("#{}", escape_ident(&id));
            if dom.query_selector_count(&selector).ok() == Some(1) {
                return selector;
            }
        }

        let classes: Vec<String> = dom
            .class_list(element)
            .into_iter()
            .filter(|c| self.config.widget_class_prefix.is_empty() || !c.starts_with(&self.config.widget_class_prefix))
            .collect();
        if !classes.is_empty() {
            let mut selector = dom.tag_name(element);
            for class in &classes {
                selector.push('.');
                selector.push_str(&escape_ident(class));
            }
            if dom.query_selector_count(&selector).ok() == Some(1) {
                return selector;
            }
        }

        positional_selector(dom, element)
    }

    // =========================================================================
    // Context
    // =========================================================================

    pub fn element_context<D: Dom + ?Sized>(&self, dom: &D, element: &D::Node) -> ElementContext {
        ElementContext {
            tag: dom.tag_name(element),
            dom_context: DomContext {
                ancestor_path: self.ancestor_path(dom, element),
                siblings: siblings(dom, element),
            },
            attributes: self.relevant_attributes(dom, element),
            computed_styles: dom.computed_styles(element),
        }
    }

    fn ancestor_path<D: Dom + ?Sized>(&self, dom: &D, element: &D::Node) -> Vec<ElementInfo> {
        let body = dom.body();
        let mut out = Vec::new();
        let mut current = dom.parent_element(element);
        while let Some(node) = current {
            if out.len() >= self.config.ancestor_depth || Some(&node) == body.as_ref() {
                break;
            }
            let mut info = element_info(dom, &node);
            info.text = normalize_text(&dom.text_content(&node)).map(|t| truncate_graphemes(&t, self.config.text_preview_len));
            out.push(info);
            current = dom.parent_element(&node);
        }
        out
    }

    fn relevant_attributes<D: Dom + ?Sized>(&self, dom: &D, element: &D::Node) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for name in dom.attribute_names(element) {
            let relevant = RELEVANT_ATTRIBUTES.contains(&name.as_str())
                || name.starts_with("data-")
                || name.starts_with("aria-");
            if !relevant || name == self.config.marker_attribute {
                continue;
            }
            if let Some(value) = dom.attribute(element, &name).filter(|v| !v.is_empty()) {
                out.insert(name, value);
            }
        }
        out
    }
}

/// Absolute XPath with a 1-based same-tag index on every step
pub fn generate_xpath<D: Dom + ?Sized>(dom: &D, element: &D::Node) -> String {
    let mut parts = Vec::new();
    let mut current = Some(element.clone());
    while let Some(node) = current {
        parts.push(format!("{}[{}]", dom.tag_name(&node), sibling_index(dom, &node, true)));
        current = dom.parent_element(&node);
    }
    parts.reverse();
    format!("/{}", parts.join("/"))
}

/// `tag:nth-of-type(i)` segments from `element` up to, excluding, `<body>`
pub fn positional_selector<D: Dom + ?Sized>(dom: &D, element: &D::Node) -> String {
    let body = dom.body();
    let mut parts = Vec::new();
    let mut current = Some(element.clone());
    while let Some(node) = current {
        if Some(&node) == body.as_ref() {
            break;
        }
        parts.push(format!("{}:nth-of-type({})", dom.tag_name(&node), sibling_index(dom, &node, true)));
        current = dom.parent_element(&node);
    }
    if parts.is_empty() {
        return "body".to_string();
    }
    parts.reverse();
    parts.join(" ")
}

fn element_info<D: Dom + ?Sized>(dom: &D, node: &D::Node) -> ElementInfo {
    let classes = dom.class_list(node);
    ElementInfo {
        tag: dom.tag_name(node),
        id: dom.element_id(node),
        classes: (!classes.is_empty()).then_some(classes),
        text: None,
    }
}

fn siblings<D: Dom + ?Sized>(dom: &D, element: &D::Node) -> Vec<ElementInfo> {
    let Some(parent) = dom.parent_element(element) else {
        return Vec::new();
    };
    dom.children(&parent)
        .iter()
        .filter(|s| *s != element)
        .map(|s| element_info(dom, s))
        .collect()
}

fn truncate_graphemes(text: &str, max: usize) -> String {
    text.graphemes(true).take(max).collect()
}
