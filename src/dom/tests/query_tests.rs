//! Tests for CSS selector queries against MemoryDom

use crate::dom::{Dom, MemoryDom, NodeId};

/// body > main > (h1.hero-title "Welcome", div#toolbar > (button "Save", button "Cancel"), ul > li*3)
fn fixture() -> (MemoryDom, Vec<NodeId>) {
    let mut dom = MemoryDom::new();
    let body = dom.body_id();
    let main = dom.element(body, "main", &[], "");
    let h1 = dom.element(main, "h1", &[("class", "hero-title large")], "Welcome");
    let toolbar = dom.element(main, "div", &[("id", "toolbar")], "");
    let save = dom.element(toolbar, "button", &[("data-role", "save")], "Save");
    let cancel = dom.element(toolbar, "button", &[("data-role", "cancel")], "Cancel");
    let ul = dom.element(main, "ul", &[], "");
    let items: Vec<NodeId> = (0..3)
        .map(|i| dom.element(ul, "li", &[], &format!("item {}", i)))
        .collect();
    let mut nodes = vec![main, h1, toolbar, save, cancel, ul];
    nodes.extend(items);
    (dom, nodes)
}

// ============================================================================
// Simple selectors
// ============================================================================

#[test]
fn test_id_selector() {
    let (dom, n) = fixture();
    assert_eq!(dom.query_selector("#toolbar").unwrap(), Some(n[2]));
}

#[test]
fn test_class_selector_requires_all_classes() {
    let (dom, n) = fixture();
    assert_eq!(dom.query_selector("h1.hero-title.large").unwrap(), Some(n[1]));
    assert_eq!(dom.query_selector("h1.hero-title.small").unwrap(), None);
}

#[test]
fn test_attribute_selector() {
    let (dom, n) = fixture();
    assert_eq!(dom.query_selector("[data-role=\"cancel\"]").unwrap(), Some(n[4]));
    assert_eq!(dom.query_selector("button[data-role^=sa]").unwrap(), Some(n[3]));
    assert_eq!(dom.find_by_attribute("data-role", "cancel"), Some(n[4]));
}

// ============================================================================
// Structural selectors
// ============================================================================

#[test]
fn test_nth_of_type_path() {
    let (dom, n) = fixture();
    assert_eq!(
        dom.query_selector("main:nth-of-type(1) div:nth-of-type(1) button:nth-of-type(2)").unwrap(),
        Some(n[4])
    );
    assert_eq!(dom.query_selector("ul li:nth-of-type(3)").unwrap(), Some(n[8]));
}

#[test]
fn test_child_and_sibling_combinators() {
    let (dom, n) = fixture();
    assert_eq!(dom.query_selector("main > ul > li:last-child").unwrap(), Some(n[8]));
    assert_eq!(dom.query_selector("h1 + div").unwrap(), Some(n[2]));
    assert_eq!(dom.query_selector("h1 ~ ul").unwrap(), Some(n[5]));
    assert_eq!(dom.query_selector("body > button").unwrap(), None);
}

#[test]
fn test_count_and_selector_lists() {
    let (dom, _) = fixture();
    assert_eq!(dom.query_selector_count("li").unwrap(), 3);
    assert_eq!(dom.query_selector_count("button, h1").unwrap(), 3);
    assert_eq!(dom.query_selector_count("li:nth-child(odd)").unwrap(), 2);
}

#[test]
fn test_document_order() {
    let (dom, n) = fixture();
    assert_eq!(dom.query_selector("button").unwrap(), Some(n[3]));
    assert_eq!(dom.query_selector("*").unwrap(), Some(dom.html_id()));
}

#[test]
fn test_malformed_selector_is_an_error_not_a_miss() {
    let (dom, _) = fixture();
    assert!(dom.query_selector("div[").is_err());
    assert!(dom.query_selector_count(">>").is_err());
}

#[test]
fn test_detached_elements_are_not_found() {
    let (mut dom, n) = fixture();
    dom.remove(n[2]);
    assert_eq!(dom.query_selector("#toolbar").unwrap(), None);
    assert_eq!(dom.query_selector("button").unwrap(), None);
}

// ============================================================================
// Styles
// ============================================================================

#[test]
fn test_inline_styles_keep_relevant_properties() {
    let (mut dom, n) = fixture();
    dom.set_attribute(
        &n[3],
        "style",
        "color: red; cursor: pointer;Font-Size:14px; margin: ; color: blue",
    );
    let styles = dom.computed_styles(&n[3]);
    let pairs: Vec<(&str, &str)> = styles.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    assert_eq!(pairs, vec![("color", "blue"), ("font-size", "14px")]);

    assert!(dom.computed_styles(&n[4]).is_empty());
}
