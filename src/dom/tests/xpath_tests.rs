//! Tests for XPath evaluation against MemoryDom

use crate::dom::{Dom, MemoryDom, NodeId};

fn fixture() -> (MemoryDom, NodeId, NodeId, NodeId) {
    let mut dom = MemoryDom::new();
    let body = dom.body_id();
    let first = dom.element(body, "div", &[("class", "card")], "one");
    let second = dom.element(body, "div", &[("class", "card")], "");
    dom.element(body, "p", &[], "between");
    let span = dom.element(second, "span", &[("data-k", "v")], "two");
    (dom, first, second, span)
}

#[test]
fn test_absolute_positional_path() {
    let (dom, first, second, span) = fixture();
    assert_eq!(dom.evaluate_xpath("/html/body/div[1]").unwrap(), Some(first));
    assert_eq!(dom.evaluate_xpath("/html[1]/body[1]/div[2]").unwrap(), Some(second));
    assert_eq!(dom.evaluate_xpath("/html/body/div[2]/span").unwrap(), Some(span));
}

#[test]
fn test_unindexed_step_yields_first_in_document_order() {
    let (dom, first, _, _) = fixture();
    assert_eq!(dom.evaluate_xpath("/html/body/div").unwrap(), Some(first));
}

#[test]
fn test_descendant_shorthand() {
    let (dom, _, _, span) = fixture();
    assert_eq!(dom.evaluate_xpath("//span").unwrap(), Some(span));
    assert_eq!(dom.evaluate_xpath("//*[@data-k='v']").unwrap(), Some(span));
    assert_eq!(dom.evaluate_xpath("//div[last()]/span").unwrap(), Some(span));
}

#[test]
fn test_parent_and_self_steps() {
    let (dom, _, second, _) = fixture();
    assert_eq!(dom.evaluate_xpath("//span/..").unwrap(), Some(second));
    assert_eq!(dom.evaluate_xpath("/html/body/./div[2]").unwrap(), Some(second));
}

#[test]
fn test_out_of_range_position_is_a_miss() {
    let (dom, _, _, _) = fixture();
    assert_eq!(dom.evaluate_xpath("/html/body/div[3]").unwrap(), None);
    assert_eq!(dom.evaluate_xpath("/html/body/div[0]").unwrap(), None);
    assert_eq!(dom.evaluate_xpath("/nothing").unwrap(), None);
}

#[test]
fn test_malformed_xpath_is_an_error() {
    let (dom, _, _, _) = fixture();
    assert!(dom.evaluate_xpath("/html/body/div[").is_err());
    assert!(dom.evaluate_xpath("///").is_err());
}
