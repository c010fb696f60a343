//! End-to-end anchoring scenarios: capture, mutate the page, track

use pretty_assertions::assert_eq;

use super::{at, record};
use crate::anchor::capture::Capture;
use crate::anchor::resolver::{Tier, DEFAULT_MARKER_ATTRIBUTE};
use crate::anchor::types::{Point, Rect};
use crate::config::TrackerConfig;
use crate::dom::{Dom, MemoryDom};
use crate::tracker::{PositionUpdate, Tracker};
use crate::watcher::HistoryInterceptor;

use instant::Instant;

// ============================================================================
// Scenario A: a decoy must not capture the anchor
// ============================================================================

#[test]
fn test_reinserted_save_button_with_new_text_is_not_found() {
    let mut dom = MemoryDom::new();
    let body = dom.body_id();
    let toolbar = dom.element(body, "div", &[("class", "toolbar")], "");
    let save = dom.element(toolbar, "button", &[("id", "save-btn")], "Save");
    dom.set_rect(save, Rect::new(200.0, 300.0, 100.0, 40.0));
    let footer = dom.element(body, "footer", &[], "");

    let captured = Capture::default().capture(&mut dom, &save, Point::new(210.0, 305.0)).unwrap();
    let mut history = HistoryInterceptor::new();
    let t0 = Instant::now();
    let mut tracker = Tracker::new(captured.descriptor, TrackerConfig::default()).unwrap();
    let updates = record(&mut tracker);
    tracker.activate(&mut dom, &mut history, t0).unwrap();
    assert!(tracker.state().found);

    // the framework re-renders the node elsewhere with a different label;
    // it keeps its id and the marker
    dom.remove(save);
    dom.set_text(save, "Cancel");
    dom.append_child(footer, save);
    dom.set_rect(save, Rect::new(0.0, 700.0, 100.0, 40.0));
    assert!(dom.attribute(&save, DEFAULT_MARKER_ATTRIBUTE).is_some());

    tracker.pump(&mut dom, at(t0, 0));
    tracker.poll(&mut dom, at(t0, 50));

    assert!(!tracker.state().found);
    assert_eq!(
        *updates.borrow().last().unwrap(),
        PositionUpdate {
            position: Some(Point::new(210.0, 305.0)),
            is_visible: false,
        }
    );
}

#[test]
fn test_fresh_decoy_with_same_id_is_not_found() {
    let mut dom = MemoryDom::new();
    let body = dom.body_id();
    let save = dom.element(body, "button", &[("id", "save-btn")], "Save");
    dom.set_rect(save, Rect::new(200.0, 300.0, 100.0, 40.0));
    let captured = Capture::default().capture(&mut dom, &save, Point::new(210.0, 305.0)).unwrap();

    let mut history = HistoryInterceptor::new();
    let t0 = Instant::now();
    let mut tracker = Tracker::new(captured.descriptor, TrackerConfig::default()).unwrap();
    tracker.activate(&mut dom, &mut history, t0).unwrap();

    dom.remove(save);
    let decoy = dom.element(body, "button", &[("id", "save-btn")], "Cancel");
    dom.set_rect(decoy, Rect::new(0.0, 0.0, 100.0, 40.0));
    tracker.pump(&mut dom, at(t0, 0));
    tracker.poll(&mut dom, at(t0, 50));

    assert!(!tracker.state().found);
    assert!(!tracker.current().unwrap().is_visible);
}

// ============================================================================
// Scenario B: selector breaks, XPath recovers
// ============================================================================

#[test]
fn test_renamed_class_recovers_through_xpath() {
    let mut dom = MemoryDom::new();
    let body = dom.body_id();
    let main = dom.element(body, "main", &[], "");
    dom.element(main, "nav", &[], "Home");
    let title = dom.element(main, "h1", &[("class", "hero-title")], "Hello");
    dom.set_rect(title, Rect::new(40.0, 80.0, 600.0, 60.0));

    let captured = Capture::default().capture(&mut dom, &title, Point::new(50.0, 90.0)).unwrap();
    assert_eq!(captured.descriptor.css_selector.as_deref(), Some("h1.hero-title"));
    assert_eq!(captured.descriptor.xpath.as_deref(), Some("/html[1]/body[1]/main[1]/h1[1]"));

    // a reload drops the runtime marker
    dom.remove_attribute(title, DEFAULT_MARKER_ATTRIBUTE);

    let mut history = HistoryInterceptor::new();
    let t0 = Instant::now();
    let mut tracker = Tracker::new(captured.descriptor, TrackerConfig::default()).unwrap();
    let updates = record(&mut tracker);
    tracker.activate(&mut dom, &mut history, t0).unwrap();
    assert_eq!(tracker.state().matched_tier, Some(Tier::CssSelector));

    dom.set_attribute(&title, "class", "hero-title-2");
    tracker.pump(&mut dom, at(t0, 0));
    tracker.poll(&mut dom, at(t0, 50));

    assert_eq!(tracker.stats().evaluations, 2);
    assert!(tracker.state().found);
    assert_eq!(tracker.state().matched_tier, Some(Tier::XPath));
    // no loss: the position never changed, so no further update was needed
    assert_eq!(
        updates.borrow().as_slice(),
        &[PositionUpdate {
            position: Some(Point::new(50.0, 90.0)),
            is_visible: true,
        }]
    );
}

// ============================================================================
// Scenario C: click offset, not centre
// ============================================================================

#[test]
fn test_marker_sits_at_click_point() {
    let mut dom = MemoryDom::new();
    let body = dom.body_id();
    let el = dom.element(body, "div", &[("class", "price")], "$10");
    dom.set_rect(el, Rect::new(200.0, 300.0, 100.0, 40.0));
    let captured = Capture::default().capture(&mut dom, &el, Point::new(210.0, 305.0)).unwrap();

    let mut history = HistoryInterceptor::new();
    let mut tracker = Tracker::new(captured.descriptor, TrackerConfig::default()).unwrap();
    tracker.activate(&mut dom, &mut history, Instant::now()).unwrap();

    let position = tracker.current().unwrap().position.unwrap();
    assert_eq!(position, Point::new(210.0, 305.0));
    assert_ne!(position, Point::new(250.0, 320.0));
}

// ============================================================================
// P7: total loss falls back to the stored rect
// ============================================================================

#[test]
fn test_removed_element_falls_back_to_stored_rect() {
    let mut dom = MemoryDom::new();
    let body = dom.body_id();
    let el = dom.element(body, "p", &[], "Delivery in 3 days");
    dom.set_rect(el, Rect::new(100.0, 900.0, 300.0, 20.0));
    dom.scroll_to(0.0, 600.0);
    let captured = Capture::default().capture(&mut dom, &el, Point::new(150.0, 310.0)).unwrap();
    assert_eq!(captured.descriptor.fallback_rect, Some(Rect::new(100.0, 900.0, 300.0, 20.0)));

    let mut history = HistoryInterceptor::new();
    let t0 = Instant::now();
    let mut tracker = Tracker::new(captured.descriptor, TrackerConfig::default()).unwrap();
    let updates = record(&mut tracker);
    tracker.activate(&mut dom, &mut history, t0).unwrap();
    assert_eq!(tracker.current().unwrap().position, Some(Point::new(150.0, 310.0)));

    dom.remove(el);
    tracker.pump(&mut dom, at(t0, 0));
    tracker.poll(&mut dom, at(t0, 50));

    assert!(!tracker.state().found);
    // unchanged point, now from the stored rect, and hidden
    assert_eq!(
        *updates.borrow().last().unwrap(),
        PositionUpdate {
            position: Some(Point::new(150.0, 310.0)),
            is_visible: false,
        }
    );

    // the fallback point follows scrolling
    dom.scroll_to(0.0, 0.0);
    tracker.pump(&mut dom, at(t0, 100));
    tracker.poll(&mut dom, at(t0, 150));
    assert_eq!(tracker.current().unwrap().position, Some(Point::new(150.0, 910.0)));
}

#[test]
fn test_total_loss_without_fallback_has_no_position() {
    let mut dom = MemoryDom::new();
    let body = dom.body_id();
    let el = dom.element(body, "p", &[], "Gone soon");
    dom.set_rect(el, Rect::new(0.0, 0.0, 10.0, 10.0));
    let mut descriptor = Capture::default().capture(&mut dom, &el, Point::default()).unwrap().descriptor;
    descriptor.fallback_rect = None;

    let mut history = HistoryInterceptor::new();
    let t0 = Instant::now();
    let mut tracker = Tracker::new(descriptor, TrackerConfig::default()).unwrap();
    tracker.activate(&mut dom, &mut history, t0).unwrap();
    dom.remove(el);
    tracker.pump(&mut dom, at(t0, 0));
    tracker.poll(&mut dom, at(t0, 50));

    assert_eq!(tracker.current(), Some(PositionUpdate::default()));
}
