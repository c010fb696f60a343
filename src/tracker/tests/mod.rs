mod scenario_tests;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use instant::Instant;

use crate::anchor::capture::Capture;
use crate::anchor::types::{AnchorDescriptor, Point, Rect};
use crate::config::TrackerConfig;
use crate::dom::{MemoryDom, NodeId};
use crate::tracker::{PositionUpdate, Tracker};
use crate::watcher::HistoryInterceptor;

pub(super) fn at(t0: Instant, ms: u64) -> Instant {
    t0 + Duration::from_millis(ms)
}

pub(super) type Updates = Rc<RefCell<Vec<PositionUpdate>>>;

/// Collect every update the tracker publishes
pub(super) fn record(tracker: &mut Tracker) -> Updates {
    let updates: Updates = Rc::default();
    let sink = Rc::clone(&updates);
    tracker.subscribe(move |u| sink.borrow_mut().push(*u));
    updates
}

/// A document with one visible, captured `<p>` in `<main>`
pub(super) struct Page {
    pub dom: MemoryDom,
    pub history: HistoryInterceptor,
    pub target: NodeId,
    pub descriptor: AnchorDescriptor,
    pub t0: Instant,
}

impl Page {
    pub fn new() -> Self {
        let mut dom = MemoryDom::new();
        let body = dom.body_id();
        let main = dom.element(body, "main", &[], "");
        let target = dom.element(main, "p", &[("class", "note")], "Shipping is free");
        dom.set_rect(target, Rect::new(100.0, 200.0, 300.0, 20.0));
        let descriptor = Capture::default()
            .capture(&mut dom, &target, Point::new(110.0, 205.0))
            .unwrap()
            .descriptor;
        Self {
            dom,
            history: HistoryInterceptor::new(),
            target,
            descriptor,
            t0: Instant::now(),
        }
    }

    pub fn tracker(&self) -> Tracker {
        self.tracker_with(TrackerConfig::default())
    }

    pub fn tracker_with(&self, config: TrackerConfig) -> Tracker {
        Tracker::new(self.descriptor.clone(), config).unwrap()
    }

    pub fn activate(&mut self, tracker: &mut Tracker) {
        tracker.activate(&mut self.dom, &mut self.history, self.t0).unwrap();
    }

    pub fn pump(&mut self, tracker: &mut Tracker, ms: u64) {
        tracker.pump(&mut self.dom, at(self.t0, ms));
    }

    pub fn poll(&mut self, tracker: &mut Tracker, ms: u64) {
        tracker.poll(&mut self.dom, at(self.t0, ms));
    }
}
