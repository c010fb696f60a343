//! JS bindings
//!
//! ```javascript,ignore
//! import init, { captureElement, AnchorTracker } from 'anchorcore';
//!
//! await init();
//! const captured = captureElement(event.target, event.clientX, event.clientY);
//! const tracker = new AnchorTracker(captured.descriptor, {}, ({ position, isVisible }) => {
//!   marker.style.display = isVisible ? 'block' : 'none';
//!   if (position) marker.style.transform = `translate(${position.x}px, ${position.y}px)`;
//! });
//! tracker.start();
//! // ...
//! tracker.destroy();
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use instant::Instant;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::Element;

use crate::anchor::capture::Capture;
use crate::anchor::resolver::IdentityResolver;
use crate::anchor::types::{AnchorDescriptor, Point};
use crate::comment::{Comment, CommentEvent};
use crate::config::{CaptureConfig, TrackerConfig};
use crate::dom::web::WebDom;
use crate::error::TrackerError;
use crate::tracker::{PositionUpdate, Tracker, TrackerSet};
use crate::watcher::HistoryInterceptor;

thread_local! {
    /// History interception is page-global; every tracker on the page shares it.
    static HISTORY: RefCell<HistoryInterceptor> = RefCell::new(HistoryInterceptor::new());
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(js_err)
}

/// Missing or `undefined` options take defaults
fn options<T: serde::de::DeserializeOwned + Default>(value: JsValue) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(js_err)
}

fn busy() -> JsValue {
    JsValue::from_str("anchorcore: called from inside an update callback")
}

fn report(context: &str, e: JsValue) {
    web_sys::console::error_2(&JsValue::from_str(context), &e);
}

// =============================================================================
// One-shot helpers
// =============================================================================

/// Capture a clicked element. Returns `{ descriptor, context }`.
#[wasm_bindgen(js_name = captureElement)]
pub fn capture_element(element: Element, client_x: f64, client_y: f64, config: JsValue) -> Result<JsValue, JsValue> {
    let config: CaptureConfig = options(config)?;
    let mut dom = WebDom::new()?;
    let captured = Capture::new(config)
        .capture(&mut dom, &element, Point::new(client_x, client_y))
        .map_err(js_err)?;
    to_js(&captured)
}

/// Element currently matching a descriptor, or `undefined`
#[wasm_bindgen(js_name = resolveElement)]
pub fn resolve_element(descriptor: JsValue, config: JsValue) -> Result<Option<Element>, JsValue> {
    let descriptor: AnchorDescriptor = serde_wasm_bindgen::from_value(descriptor).map_err(js_err)?;
    let config: TrackerConfig = options(config)?;
    let dom = WebDom::new()?;
    Ok(IdentityResolver::new(config.marker_attribute, config.verification).find(&dom, &descriptor))
}

// =============================================================================
// Driver
// =============================================================================

/// Anything that can be pumped and polled against the live page
trait Engine {
    fn pump(&mut self, dom: &mut WebDom, now: Instant);
    fn next_deadline(&self) -> Option<Instant>;
    fn teardown(&mut self, dom: &mut WebDom);
}

impl Engine for Tracker {
    fn pump(&mut self, dom: &mut WebDom, now: Instant) {
        Tracker::pump(self, dom, now);
    }

    fn next_deadline(&self) -> Option<Instant> {
        Tracker::next_deadline(self)
    }

    fn teardown(&mut self, dom: &mut WebDom) {
        HISTORY.with(|h| Tracker::teardown(self, dom, &mut h.borrow_mut()));
    }
}

impl Engine for TrackerSet {
    fn pump(&mut self, dom: &mut WebDom, now: Instant) {
        TrackerSet::pump(self, dom, now);
    }

    fn next_deadline(&self) -> Option<Instant> {
        TrackerSet::next_deadline(self)
    }

    fn teardown(&mut self, dom: &mut WebDom) {
        self.teardown_all(dom);
    }
}

struct Driven<E> {
    dom: WebDom,
    engine: E,
    timer: Option<i32>,
    tick: Option<Closure<dyn FnMut()>>,
    /// Set by `destroy()` while a pump is delivering updates
    stop_requested: Rc<Cell<bool>>,
}

impl<E: Engine> Driven<E> {
    fn new(dom: WebDom, engine: E) -> Self {
        Self {
            dom,
            engine,
            timer: None,
            tick: None,
            stop_requested: Rc::new(Cell::new(false)),
        }
    }

    /// Drain observers, run what is due and re-arm the single timer.
    fn pump(&mut self) {
        self.engine.pump(&mut self.dom, Instant::now());
        self.settle();
    }

    /// Honor a deferred `destroy()`, otherwise re-arm.
    fn settle(&mut self) {
        if self.stop_requested.get() {
            self.stop();
        } else {
            self.arm();
        }
    }

    fn arm(&mut self) {
        if let Some(handle) = self.timer.take() {
            self.dom.window().clear_timeout_with_handle(handle);
        }
        let (Some(deadline), Some(tick)) = (self.engine.next_deadline(), self.tick.as_ref()) else {
            return;
        };
        let now = Instant::now();
        let delay = (if deadline > now { deadline - now } else { Duration::ZERO }).as_millis();
        match self
            .dom
            .window()
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                tick.as_ref().unchecked_ref(),
                i32::try_from(delay).unwrap_or(i32::MAX),
            ) {
            Ok(handle) => self.timer = Some(handle),
            Err(e) => report("anchorcore: failed to arm timer", e),
        }
    }

    fn stop(&mut self) {
        self.stop_requested.set(true);
        if let Some(handle) = self.timer.take() {
            self.dom.window().clear_timeout_with_handle(handle);
        }
        self.dom.clear_wake();
        // the tick closure may be the caller; it is dropped with `Driven`
        self.engine.teardown(&mut self.dom);
    }
}

/// Pump on wake-ups and timer ticks. A wake-up that arrives while the
/// engine is busy is picked up by the next pump; queued records persist.
fn hook_up<E: Engine + 'static>(driven: &Rc<RefCell<Driven<E>>>) {
    let weak: Weak<RefCell<Driven<E>>> = Rc::downgrade(driven);
    let pump = move || {
        if let Some(rc) = weak.upgrade() {
            if let Ok(mut d) = rc.try_borrow_mut() {
                d.pump();
            }
        }
    };
    let pump = Rc::new(pump);

    let tick_pump = Rc::clone(&pump);
    let mut d = driven.borrow_mut();
    d.tick = Some(Closure::<dyn FnMut()>::new(move || tick_pump()));
    d.dom.set_wake(pump);
}

/// Stops now, or right after the pump that is currently delivering updates.
fn destroy<E: Engine>(inner: &Rc<RefCell<Driven<E>>>, stop_requested: &Cell<bool>) {
    stop_requested.set(true);
    if let Ok(mut d) = inner.try_borrow_mut() {
        d.stop();
    }
}

fn forward_update(callback: &js_sys::Function, args: &[JsValue]) {
    let this = JsValue::NULL;
    let result = match args {
        [a] => callback.call1(&this, a),
        [a, b] => callback.call2(&this, a, b),
        _ => return,
    };
    if let Err(e) = result {
        report("anchorcore: update callback threw", e);
    }
}

fn update_js(update: &PositionUpdate) -> JsValue {
    to_js(update).unwrap_or_else(|e| {
        report("anchorcore: failed to serialize update", e);
        JsValue::UNDEFINED
    })
}

// =============================================================================
// AnchorTracker
// =============================================================================

/// Live position of one anchored comment
#[wasm_bindgen]
pub struct AnchorTracker {
    inner: Rc<RefCell<Driven<Tracker>>>,
    stop_requested: Rc<Cell<bool>>,
}

#[wasm_bindgen]
impl AnchorTracker {
    /// `callback` receives `{ position: {x, y} | null, isVisible }` on every change.
    #[wasm_bindgen(constructor)]
    pub fn new(descriptor: JsValue, config: JsValue, callback: js_sys::Function) -> Result<AnchorTracker, JsValue> {
        let descriptor: AnchorDescriptor = serde_wasm_bindgen::from_value(descriptor).map_err(js_err)?;
        let config: TrackerConfig = options(config)?;
        let mut tracker = Tracker::new(descriptor, config).map_err(js_err)?;
        tracker.subscribe(move |update| forward_update(&callback, &[update_js(update)]));

        let inner = Rc::new(RefCell::new(Driven::new(WebDom::new()?, tracker)));
        hook_up(&inner);
        let stop_requested = Rc::clone(&inner.borrow().stop_requested);
        Ok(AnchorTracker { inner, stop_requested })
    }

    /// Begin observing. Rejects when the page cannot support continuous
    /// tracking; a single best-effort update has been delivered by then.
    #[wasm_bindgen]
    pub fn start(&self) -> Result<(), JsValue> {
        let mut d = self.inner.try_borrow_mut().map_err(|_| busy())?;
        let d = &mut *d;
        let result = HISTORY.with(|h| d.engine.activate(&mut d.dom, &mut h.borrow_mut(), Instant::now()));
        d.settle();
        result.map_err(js_err)
    }

    /// Re-evaluate now, skipping the debounce window
    #[wasm_bindgen]
    pub fn refresh(&self) -> Result<(), JsValue> {
        let mut d = self.inner.try_borrow_mut().map_err(|_| busy())?;
        let d = &mut *d;
        d.engine.refresh(&mut d.dom, Instant::now());
        d.settle();
        Ok(())
    }

    /// Last published update, or `undefined` before the first evaluation
    #[wasm_bindgen]
    pub fn current(&self) -> Result<JsValue, JsValue> {
        match self.inner.try_borrow().map_err(|_| busy())?.engine.current() {
            Some(update) => to_js(&update),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    #[wasm_bindgen(getter)]
    pub fn phase(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.try_borrow().map_err(|_| busy())?.engine.phase())
    }

    #[wasm_bindgen(js_name = getStats)]
    pub fn stats(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.try_borrow().map_err(|_| busy())?.engine.stats())
    }

    /// Stop observing and release everything. Safe to call twice.
    #[wasm_bindgen]
    pub fn destroy(&self) {
        destroy(&self.inner, &self.stop_requested);
    }
}

// =============================================================================
// AnchorTrackerSet
// =============================================================================

/// Every comment marker on the current page
#[wasm_bindgen]
pub struct AnchorTrackerSet {
    inner: Rc<RefCell<Driven<TrackerSet>>>,
    stop_requested: Rc<Cell<bool>>,
}

#[wasm_bindgen]
impl AnchorTrackerSet {
    /// `callback(commentId, update)` fires for every change of any marker.
    #[wasm_bindgen(constructor)]
    pub fn new(page_url: String, config: JsValue, callback: js_sys::Function) -> Result<AnchorTrackerSet, JsValue> {
        let config: TrackerConfig = options(config)?;
        let mut set = TrackerSet::new(page_url, config).map_err(js_err)?;
        set.on_update(move |id, update| forward_update(&callback, &[JsValue::from_str(id), update_js(update)]));

        let inner = Rc::new(RefCell::new(Driven::new(WebDom::new()?, set)));
        hook_up(&inner);
        let stop_requested = Rc::clone(&inner.borrow().stop_requested);
        Ok(AnchorTrackerSet { inner, stop_requested })
    }

    /// Track exactly the trackable comments in `comments` (a `Comment[]`).
    #[wasm_bindgen]
    pub fn sync(&self, comments: JsValue) -> Result<(), JsValue> {
        let comments: Vec<Comment> = serde_wasm_bindgen::from_value(comments).map_err(js_err)?;
        self.apply(|set, dom| set.sync(dom, &comments, Instant::now()))
    }

    /// Apply a relay message (JSON text)
    #[wasm_bindgen(js_name = applyEvent)]
    pub fn apply_event(&self, json: &str) -> Result<(), JsValue> {
        let event = CommentEvent::from_json(json).map_err(js_err)?;
        self.apply(|set, dom| set.apply_event(dom, &event, Instant::now()))
    }

    #[wasm_bindgen(getter)]
    pub fn size(&self) -> Result<usize, JsValue> {
        Ok(self.inner.try_borrow().map_err(|_| busy())?.engine.len())
    }

    #[wasm_bindgen]
    pub fn current(&self, comment_id: &str) -> Result<JsValue, JsValue> {
        match self.inner.try_borrow().map_err(|_| busy())?.engine.get(comment_id).and_then(Tracker::current) {
            Some(update) => to_js(&update),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    #[wasm_bindgen]
    pub fn destroy(&self) {
        destroy(&self.inner, &self.stop_requested);
    }
}

impl AnchorTrackerSet {
    fn apply<F>(&self, f: F) -> Result<(), JsValue>
    where
        F: FnOnce(&mut TrackerSet, &mut WebDom) -> Result<(), TrackerError>,
    {
        let mut d = self.inner.try_borrow_mut().map_err(|_| busy())?;
        let d = &mut *d;
        let result = f(&mut d.engine, &mut d.dom);
        d.settle();
        result.map_err(js_err)
    }
}
