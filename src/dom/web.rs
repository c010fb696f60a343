//! WebDom: the live browser document through `web-sys`
//!
//! Observer callbacks only queue records and call the wake hook; draining
//! and deciding happens in the tracker on the next pump. The history
//! wrappers are page-global, so their state lives in a thread-local patch
//! rather than in any one `WebDom`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use js_sys::{Array, Function, Reflect};
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, Event, IntersectionObserver, IntersectionObserverEntry, IntersectionObserverInit,
    MutationObserver, MutationObserverInit, Window,
};

use crate::anchor::types::{Point, Rect};
use crate::dom::{
    Dom, HistoryHooks, IntersectionEntry, MutationKind, MutationRecord, ObserverId, Observers, WindowEvent,
    RELEVANT_STYLES,
};
use crate::error::{HistoryError, LocatorError, ObserverKind, ObserverSetupError};

/// Dispatched on `window` by the wrapped `history.pushState`
pub const PUSH_STATE_EVENT: &str = "rc:pushstate";
/// Dispatched on `window` by the wrapped `history.replaceState`
pub const REPLACE_STATE_EVENT: &str = "rc:replacestate";

/// `XPathResult.FIRST_ORDERED_NODE_TYPE`
const FIRST_ORDERED_NODE_TYPE: u32 = 9;

type Wake = Rc<RefCell<Option<Rc<dyn Fn()>>>>;

fn js_reason(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| value.dyn_ref::<js_sys::Error>().map(|e| String::from(e.message())))
        .unwrap_or_else(|| format!("{:?}", value))
}

/// Put an original history method back; a failure leaves the wrapper in place.
fn put_state_fn(history: &JsValue, method: &'static str, original: &Function) -> bool {
    match Reflect::set(history, &JsValue::from_str(method), original) {
        Ok(true) => true,
        Ok(false) => {
            warn!(method, "history method is read-only, wrapper left installed");
            false
        }
        Err(e) => {
            warn!(method, error = %js_reason(&e), "failed to restore history method");
            false
        }
    }
}

fn remove_listener(window: &Window, name: &str, listener: &Closure<dyn FnMut(Event)>) {
    if let Err(e) = window.remove_event_listener_with_callback(name, listener.as_ref().unchecked_ref()) {
        warn!(event = name, error = %js_reason(&e), "removeEventListener failed");
    }
}

fn wake(slot: &Wake) {
    let hook = slot.borrow().clone();
    if let Some(hook) = hook {
        hook();
    }
}

// =============================================================================
// Observer slots
// =============================================================================

struct MutationSlot {
    observer: MutationObserver,
    queue: Rc<RefCell<Vec<MutationRecord<Element>>>>,
    _callback: Closure<dyn FnMut(Array, MutationObserver)>,
}

struct IntersectionSlot {
    observer: IntersectionObserver,
    target: Option<Element>,
    queue: Rc<RefCell<Vec<IntersectionEntry>>>,
    _callback: Closure<dyn FnMut(Array, IntersectionObserver)>,
}

struct WindowSlot {
    queue: Rc<RefCell<Vec<WindowEvent>>>,
    listeners: Vec<(&'static str, Closure<dyn FnMut(Event)>)>,
}

const WINDOW_EVENTS: [(&str, WindowEvent); 6] = [
    ("scroll", WindowEvent::Scroll),
    ("resize", WindowEvent::Resize),
    ("popstate", WindowEvent::PopState),
    ("hashchange", WindowEvent::HashChange),
    (PUSH_STATE_EVENT, WindowEvent::PushState),
    (REPLACE_STATE_EVENT, WindowEvent::ReplaceState),
];

// =============================================================================
// WebDom
// =============================================================================

pub struct WebDom {
    window: Window,
    document: Document,
    next_observer: u32,
    mutations: BTreeMap<ObserverId, MutationSlot>,
    intersections: BTreeMap<ObserverId, IntersectionSlot>,
    windows: BTreeMap<ObserverId, WindowSlot>,
    wake: Wake,
}

impl WebDom {
    pub fn new() -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no global window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("window has no document"))?;
        Ok(Self {
            window,
            document,
            next_observer: 1,
            mutations: BTreeMap::new(),
            intersections: BTreeMap::new(),
            windows: BTreeMap::new(),
            wake: Rc::new(RefCell::new(None)),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Called after any observer queues something
    pub fn set_wake(&self, hook: Rc<dyn Fn()>) {
        *self.wake.borrow_mut() = Some(hook);
    }

    pub fn clear_wake(&self) {
        self.wake.borrow_mut().take();
    }

    fn next_id(&mut self) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        id
    }

    fn count(&self, selector: &str) -> Result<usize, LocatorError> {
        self.document
            .query_selector_all(selector)
            .map(|list| list.length() as usize)
            .map_err(|e| LocatorError::selector(selector, js_reason(&e)))
    }
}

impl Dom for WebDom {
    type Node = Element;

    fn root_element(&self) -> Option<Element> {
        self.document.document_element()
    }

    fn body(&self) -> Option<Element> {
        self.document.body().map(JsCast::unchecked_into)
    }

    fn query_selector(&self, selector: &str) -> Result<Option<Element>, LocatorError> {
        self.document
            .query_selector(selector)
            .map_err(|e| LocatorError::selector(selector, js_reason(&e)))
    }

    fn query_selector_count(&self, selector: &str) -> Result<usize, LocatorError> {
        self.count(selector)
    }

    fn evaluate_xpath(&self, expression: &str) -> Result<Option<Element>, LocatorError> {
        let invalid = |e: JsValue| LocatorError::xpath(expression, js_reason(&e));
        let evaluate: Function = Reflect::get(&self.document, &JsValue::from_str("evaluate"))
            .map_err(invalid)?
            .dyn_into()
            .map_err(invalid)?;

        let args = Array::new();
        args.push(&JsValue::from_str(expression));
        args.push(&self.document);
        args.push(&JsValue::NULL);
        args.push(&JsValue::from(FIRST_ORDERED_NODE_TYPE));
        args.push(&JsValue::NULL);

        let result = evaluate.apply(&self.document, &args).map_err(invalid)?;
        let node = Reflect::get(&result, &JsValue::from_str("singleNodeValue")).map_err(invalid)?;
        Ok(node.dyn_into::<Element>().ok())
    }

    fn tag_name(&self, node: &Element) -> String {
        node.local_name().to_ascii_lowercase()
    }

    fn attribute(&self, node: &Element, name: &str) -> Option<String> {
        node.get_attribute(name)
    }

    fn attribute_names(&self, node: &Element) -> Vec<String> {
        node.get_attribute_names().iter().filter_map(|n| n.as_string()).collect()
    }

    fn set_attribute(&mut self, node: &Element, name: &str, value: &str) {
        if let Err(e) = node.set_attribute(name, value) {
            warn!(attribute = name, error = %js_reason(&e), "set_attribute failed");
        }
    }

    fn text_content(&self, node: &Element) -> String {
        node.text_content().unwrap_or_default()
    }

    fn computed_styles(&self, node: &Element) -> BTreeMap<String, String> {
        let style = match self.window.get_computed_style(node) {
            Ok(Some(style)) => style,
            Ok(None) => return BTreeMap::new(),
            Err(e) => {
                warn!(error = %js_reason(&e), "getComputedStyle failed");
                return BTreeMap::new();
            }
        };
        RELEVANT_STYLES
            .iter()
            .filter_map(|&prop| {
                let value = style.get_property_value(prop).ok()?;
                (!value.is_empty()).then(|| (prop.to_string(), value))
            })
            .collect()
    }

    fn bounding_client_rect(&self, node: &Element) -> Rect {
        let r = node.get_bounding_client_rect();
        Rect::new(r.x(), r.y(), r.width(), r.height())
    }

    fn scroll_offset(&self) -> Point {
        Point::new(
            self.window.scroll_x().unwrap_or(0.0),
            self.window.scroll_y().unwrap_or(0.0),
        )
    }

    fn parent_element(&self, node: &Element) -> Option<Element> {
        node.parent_element()
    }

    fn previous_element_sibling(&self, node: &Element) -> Option<Element> {
        node.previous_element_sibling()
    }

    fn children(&self, node: &Element) -> Vec<Element> {
        let children = node.children();
        (0..children.length()).filter_map(|i| children.item(i)).collect()
    }

    fn is_connected(&self, node: &Element) -> bool {
        node.is_connected()
    }
}

// =============================================================================
// Observers
// =============================================================================

fn to_record(record: web_sys::MutationRecord) -> Option<MutationRecord<Element>> {
    let target = record.target()?;
    let (kind, target) = match record.type_().as_str() {
        "childList" => (MutationKind::ChildList, target.dyn_into::<Element>().ok()?),
        "attributes" => (
            MutationKind::Attributes {
                name: record.attribute_name().unwrap_or_default(),
            },
            target.dyn_into::<Element>().ok()?,
        ),
        "characterData" => (MutationKind::CharacterData, target.parent_element()?),
        _ => return None,
    };
    Some(MutationRecord { kind, target })
}

impl Observers for WebDom {
    fn observe_mutations(&mut self, attribute_filter: &[String]) -> Result<ObserverId, ObserverSetupError> {
        let fail = |e: JsValue| ObserverSetupError::new(ObserverKind::Mutation, js_reason(&e));
        let body = self
            .document
            .body()
            .ok_or_else(|| ObserverSetupError::new(ObserverKind::Mutation, "document has no body"))?;

        let queue: Rc<RefCell<Vec<MutationRecord<Element>>>> = Rc::default();
        let sink = Rc::clone(&queue);
        let wake_slot = Rc::clone(&self.wake);
        let callback = Closure::<dyn FnMut(Array, MutationObserver)>::new(move |records: Array, _: MutationObserver| {
            let mut queued = false;
            for record in records.iter() {
                if let Some(r) = to_record(record.unchecked_into()) {
                    sink.borrow_mut().push(r);
                    queued = true;
                }
            }
            if queued {
                wake(&wake_slot);
            }
        });

        let observer = MutationObserver::new(callback.as_ref().unchecked_ref()).map_err(fail)?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        init.set_character_data(true);
        init.set_attributes(true);
        if !attribute_filter.is_empty() {
            let filter: Array = attribute_filter.iter().map(|a| JsValue::from_str(a)).collect();
            init.set_attribute_filter(&filter);
        }
        observer.observe_with_options(&body, &init).map_err(fail)?;

        let id = self.next_id();
        self.mutations.insert(
            id,
            MutationSlot {
                observer,
                queue,
                _callback: callback,
            },
        );
        Ok(id)
    }

    fn observe_intersection(&mut self, thresholds: &[f64]) -> Result<ObserverId, ObserverSetupError> {
        let queue: Rc<RefCell<Vec<IntersectionEntry>>> = Rc::default();
        let sink = Rc::clone(&queue);
        let wake_slot = Rc::clone(&self.wake);
        let callback = Closure::<dyn FnMut(Array, IntersectionObserver)>::new(move |entries: Array, _: IntersectionObserver| {
            for entry in entries.iter() {
                let entry: IntersectionObserverEntry = entry.unchecked_into();
                sink.borrow_mut().push(IntersectionEntry {
                    is_intersecting: entry.is_intersecting(),
                    ratio: entry.intersection_ratio(),
                });
            }
            wake(&wake_slot);
        });

        let init = IntersectionObserverInit::new();
        let threshold: Array = thresholds.iter().map(|t| JsValue::from_f64(*t)).collect();
        init.set_threshold(&threshold);
        let observer = IntersectionObserver::new_with_options(callback.as_ref().unchecked_ref(), &init)
            .map_err(|e| ObserverSetupError::new(ObserverKind::Intersection, js_reason(&e)))?;

        let id = self.next_id();
        self.intersections.insert(
            id,
            IntersectionSlot {
                observer,
                target: None,
                queue,
                _callback: callback,
            },
        );
        Ok(id)
    }

    fn retarget_intersection(&mut self, observer: ObserverId, target: Option<&Element>) -> bool {
        let Some(slot) = self.intersections.get_mut(&observer) else {
            return false;
        };
        if slot.target.as_ref() == target {
            return false;
        }
        if let Some(old) = slot.target.take() {
            slot.observer.unobserve(&old);
        }
        if let Some(new) = target {
            slot.observer.observe(new);
            slot.target = Some(new.clone());
        }
        slot.queue.borrow_mut().clear();
        true
    }

    fn observe_window(&mut self) -> Result<ObserverId, ObserverSetupError> {
        let queue: Rc<RefCell<Vec<WindowEvent>>> = Rc::default();
        let mut listeners = Vec::with_capacity(WINDOW_EVENTS.len());

        for (name, event) in WINDOW_EVENTS {
            let sink = Rc::clone(&queue);
            let wake_slot = Rc::clone(&self.wake);
            let listener = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
                sink.borrow_mut().push(event);
                wake(&wake_slot);
            });
            if let Err(e) = self
                .window
                .add_event_listener_with_callback(name, listener.as_ref().unchecked_ref())
            {
                for (added, l) in &listeners {
                    remove_listener(&self.window, added, l);
                }
                return Err(ObserverSetupError::new(ObserverKind::Viewport, js_reason(&e)));
            }
            listeners.push((name, listener));
        }

        let id = self.next_id();
        self.windows.insert(id, WindowSlot { queue, listeners });
        Ok(id)
    }

    fn take_mutations(&mut self, observer: ObserverId) -> Vec<MutationRecord<Element>> {
        let Some(slot) = self.mutations.get(&observer) else {
            return Vec::new();
        };
        // records the browser has not delivered yet
        for record in slot.observer.take_records().iter() {
            if let Some(r) = to_record(record.unchecked_into()) {
                slot.queue.borrow_mut().push(r);
            }
        }
        std::mem::take(&mut *slot.queue.borrow_mut())
    }

    fn take_intersections(&mut self, observer: ObserverId) -> Vec<IntersectionEntry> {
        self.intersections
            .get(&observer)
            .map(|s| std::mem::take(&mut *s.queue.borrow_mut()))
            .unwrap_or_default()
    }

    fn take_window_events(&mut self, observer: ObserverId) -> Vec<WindowEvent> {
        self.windows
            .get(&observer)
            .map(|s| std::mem::take(&mut *s.queue.borrow_mut()))
            .unwrap_or_default()
    }

    fn disconnect(&mut self, observer: ObserverId) {
        if let Some(slot) = self.mutations.remove(&observer) {
            slot.observer.disconnect();
        }
        if let Some(slot) = self.intersections.remove(&observer) {
            slot.observer.disconnect();
        }
        if let Some(slot) = self.windows.remove(&observer) {
            for (name, listener) in &slot.listeners {
                remove_listener(&self.window, name, listener);
            }
        }
    }
}

impl Drop for WebDom {
    fn drop(&mut self) {
        let ids: Vec<ObserverId> = self
            .mutations
            .keys()
            .chain(self.intersections.keys())
            .chain(self.windows.keys())
            .copied()
            .collect();
        for id in ids {
            self.disconnect(id);
        }
    }
}

// =============================================================================
// History wrappers
// =============================================================================

type StateFn = Closure<dyn FnMut(JsValue, JsValue, JsValue) -> Result<JsValue, JsValue>>;

/// Shared by every interceptor on the page; restored when the last owner leaves.
struct HistoryPatch {
    owners: u32,
    history: JsValue,
    original_push: Function,
    original_replace: Function,
    _push: StateFn,
    _replace: StateFn,
}

thread_local! {
    static HISTORY_PATCH: RefCell<Option<HistoryPatch>> = const { RefCell::new(None) };
}

/// Wrapper that calls `original` on `history`, then announces the change
fn wrap_state_fn(window: &Window, history: &JsValue, original: &Function, event_name: &'static str) -> StateFn {
    let window = window.clone();
    let history = history.clone();
    let original = original.clone();
    Closure::new(move |state: JsValue, title: JsValue, url: JsValue| {
        let result = if url.is_undefined() {
            original.call2(&history, &state, &title)?
        } else {
            original.call3(&history, &state, &title, &url)?
        };
        let event = Event::new(event_name)?;
        window.dispatch_event(&event)?;
        Ok(result)
    })
}

impl HistoryHooks for WebDom {
    fn install_history_wrappers(&mut self) -> Result<(), HistoryError> {
        let joined = HISTORY_PATCH.with(|p| match p.borrow_mut().as_mut() {
            Some(patch) => {
                patch.owners += 1;
                true
            }
            None => false,
        });
        if joined {
            return Ok(());
        }

        let history = Reflect::get(&self.window, &JsValue::from_str("history"))
            .map_err(|e| HistoryError::Unavailable(js_reason(&e)))?;
        let original = |method: &'static str| -> Result<Function, HistoryError> {
            Reflect::get(&history, &JsValue::from_str(method))
                .map_err(|e| HistoryError::WrapFailed {
                    method,
                    reason: js_reason(&e),
                })?
                .dyn_into::<Function>()
                .map_err(|_| HistoryError::WrapFailed {
                    method,
                    reason: "not a function".into(),
                })
        };
        let original_push = original("pushState")?;
        let original_replace = original("replaceState")?;

        let push = wrap_state_fn(&self.window, &history, &original_push, PUSH_STATE_EVENT);
        let replace = wrap_state_fn(&self.window, &history, &original_replace, REPLACE_STATE_EVENT);

        let install = |method: &'static str, f: &StateFn| {
            Reflect::set(&history, &JsValue::from_str(method), f.as_ref())
                .map(|_| ())
                .map_err(|e| HistoryError::WrapFailed {
                    method,
                    reason: js_reason(&e),
                })
        };
        install("pushState", &push)?;
        if let Err(e) = install("replaceState", &replace) {
            put_state_fn(&history, "pushState", &original_push);
            return Err(e);
        }

        HISTORY_PATCH.with(|p| {
            *p.borrow_mut() = Some(HistoryPatch {
                owners: 1,
                history,
                original_push,
                original_replace,
                _push: push,
                _replace: replace,
            })
        });
        Ok(())
    }

    fn restore_history(&mut self) {
        let last = HISTORY_PATCH.with(|p| {
            let mut slot = p.borrow_mut();
            match slot.as_mut() {
                Some(patch) if patch.owners > 1 => {
                    patch.owners -= 1;
                    None
                }
                _ => slot.take(),
            }
        });
        let Some(patch) = last else {
            return;
        };
        put_state_fn(&patch.history, "pushState", &patch.original_push);
        put_state_fn(&patch.history, "replaceState", &patch.original_replace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_put_state_fn_reports_refused_restore() {
        let original = Function::new_no_args("return 1");

        let writable = js_sys::Object::new();
        assert!(put_state_fn(&writable, "pushState", &original));
        let stored = Reflect::get(&writable, &JsValue::from_str("pushState")).unwrap();
        assert_eq!(stored, JsValue::from(original.clone()));

        let frozen = js_sys::Object::freeze(&js_sys::Object::new());
        assert!(!put_state_fn(&frozen, "pushState", &original));
    }

    #[wasm_bindgen_test]
    fn test_computed_styles_reads_relevant_properties() {
        let dom = WebDom::new().unwrap();
        let el = dom.document.create_element("span").unwrap();
        el.set_attribute("style", "color: rgb(255, 0, 0); cursor: pointer").unwrap();
        dom.document.body().unwrap().append_child(&el).unwrap();

        let styles = dom.computed_styles(&el);
        assert_eq!(styles.get("color").map(String::as_str), Some("rgb(255, 0, 0)"));
        assert!(!styles.contains_key("cursor"));
        el.remove();
    }
}
