//! AnchorCore: element re-identification and live position tracking
//!
//! A Rust/WASM implementation of the ReviewCycle comment anchoring pipeline.
//! A comment is pinned to the element the reviewer clicked; AnchorCore finds
//! that element again on later page loads and keeps the comment marker on it
//! while the page scrolls, resizes, re-renders and navigates.
//!
//! # Architecture
//!
//! ## Anchor Components
//! - `capture.rs` - Capture: descriptor + context from a clicked element
//! - `resolver.rs` - IdentityResolver: marker -> CSS -> XPath, each verified
//! - `position.rs` - Marker point from a rect and the click offset
//! - `types.rs` - AnchorDescriptor, Rect, Point, ClickOffset
//!
//! ## Watcher Components
//! - `signal.rs` - Signal classification and mutation relevance
//! - `debounce.rs` - Trailing debounce with coalescing stats
//! - `sweep.rs` - Periodic liveness check (only commits on disagreement)
//! - `history.rs` - Shared pushState/replaceState interception
//!
//! ## Tracker Components
//! - `core.rs` - Tracker: one comment, re-resolved on every evaluation
//! - `set.rs` - TrackerSet: every top-level comment on the page
//!
//! ## Platform
//! - `dom::Dom` / `Observers` / `HistoryHooks` - what a tracker needs from its host
//! - `dom::MemoryDom` - in-memory document for native tests
//! - `dom::web::WebDom` - the live browser document (wasm32 only)
//!
//! The core never reads a clock or arms a timer. Hosts call `pump` when an
//! observer fires, `poll` when the timer for `next_deadline` expires.
//!
//! # Usage (native)
//! ```
//! use anchorcore::{Capture, HistoryInterceptor, MemoryDom, Point, Rect, Tracker, TrackerConfig};
//! use instant::Instant;
//!
//! let mut dom = MemoryDom::new();
//! let body = dom.body_id();
//! let price = dom.element(body, "span", &[("class", "price")], "$10");
//! dom.set_rect(price, Rect::new(200.0, 300.0, 100.0, 40.0));
//!
//! let captured = Capture::default().capture(&mut dom, &price, Point::new(210.0, 305.0)).unwrap();
//! let mut tracker = Tracker::new(captured.descriptor, TrackerConfig::default()).unwrap();
//! let mut history = HistoryInterceptor::new();
//! tracker.activate(&mut dom, &mut history, Instant::now()).unwrap();
//!
//! assert_eq!(tracker.current().unwrap().position, Some(Point::new(210.0, 305.0)));
//! ```
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { captureElement, AnchorTrackerSet } from 'anchorcore';
//!
//! await init();
//! const set = new AnchorTrackerSet(location.href, {}, (commentId, update) => {
//!   render(commentId, update.position, update.isVisible);
//! });
//! set.sync(await api.listComments(location.href));
//! relay.onmessage = (msg) => set.applyEvent(msg.data);
//! ```

pub mod anchor;
pub mod comment;
pub mod config;
pub mod dom;
pub mod error;
pub mod tracker;
pub mod watcher;

#[cfg(target_arch = "wasm32")]
mod wasm;

// Public exports - Anchor
pub use anchor::{
    AnchorDescriptor, AnchorPosition, Capture, CapturedAnchor, ClickOffset, IdentityResolver, Point, Rect, Tier,
    VerificationPolicy,
};

// Public exports - Tracking
pub use comment::{Comment, CommentEvent, CreateCommentRequest};
pub use config::{CaptureConfig, TrackerConfig};
pub use dom::{Dom, MemoryDom, Platform};
pub use error::{CaptureError, ConfigError, TrackerError};
pub use tracker::{PositionUpdate, Tracker, TrackerPhase, TrackerSet, TrackerStats};
pub use watcher::HistoryInterceptor;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Panic hook and `tracing` output to the browser console
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(target_arch = "wasm32")]
    tracing_wasm::set_as_global_default();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("anchorcore v{}", env!("CARGO_PKG_VERSION"))
}
