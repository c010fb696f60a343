//! TrackerSet: every marker on the page, keyed by comment id
//!
//! Owns the shared [`HistoryInterceptor`] so the history wrappers are
//! installed once no matter how many comments are tracked. Applies relay
//! events: created comments start tracking, updates recreate a tracker only
//! when its anchor identity changed, deletions tear trackers down.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use instant::Instant;
use tracing::{debug, warn};

use crate::anchor::types::AnchorDescriptor;
use crate::comment::{Comment, CommentEvent};
use crate::config::TrackerConfig;
use crate::dom::Platform;
use crate::error::{ConfigError, TrackerError};
use crate::tracker::core::Tracker;
use crate::tracker::state::PositionUpdate;
use crate::watcher::HistoryInterceptor;

type Listener = Box<dyn FnMut(&str, &PositionUpdate)>;

pub struct TrackerSet {
    page_url: String,
    config: TrackerConfig,
    history: HistoryInterceptor,
    trackers: BTreeMap<String, Tracker>,
    listener: Rc<RefCell<Option<Listener>>>,
}

impl TrackerSet {
    pub fn new(page_url: impl Into<String>, config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            page_url: page_url.into(),
            config,
            history: HistoryInterceptor::new(),
            trackers: BTreeMap::new(),
            listener: Rc::new(RefCell::new(None)),
        })
    }

    /// Replaces any previous listener; applies to existing trackers too.
    pub fn on_update(&mut self, listener: impl FnMut(&str, &PositionUpdate) + 'static) {
        *self.listener.borrow_mut() = Some(Box::new(listener));
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn get(&self, comment_id: &str) -> Option<&Tracker> {
        self.trackers.get(comment_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.trackers.keys().map(String::as_str)
    }

    pub fn history_holders(&self) -> u32 {
        self.history.holders()
    }

    /// Top-level comments on this page with something to anchor to
    pub fn is_trackable(&self, comment: &Comment) -> bool {
        let anchor = comment.anchor();
        comment.is_thread_root()
            && comment.url == self.page_url
            && (anchor.has_locator() || anchor.fallback_rect.is_some())
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Start tracking. A live tracker with the same identity is kept as is.
    ///
    /// A tracker whose observers could not be created is still kept, in
    /// its degraded state, and the error is returned.
    pub fn track<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        comment_id: &str,
        descriptor: AnchorDescriptor,
        now: Instant,
    ) -> Result<(), TrackerError> {
        if let Some(existing) = self.trackers.get(comment_id) {
            if existing.descriptor().same_identity(&descriptor) {
                return Ok(());
            }
            debug!(comment_id, "anchor changed, recreating tracker");
            self.untrack(platform, comment_id);
        }

        let mut tracker = Tracker::new(descriptor, self.config.clone())?;
        let listener = Rc::clone(&self.listener);
        let id = comment_id.to_string();
        tracker.subscribe(move |update| {
            if let Some(listener) = listener.borrow_mut().as_mut() {
                listener(id.as_str(), update);
            }
        });

        let activated = tracker.activate(platform, &mut self.history, now);
        self.trackers.insert(comment_id.to_string(), tracker);
        activated
    }

    pub fn untrack<P: Platform + ?Sized>(&mut self, platform: &mut P, comment_id: &str) -> bool {
        match self.trackers.remove(comment_id) {
            Some(mut tracker) => {
                tracker.teardown(platform, &mut self.history);
                true
            }
            None => false,
        }
    }

    /// Make the tracked set match `comments`: untrack what is gone or no
    /// longer trackable, track the rest. Every comment is processed; the
    /// first error is returned.
    pub fn sync<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        comments: &[Comment],
        now: Instant,
    ) -> Result<(), TrackerError> {
        let wanted: BTreeMap<&str, &Comment> = comments
            .iter()
            .filter(|c| self.is_trackable(c))
            .map(|c| (c.id.as_str(), c))
            .collect();

        let stale: Vec<String> = self
            .trackers
            .keys()
            .filter(|id| !wanted.contains_key(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            self.untrack(platform, &id);
        }

        let mut first_error = None;
        for (id, comment) in wanted {
            if let Err(e) = self.track(platform, id, comment.anchor(), now) {
                warn!(comment_id = id, error = %e, "tracking failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Apply one relay event
    pub fn apply_event<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        event: &CommentEvent,
        now: Instant,
    ) -> Result<(), TrackerError> {
        match event {
            CommentEvent::Created { comment, .. } | CommentEvent::Updated { comment, .. } => {
                if self.is_trackable(comment) {
                    self.track(platform, &comment.id, comment.anchor(), now)
                } else {
                    self.untrack(platform, &comment.id);
                    Ok(())
                }
            }
            CommentEvent::Deleted { deleted_ids, .. } => {
                for id in deleted_ids {
                    self.untrack(platform, id);
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Driving
    // =========================================================================

    pub fn pump<P: Platform + ?Sized>(&mut self, platform: &mut P, now: Instant) {
        for tracker in self.trackers.values_mut() {
            tracker.pump(platform, now);
        }
    }

    pub fn poll<P: Platform + ?Sized>(&mut self, platform: &mut P, now: Instant) {
        for tracker in self.trackers.values_mut() {
            tracker.poll(platform, now);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.trackers.values().filter_map(Tracker::next_deadline).min()
    }

    pub fn teardown_all<P: Platform + ?Sized>(&mut self, platform: &mut P) {
        for (_, mut tracker) in std::mem::take(&mut self.trackers) {
            tracker.teardown(platform, &mut self.history);
        }
    }
}
