//! Tracker: keeps one comment's marker position current
//!
//! # Lifecycle
//! `Idle → Observing → TornDown`, or `Idle → Degraded → TornDown` when the
//! platform refuses an observer. Observer handles are owned by the tracker
//! and released together on teardown.
//!
//! # Driving
//! The host forwards platform activity with [`Tracker::pump`] and arms a
//! single timer for [`Tracker::next_deadline`], calling [`Tracker::poll`]
//! when it fires. Nothing here blocks or spawns.
//!
//! The tracker never caches the element. Every evaluation re-runs the
//! identity resolver against the live document.

use std::time::Duration;

use instant::Instant;
use tracing::{debug, error};

use crate::anchor::position::{compute_position, fallback_position};
use crate::anchor::resolver::{IdentityResolver, Resolution};
use crate::anchor::types::AnchorDescriptor;
use crate::config::TrackerConfig;
use crate::dom::{Dom, IntersectionEntry, MutationKind, ObserverId, Platform};
use crate::error::{ConfigError, ObserverSetupError, TrackerError};
use crate::tracker::state::{PositionUpdate, TrackedState, TrackerPhase, TrackerStats};
use crate::watcher::{
    is_relevant_mutation, Debouncer, HistoryInterceptor, LivenessDetector, Signal, SweepSchedule, Urgency,
};

pub type Subscriber = Box<dyn FnMut(&PositionUpdate)>;

#[derive(Debug, Clone, Copy)]
struct ObserverHandles {
    mutation: ObserverId,
    intersection: ObserverId,
    window: ObserverId,
}

fn millis(ms: u32) -> Duration {
    Duration::from_millis(u64::from(ms))
}

pub struct Tracker {
    descriptor: AnchorDescriptor,
    config: TrackerConfig,
    resolver: IdentityResolver,
    phase: TrackerPhase,
    handles: Option<ObserverHandles>,
    holds_history: bool,
    state: TrackedState,
    debounce: Debouncer,
    sweep: SweepSchedule,
    liveness: LivenessDetector,
    stats: TrackerStats,
    subscribers: Vec<Subscriber>,
}

impl Tracker {
    pub fn new(descriptor: AnchorDescriptor, config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            resolver: IdentityResolver::new(config.marker_attribute.clone(), config.verification),
            sweep: SweepSchedule::new(millis(config.sweep_interval_ms)),
            liveness: LivenessDetector::new(config.sweep_tracks_position),
            descriptor,
            config,
            phase: TrackerPhase::Idle,
            handles: None,
            holds_history: false,
            state: TrackedState::default(),
            debounce: Debouncer::new(),
            stats: TrackerStats::default(),
            subscribers: Vec::new(),
        })
    }

    /// Called with every update that differs from the previous one
    pub fn subscribe(&mut self, subscriber: impl FnMut(&PositionUpdate) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn descriptor(&self) -> &AnchorDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    pub fn state(&self) -> &TrackedState {
        &self.state
    }

    pub fn current(&self) -> Option<PositionUpdate> {
        self.state.update
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            sweeps: self.liveness.check_count(),
            sweep_hits: self.liveness.hit_count(),
            ..self.stats
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create observers, join history interception and publish the first
    /// position.
    ///
    /// Observer refusal is returned after one best-effort evaluation; the
    /// tracker is then `Degraded` and schedules nothing. History refusal
    /// only costs `pushState`/`replaceState` detection.
    pub fn activate<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        history: &mut HistoryInterceptor,
        now: Instant,
    ) -> Result<(), TrackerError> {
        match self.phase {
            TrackerPhase::Idle => {}
            TrackerPhase::TornDown => return Err(TrackerError::TornDown),
            TrackerPhase::Observing | TrackerPhase::Degraded => return Ok(()),
        }

        match self.open_observers(platform) {
            Ok(handles) => self.handles = Some(handles),
            Err(e) => {
                error!(error = %e, "tracking degraded to a single evaluation");
                self.phase = TrackerPhase::Degraded;
                self.evaluate(platform, now);
                return Err(e.into());
            }
        }

        self.holds_history = history.acquire(platform).is_ok();
        self.phase = TrackerPhase::Observing;
        self.sweep.start(now);
        self.evaluate(platform, now);
        Ok(())
    }

    fn open_observers<P: Platform + ?Sized>(&self, platform: &mut P) -> Result<ObserverHandles, ObserverSetupError> {
        let mutation = platform.observe_mutations(&self.config.watched_attributes)?;
        let intersection = match platform.observe_intersection(&self.config.intersection_thresholds) {
            Ok(id) => id,
            Err(e) => {
                platform.disconnect(mutation);
                return Err(e);
            }
        };
        let window = match platform.observe_window() {
            Ok(id) => id,
            Err(e) => {
                platform.disconnect(mutation);
                platform.disconnect(intersection);
                return Err(e);
            }
        };
        Ok(ObserverHandles {
            mutation,
            intersection,
            window,
        })
    }

    /// Disconnect every observer, drop pending deadlines and release
    /// history interception. Safe to call more than once.
    pub fn teardown<P: Platform + ?Sized>(&mut self, platform: &mut P, history: &mut HistoryInterceptor) {
        if self.phase == TrackerPhase::TornDown {
            return;
        }
        if let Some(h) = self.handles.take() {
            platform.disconnect(h.mutation);
            platform.disconnect(h.intersection);
            platform.disconnect(h.window);
        }
        self.debounce.cancel();
        self.sweep.cancel();
        if std::mem::take(&mut self.holds_history) {
            history.release(platform);
        }
        self.subscribers.clear();
        self.phase = TrackerPhase::TornDown;
        debug!(evaluations = self.stats.evaluations, "tracker torn down");
    }

    // =========================================================================
    // Signals
    // =========================================================================

    /// Drain queued platform notifications, schedule or run evaluations,
    /// then run anything already due.
    pub fn pump<P: Platform + ?Sized>(&mut self, platform: &mut P, now: Instant) {
        let Some(h) = self.handles else {
            return;
        };
        if self.phase != TrackerPhase::Observing {
            return;
        }

        for event in platform.take_window_events(h.window) {
            self.signal(Signal::Window(event), now);
        }

        let records = platform.take_mutations(h.mutation);
        if !records.is_empty() {
            let relevant = records.iter().any(|r| r.kind == MutationKind::ChildList) || {
                let resolved = self.resolver.find(&*platform, &self.descriptor);
                // the mutation may be what broke (or restored) resolution, in
                // which case the record no longer touches the resolved element
                resolved.is_some() != self.state.found
                    || records.iter().any(|r| {
                        is_relevant_mutation(&*platform, r, resolved.as_ref(), &self.config.watched_attributes)
                    })
            };
            if relevant {
                self.signal(Signal::Mutations, now);
            }
        }

        if let Some(entry) = platform.take_intersections(h.intersection).pop() {
            self.on_intersection(platform, entry, now);
        }

        self.poll(platform, now);
    }

    fn signal(&mut self, signal: Signal, now: Instant) {
        self.stats.signals += 1;
        let delay = match signal.urgency() {
            Urgency::Debounced => millis(self.config.debounce_ms),
            Urgency::Navigation => millis(self.config.navigation_settle_ms.max(self.config.debounce_ms)),
            Urgency::Immediate => Duration::ZERO,
        };
        if self.debounce.trigger(now, delay) {
            self.stats.coalesced += 1;
        }
    }

    fn on_intersection<P: Platform + ?Sized>(&mut self, platform: &mut P, entry: IntersectionEntry, now: Instant) {
        self.stats.signals += 1;
        let entering = entry.in_view();
        let previous = self.state.in_view.replace(entering);

        if entering {
            if previous != Some(true) {
                self.evaluate(platform, now);
            }
        } else if let Some(update) = self.state.update {
            self.publish(PositionUpdate {
                is_visible: false,
                ..update
            });
        }
    }

    /// Run whatever is due at `now`.
    pub fn poll<P: Platform + ?Sized>(&mut self, platform: &mut P, now: Instant) {
        if self.phase != TrackerPhase::Observing {
            return;
        }
        if self.debounce.take_due(now) {
            self.evaluate(platform, now);
        }
        if self.sweep.take_due(now) {
            self.run_sweep(platform, now);
        }
    }

    /// Earliest pending deadline; `None` unless observing.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.phase != TrackerPhase::Observing {
            return None;
        }
        match (self.debounce.deadline(), self.sweep.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Evaluate immediately, outside the debounce window
    pub fn refresh<P: Platform + ?Sized>(&mut self, platform: &mut P, now: Instant) {
        if self.phase == TrackerPhase::TornDown {
            return;
        }
        self.evaluate(platform, now);
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    fn evaluate<P: Platform + ?Sized>(&mut self, platform: &mut P, now: Instant) {
        let resolution = self.resolver.resolve(&*platform, &self.descriptor);
        self.commit(platform, resolution, now);
    }

    fn run_sweep<P: Platform + ?Sized>(&mut self, platform: &mut P, now: Instant) {
        let resolution = self.resolver.resolve(&*platform, &self.descriptor);
        let fresh = self.update_for(&*platform, resolution.element.as_ref());
        let verdict = self.liveness.check(resolution.is_found(), fresh.position);
        if verdict.disagrees() {
            debug!(?verdict, "sweep caught a missed change");
            self.commit(platform, resolution, now);
        }
    }

    fn commit<P: Platform + ?Sized>(&mut self, platform: &mut P, resolution: Resolution<P::Node>, now: Instant) {
        if let Some(h) = self.handles {
            if platform.retarget_intersection(h.intersection, resolution.element.as_ref()) {
                self.state.in_view = None;
            }
        }

        let update = self.update_for(&*platform, resolution.element.as_ref());
        self.stats.evaluations += 1;
        self.state.found = resolution.is_found();
        self.state.matched_tier = resolution.matched_tier;
        self.state.evaluated_at = Some(now);
        self.liveness.record(self.state.found, update.position);
        self.publish(update);
    }

    fn update_for<D: Dom + ?Sized>(&self, dom: &D, element: Option<&D::Node>) -> PositionUpdate {
        match element {
            Some(el) => {
                let pos = compute_position(dom, el, self.descriptor.click_offset);
                PositionUpdate {
                    position: Some(pos.point),
                    is_visible: pos.visible && self.state.in_view != Some(false),
                }
            }
            None => PositionUpdate {
                position: fallback_position(&self.descriptor, dom.scroll_offset()).map(|p| p.point),
                is_visible: false,
            },
        }
    }

    fn publish(&mut self, update: PositionUpdate) {
        if self.state.update == Some(update) {
            return;
        }
        self.state.update = Some(update);
        self.stats.notifications += 1;
        for subscriber in &mut self.subscribers {
            subscriber(&update);
        }
    }
}
