//! Identity Resolver
//!
//! Re-locates the element an [`AnchorDescriptor`] was captured from, or
//! decides it is gone. Pure function of descriptor + current document.
//!
//! # Tiers (strict priority)
//! 1. Stable id: element carrying the marker attribute
//! 2. CSS selector
//! 3. XPath
//!
//! Each candidate is verified against `text_snapshot` when present. What a
//! verification failure does depends on [`VerificationPolicy`]; the default
//! fails closed on the stable-id tier and open on the selector tier.
//! Malformed locators count as "no candidate" for their tier.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::anchor::types::AnchorDescriptor;
use crate::dom::Dom;
use crate::error::LocatorError;

pub const DEFAULT_MARKER_ATTRIBUTE: &str = "data-rc-element-id";

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    StableId,
    CssSelector,
    XPath,
}

/// What happens after a located candidate fails text verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationPolicy {
    /// Stable-id mismatch ends resolution; selector mismatch tries XPath.
    #[default]
    StableIdFailsClosed,
    /// Every mismatch moves on to the next tier.
    FailOpen,
    /// Any mismatch ends resolution (legacy widget behaviour).
    FailClosed,
}

impl VerificationPolicy {
    fn stops_after_mismatch(&self, tier: Tier) -> bool {
        match self {
            VerificationPolicy::StableIdFailsClosed => tier != Tier::CssSelector,
            VerificationPolicy::FailOpen => tier == Tier::XPath,
            VerificationPolicy::FailClosed => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    /// Descriptor has no locator for this tier
    Absent,
    NoCandidate,
    Invalid(LocatorError),
    TextMismatch { found: String },
    Matched,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierAttempt {
    pub tier: Tier,
    pub outcome: TierOutcome,
}

/// Outcome of one resolution pass with a per-tier trace
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<N> {
    pub element: Option<N>,
    pub matched_tier: Option<Tier>,
    pub attempts: Vec<TierAttempt>,
}

impl<N> Resolution<N> {
    pub fn is_found(&self) -> bool {
        self.element.is_some()
    }

    pub fn into_element(self) -> Option<N> {
        self.element
    }

    /// Resolution ended on a verification failure rather than a miss
    pub fn rejected_by_text(&self) -> bool {
        self.element.is_none()
            && self
                .attempts
                .last()
                .is_some_and(|a| matches!(a.outcome, TierOutcome::TextMismatch { .. }))
    }
}

// =============================================================================
// IdentityResolver
// =============================================================================

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    marker_attribute: String,
    policy: VerificationPolicy,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_ATTRIBUTE, VerificationPolicy::default())
    }
}

enum Step<N> {
    Found(N),
    Stop,
    Next,
}

impl IdentityResolver {
    pub fn new(marker_attribute: impl Into<String>, policy: VerificationPolicy) -> Self {
        Self {
            marker_attribute: marker_attribute.into(),
            policy,
        }
    }

    pub fn marker_attribute(&self) -> &str {
        &self.marker_attribute
    }

    pub fn policy(&self) -> VerificationPolicy {
        self.policy
    }

    /// Shorthand for `resolve(..).into_element()`
    pub fn find<D: Dom + ?Sized>(&self, dom: &D, descriptor: &AnchorDescriptor) -> Option<D::Node> {
        self.resolve(dom, descriptor).into_element()
    }

    pub fn resolve<D: Dom + ?Sized>(&self, dom: &D, descriptor: &AnchorDescriptor) -> Resolution<D::Node> {
        let mut attempts = Vec::with_capacity(3);

        let tiers = [
            (Tier::StableId, descriptor.stable_id.as_deref()),
            (Tier::CssSelector, descriptor.css_selector.as_deref()),
            (Tier::XPath, descriptor.xpath.as_deref()),
        ];

        for (tier, locator) in tiers {
            let Some(locator) = locator else {
                attempts.push(TierAttempt {
                    tier,
                    outcome: TierOutcome::Absent,
                });
                continue;
            };

            let located = match tier {
                Tier::StableId => Ok(dom.find_by_attribute(&self.marker_attribute, locator)),
                Tier::CssSelector => dom.query_selector(locator),
                Tier::XPath => dom.evaluate_xpath(locator),
            };

            match self.verify(dom, tier, located, descriptor, &mut attempts) {
                Step::Found(element) => {
                    debug!(?tier, "anchor resolved");
                    return Resolution {
                        element: Some(element),
                        matched_tier: Some(tier),
                        attempts,
                    };
                }
                Step::Stop => break,
                Step::Next => {}
            }
        }

        debug!(attempts = attempts.len(), "anchor not found");
        Resolution {
            element: None,
            matched_tier: None,
            attempts,
        }
    }

    fn verify<D: Dom + ?Sized>(
        &self,
        dom: &D,
        tier: Tier,
        located: Result<Option<D::Node>, LocatorError>,
        descriptor: &AnchorDescriptor,
        attempts: &mut Vec<TierAttempt>,
    ) -> Step<D::Node> {
        let candidate = match located {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                attempts.push(TierAttempt {
                    tier,
                    outcome: TierOutcome::NoCandidate,
                });
                return Step::Next;
            }
            Err(e) => {
                warn!(?tier, error = %e, "stored locator is malformed");
                attempts.push(TierAttempt {
                    tier,
                    outcome: TierOutcome::Invalid(e),
                });
                return Step::Next;
            }
        };

        if let Some(expected) = descriptor.text_snapshot.as_deref() {
            let found = dom.text_content(&candidate).trim().to_string();
            if found != expected {
                debug!(?tier, "candidate text differs from snapshot");
                attempts.push(TierAttempt {
                    tier,
                    outcome: TierOutcome::TextMismatch { found },
                });
                return if self.policy.stops_after_mismatch(tier) {
                    Step::Stop
                } else {
                    Step::Next
                };
            }
        }

        attempts.push(TierAttempt {
            tier,
            outcome: TierOutcome::Matched,
        });
        Step::Found(candidate)
    }
}

// =============================================================================
// Tests
// =============================================================================
