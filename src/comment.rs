//! Comment shapes exchanged with the persistence API and the relay
//!
//! Field names follow the JSON the server speaks (camelCase). The anchor
//! fields map one-to-one onto [`AnchorDescriptor`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anchor::capture::CapturedAnchor;
use crate::anchor::types::{AnchorDescriptor, ClickOffset, Rect};

/// Short description of a neighbouring element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomContext {
    pub ancestor_path: Vec<ElementInfo>,
    pub siblings: Vec<ElementInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_selector: Option<String>,
    #[serde(default, rename = "elementXPath", skip_serializing_if = "Option::is_none")]
    pub element_xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_rect: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_offset: Option<ClickOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_context: Option<DomContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_styles: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn anchor(&self) -> AnchorDescriptor {
        AnchorDescriptor {
            stable_id: self.element_id.clone(),
            css_selector: self.element_selector.clone(),
            xpath: self.element_xpath.clone(),
            text_snapshot: self.element_text.as_deref().and_then(crate::anchor::types::normalize_text),
            click_offset: self.click_offset,
            fallback_rect: self.bounding_rect,
        }
    }

    /// Replies hang off their thread root and get no marker of their own.
    pub fn is_thread_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.unwrap_or(false)
    }
}

/// Request body for creating a comment; the server assigns id and timestamps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub text: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_selector: Option<String>,
    #[serde(default, rename = "elementXPath", skip_serializing_if = "Option::is_none")]
    pub element_xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_rect: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_offset: Option<ClickOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_context: Option<DomContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_styles: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl CreateCommentRequest {
    /// Top-level comment anchored where `captured` was taken
    pub fn from_capture(text: impl Into<String>, url: impl Into<String>, captured: &CapturedAnchor) -> Self {
        let d = &captured.descriptor;
        Self {
            text: text.into(),
            url: url.into(),
            element_selector: d.css_selector.clone(),
            element_xpath: d.xpath.clone(),
            element_id: d.stable_id.clone(),
            element_text: d.text_snapshot.clone(),
            bounding_rect: d.fallback_rect,
            click_offset: d.click_offset,
            dom_context: Some(captured.context.dom_context.clone()),
            attributes: Some(captured.context.attributes.clone()),
            computed_styles: Some(captured.context.computed_styles.clone()),
            ..Self::default()
        }
    }

    pub fn reply(text: impl Into<String>, url: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
            parent_id: Some(parent_id.into()),
            ..Self::default()
        }
    }
}

// =============================================================================
// Relay events
// =============================================================================

/// Fan-out messages from the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CommentEvent {
    #[serde(rename = "comment.created")]
    Created {
        comment: Comment,
        #[serde(default)]
        url: String,
    },
    #[serde(rename = "comment.updated")]
    Updated {
        comment: Comment,
        #[serde(default)]
        url: String,
    },
    #[serde(rename = "comment.deleted", rename_all = "camelCase")]
    Deleted {
        deleted_ids: Vec<String>,
        #[serde(default)]
        url: String,
    },
}

impl CommentEvent {
    /// Parse a relay message; envelope keys other than `type`/`payload`
    /// (e.g. `timestamp`) are ignored.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn url(&self) -> &str {
        match self {
            CommentEvent::Created { url, .. }
            | CommentEvent::Updated { url, .. }
            | CommentEvent::Deleted { url, .. } => url,
        }
    }
}
