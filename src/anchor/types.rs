//! Anchor data model
//!
//! `AnchorDescriptor` is created once at capture time and never mutated.
//! Every locator is optional; the resolver tolerates any subset.

use serde::{Deserialize, Serialize};

// =============================================================================
// Geometry
// =============================================================================

/// A point in client (viewport) or page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Axis-aligned rectangle, `x`/`y` is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Zero-area boxes (e.g. under a `display:none` ancestor) render nothing.
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left() && p.x <= self.right() && p.y >= self.top() && p.y <= self.bottom()
    }
}

/// Pointer position relative to the element's top-left corner at capture time.
///
/// On the wire this is `{x, y}`; `{dx, dy}` is accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClickOffset {
    #[serde(rename = "x", alias = "dx")]
    pub dx: f64,
    #[serde(rename = "y", alias = "dy")]
    pub dy: f64,
}

impl ClickOffset {
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }
}

// =============================================================================
// AnchorDescriptor
// =============================================================================

/// Persisted, reproducible description of where a comment is attached
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnchorDescriptor {
    /// Value of the marker attribute written onto the element by capture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_selector: Option<String>,
    /// Absolute positional path from the document root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    /// Trimmed text content at capture time; never `Some("")`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_snapshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_offset: Option<ClickOffset>,
    /// Last known bounding rect in page coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_rect: Option<Rect>,
}

impl AnchorDescriptor {
    pub fn builder() -> AnchorDescriptorBuilder {
        AnchorDescriptorBuilder::default()
    }

    /// At least one locator is needed for the descriptor to ever resolve.
    pub fn has_locator(&self) -> bool {
        self.stable_id.is_some() || self.css_selector.is_some() || self.xpath.is_some()
    }

    /// True when both descriptors would drive identical resolution and
    /// positioning. `fallback_rect` is not identity-relevant.
    pub fn same_identity(&self, other: &AnchorDescriptor) -> bool {
        self.stable_id == other.stable_id
            && self.css_selector == other.css_selector
            && self.xpath == other.xpath
            && self.text_snapshot == other.text_snapshot
            && self.click_offset == other.click_offset
    }
}

/// Fluent construction, mostly for hosts that build descriptors by hand
#[derive(Debug, Default)]
pub struct AnchorDescriptorBuilder {
    inner: AnchorDescriptor,
}

impl AnchorDescriptorBuilder {
    pub fn stable_id(mut self, id: impl Into<String>) -> Self {
        self.inner.stable_id = Some(id.into());
        self
    }

    pub fn css_selector(mut self, selector: impl Into<String>) -> Self {
        self.inner.css_selector = Some(selector.into());
        self
    }

    pub fn xpath(mut self, xpath: impl Into<String>) -> Self {
        self.inner.xpath = Some(xpath.into());
        self
    }

    /// Empty (after trimming) text is treated as absent.
    pub fn text_snapshot(mut self, text: impl AsRef<str>) -> Self {
        self.inner.text_snapshot = normalize_text(text.as_ref());
        self
    }

    pub fn click_offset(mut self, dx: f64, dy: f64) -> Self {
        self.inner.click_offset = Some(ClickOffset::new(dx, dy));
        self
    }

    pub fn fallback_rect(mut self, rect: Rect) -> Self {
        self.inner.fallback_rect = Some(rect);
        self
    }

    pub fn build(self) -> AnchorDescriptor {
        self.inner
    }
}

/// Trim text content; empty results become `None`.
pub fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_area() {
        assert!(Rect::new(0.0, 0.0, 10.0, 10.0).has_area());
        assert!(!Rect::new(5.0, 5.0, 0.0, 10.0).has_area());
        assert!(!Rect::default().has_area());
    }

    #[test]
    fn test_rect_center() {
        let r = Rect::new(200.0, 300.0, 100.0, 40.0);
        assert_eq!(r.center(), Point::new(250.0, 320.0));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Save \n"), Some("Save".to_string()));
        assert_eq!(normalize_text("   "), None);
        assert_eq!(normalize_text(""), None);
    }

    #[test]
    fn test_descriptor_serializes_camel_case_and_skips_absent() {
        let d = AnchorDescriptor::builder()
            .stable_id("abc")
            .css_selector("#save-btn")
            .click_offset(10.0, 5.0)
            .build();
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["stableId"], "abc");
        assert_eq!(json["cssSelector"], "#save-btn");
        assert_eq!(json["clickOffset"], serde_json::json!({"x": 10.0, "y": 5.0}));
        assert!(json.get("xpath").is_none());
        assert!(json.get("textSnapshot").is_none());
    }

    #[test]
    fn test_click_offset_wire_shape() {
        let offset: ClickOffset = serde_json::from_str(r#"{"x": 3, "y": 4}"#).unwrap();
        assert_eq!(offset, ClickOffset::new(3.0, 4.0));
        let offset: ClickOffset = serde_json::from_str(r#"{"dx": 3, "dy": 4}"#).unwrap();
        assert_eq!(offset, ClickOffset::new(3.0, 4.0));

        let json = serde_json::to_string(&ClickOffset::new(3.0, 4.0)).unwrap();
        assert_eq!(json, r#"{"x":3.0,"y":4.0}"#);
        assert_eq!(serde_json::from_str::<ClickOffset>(&json).unwrap(), ClickOffset::new(3.0, 4.0));
    }

    #[test]
    fn test_same_identity_ignores_fallback_rect() {
        let a = AnchorDescriptor::builder()
            .css_selector("div.a")
            .fallback_rect(Rect::new(0.0, 0.0, 1.0, 1.0))
            .build();
        let mut b = a.clone();
        b.fallback_rect = Some(Rect::new(9.0, 9.0, 9.0, 9.0));
        assert!(a.same_identity(&b));

        b.text_snapshot = Some("changed".into());
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn test_has_locator() {
        assert!(!AnchorDescriptor::default().has_locator());
        assert!(AnchorDescriptor::builder().xpath("/html/body").build().has_locator());
    }
}
