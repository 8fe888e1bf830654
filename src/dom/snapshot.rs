use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::document::{Rect, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomNodeKind {
    Element,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

/// Corner, center and size record of one box, in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
    pub center: Point,
    pub width: i64,
    pub height: i64,
}

impl Coordinates {
    /// Rounds `rect` shifted by `(dx, dy)`.
    pub fn from_rect(rect: Rect, dx: f64, dy: f64) -> Self {
        let (cx, cy) = rect.center();
        Self {
            top_left: point(rect.left() + dx, rect.top() + dy),
            top_right: point(rect.right() + dx, rect.top() + dy),
            bottom_left: point(rect.left() + dx, rect.bottom() + dy),
            bottom_right: point(rect.right() + dx, rect.bottom() + dy),
            center: point(cx + dx, cy + dy),
            width: js_round(rect.width),
            height: js_round(rect.height),
        }
    }
}

/// `Math.round`: halves round toward positive infinity.
pub(crate) fn js_round(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

fn point(x: f64, y: f64) -> Point {
    Point {
        x: js_round(x),
        y: js_round(y),
    }
}

/// Scroll offsets and viewport size at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportInfo {
    pub scroll_x: i64,
    pub scroll_y: i64,
    pub width: i64,
    pub height: i64,
}

impl From<Viewport> for ViewportInfo {
    fn from(viewport: Viewport) -> Self {
        Self {
            scroll_x: js_round(viewport.scroll_x),
            scroll_y: js_round(viewport.scroll_y),
            width: js_round(viewport.width),
            height: js_round(viewport.height),
        }
    }
}

/// One node of a [`DomSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
    pub id: String,
    pub kind: DomNodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    /// Relative to the viewport; negative once the page is scrolled past it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport_coordinates: Option<Coordinates>,
    /// Relative to the page origin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_coordinates: Option<Coordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<ViewportInfo>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub is_interactive: bool,
    #[serde(default)]
    pub is_visible: bool,
    #[serde(default)]
    pub is_top_element: bool,
    /// Present only when the node is interactive, visible and topmost.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_index: Option<usize>,
    #[serde(default)]
    pub shadow_root: bool,
    /// Inside an iframe document; `xpath` is relative to that document.
    #[serde(default)]
    pub in_frame: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl DomNode {
    pub fn text_node(text: &str) -> Self {
        Self {
            id: String::new(),
            kind: DomNodeKind::Text,
            tag_name: None,
            attributes: BTreeMap::new(),
            xpath: None,
            viewport_coordinates: None,
            page_coordinates: None,
            viewport: None,
            children: Vec::new(),
            is_interactive: false,
            is_visible: true,
            is_top_element: false,
            highlight_index: None,
            shadow_root: false,
            in_frame: false,
            text: Some(text.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        self.tag_name.as_deref().unwrap_or("")
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// One immutable capture of document structure, keyed by node id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshot {
    pub root_id: Option<String>,
    pub map: BTreeMap<String, DomNode>,
}

impl DomSnapshot {
    pub fn get(&self, id: &str) -> Option<&DomNode> {
        self.map.get(id)
    }

    pub fn root(&self) -> Option<&DomNode> {
        self.root_id.as_deref().and_then(|id| self.map.get(id))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Nodes carrying a highlight index, ordered by it.
    pub fn highlighted(&self) -> Vec<&DomNode> {
        let mut nodes: Vec<&DomNode> = self
            .map
            .values()
            .filter(|node| node.highlight_index.is_some())
            .collect();
        nodes.sort_by_key(|node| node.highlight_index);
        nodes
    }

    /// Trimmed text of all text nodes below `id`, in document order.
    pub fn descendant_text(&self, id: &str) -> String {
        let mut parts = Vec::new();
        self.collect_text(id, &mut parts);
        parts.join(" ")
    }

    fn collect_text<'a>(&'a self, id: &str, parts: &mut Vec<&'a str>) {
        let Some(node) = self.map.get(id) else {
            return;
        };
        if let Some(text) = node.text.as_deref() {
            parts.push(text);
        }
        for child in &node.children {
            self.collect_text(child, parts);
        }
    }
}

/// How far beyond the viewport elements still count as on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ViewportExpansion {
    /// Every element is treated as topmost; no hit testing.
    Unbounded,
    Pixels(u32),
}

impl Default for ViewportExpansion {
    fn default() -> Self {
        ViewportExpansion::Pixels(0)
    }
}

impl From<i64> for ViewportExpansion {
    /// `-1` (or any negative value) is the unbounded sentinel.
    fn from(value: i64) -> Self {
        if value < 0 {
            ViewportExpansion::Unbounded
        } else {
            ViewportExpansion::Pixels(value.min(u32::MAX as i64) as u32)
        }
    }
}

impl From<ViewportExpansion> for i64 {
    fn from(value: ViewportExpansion) -> Self {
        match value {
            ViewportExpansion::Unbounded => -1,
            ViewportExpansion::Pixels(px) => px as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotOptions {
    /// Draw labeled overlays over highlighted elements.
    pub highlight: bool,
    /// Restrict overlays to this highlight index.
    pub focus_index: Option<usize>,
    pub viewport_expansion: ViewportExpansion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_matches_page_rounding() {
        assert_eq!(js_round(2.5), 3);
        assert_eq!(js_round(-2.5), -2);
        assert_eq!(js_round(-2.6), -3);
    }

    #[test]
    fn coordinates_from_rect() {
        let coords = Coordinates::from_rect(Rect::new(10.0, -20.0, 100.0, 40.0), 0.0, 50.0);
        assert_eq!(coords.top_left, Point { x: 10, y: 30 });
        assert_eq!(coords.bottom_right, Point { x: 110, y: 70 });
        assert_eq!(coords.center, Point { x: 60, y: 50 });
        assert_eq!((coords.width, coords.height), (100, 40));
    }

    #[test]
    fn expansion_sentinel() {
        assert_eq!(ViewportExpansion::from(-1), ViewportExpansion::Unbounded);
        assert_eq!(ViewportExpansion::from(250), ViewportExpansion::Pixels(250));
        let options: SnapshotOptions =
            serde_json::from_str(r#"{"viewportExpansion": -1}"#).unwrap();
        assert_eq!(options.viewport_expansion, ViewportExpansion::Unbounded);
        assert!(!options.highlight);
    }
}
