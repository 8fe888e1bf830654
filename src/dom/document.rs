//! Read-only view over a live (or captured) document.
//!
//! The snapshot builder only ever talks to a document through
//! [`DocumentView`], so the traversal stays a pure function and can run
//! against a capture taken inside the page or a document described offline.

use serde::{Deserialize, Serialize};

/// Opaque handle of one node inside a [`DocumentView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Element,
    Text,
}

/// What a node's `parentNode` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParentLink {
    Element(NodeHandle),
    /// The node sits directly under the shadow root hosted by this element.
    ShadowRoot(NodeHandle),
    Document,
}

/// Which root the node belongs to, used for hit testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RootContext {
    #[default]
    Document,
    ShadowRoot,
    /// Inside an iframe document other than the top-level one.
    Subdocument,
}

/// Outcome of asking the owning root for the topmost element at a node's center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HitTest {
    Node(NodeHandle),
    #[default]
    Nothing,
    /// The hit test threw; callers treat this as "on top".
    Failed,
}

/// Content of an `<iframe>` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameContent {
    /// The frame document's `<body>`; its child nodes are the frame content.
    Loaded { body: NodeHandle },
    /// Access was refused, typically a cross-origin frame.
    Blocked { reason: String },
}

/// A `DOMRect` in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
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

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }
}

/// Window scroll offsets and inner size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// The two computed-style properties visibility depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedStyle {
    pub display_none: bool,
    pub visibility_hidden: bool,
}

pub trait DocumentView {
    /// The `<body>` of the top-level document.
    fn body(&self) -> Option<NodeHandle>;

    fn viewport(&self) -> Viewport;

    fn kind(&self, node: NodeHandle) -> NodeKind;

    /// Tag name as reported by the page (case not normalized).
    fn tag_name(&self, node: NodeHandle) -> &str;

    /// Attributes in document order.
    fn attributes(&self, node: NodeHandle) -> &[(String, String)];

    fn attribute(&self, node: NodeHandle, name: &str) -> Option<&str> {
        self.attributes(node)
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn child_nodes(&self, node: NodeHandle) -> &[NodeHandle];

    /// Children of the element's open shadow root, if it hosts one.
    fn shadow_root_children(&self, node: NodeHandle) -> Option<&[NodeHandle]>;

    /// Frame document content for `<iframe>` elements.
    fn frame_content(&self, node: NodeHandle) -> Option<&FrameContent>;

    fn parent(&self, node: NodeHandle) -> ParentLink;

    fn root_context(&self, node: NodeHandle) -> RootContext;

    /// Raw text payload of a text node.
    fn text(&self, node: NodeHandle) -> &str;

    fn bounding_rect(&self, node: NodeHandle) -> Rect;

    /// Rect of a range selecting the contents of a text node.
    fn text_rect(&self, node: NodeHandle) -> Rect;

    /// `offsetWidth` / `offsetHeight`.
    fn offset_size(&self, node: NodeHandle) -> (f64, f64);

    fn computed_style(&self, node: NodeHandle) -> ComputedStyle;

    /// `checkVisibility({ checkOpacity, checkVisibilityCSS })`.
    fn is_rendered(&self, node: NodeHandle) -> bool;

    /// Whether a click handler is bound through the `onclick` property.
    fn has_click_property(&self, node: NodeHandle) -> bool;

    /// Topmost element at the visual center of `node`, hit-tested within the
    /// node's own root (its shadow root or the top-level document).
    fn element_at_center(&self, node: NodeHandle) -> HitTest;

    fn parent_element(&self, node: NodeHandle) -> Option<NodeHandle> {
        match self.parent(node) {
            ParentLink::Element(parent) => Some(parent),
            _ => None,
        }
    }
}
