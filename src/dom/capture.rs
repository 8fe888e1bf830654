//! Serializable capture of a page's document.
//!
//! [`CAPTURE_SCRIPT`] runs inside the page and returns one JSON string
//! describing every element and text node reachable from `<body>` (open
//! shadow roots and same-origin frames included), together with the
//! geometry, style and hit-test facts the snapshot builder needs. The result
//! deserializes into [`CapturedDocument`], which implements [`DocumentView`].

use serde::{Deserialize, Serialize};

use super::document::{
    ComputedStyle, DocumentView, FrameContent, HitTest, NodeHandle, NodeKind, ParentLink, Rect,
    RootContext, Viewport,
};
use crate::error::AgentError;

/// Id of the overlay container drawn by the highlighter. Nodes carrying it
/// are never part of a snapshot.
pub const HIGHLIGHT_CONTAINER_ID: &str = "dom-pilot-highlight-container";

/// In-page script producing a [`CapturedDocument`] as a JSON string.
pub const CAPTURE_SCRIPT: &str = r#"
(() => {
  const EMPTY = { x: 0, y: 0, width: 0, height: 0 };
  const rectOf = (r) => ({ x: r.left, y: r.top, width: r.width, height: r.height });
  const nodes = [];
  const handles = new Map();
  const elements = [];

  function register(node, parent, context) {
    const handle = nodes.length;
    handles.set(node, handle);
    if (node.nodeType === Node.TEXT_NODE) {
      let textRect = EMPTY;
      try {
        const range = node.ownerDocument.createRange();
        range.selectNodeContents(node);
        textRect = rectOf(range.getBoundingClientRect());
      } catch (e) {}
      nodes.push({ kind: "text", parent, context, text: node.textContent || "", textRect });
      return handle;
    }
    const style = node.ownerDocument.defaultView.getComputedStyle(node);
    nodes.push({
      kind: "element",
      parent,
      context,
      tag: node.tagName,
      attributes: node.getAttributeNames().map((name) => [name, node.getAttribute(name) || ""]),
      children: [],
      rect: rectOf(node.getBoundingClientRect()),
      offsetWidth: node.offsetWidth || 0,
      offsetHeight: node.offsetHeight || 0,
      style: {
        displayNone: style.display === "none",
        visibilityHidden: style.visibility === "hidden",
      },
      rendered: typeof node.checkVisibility === "function"
        ? node.checkVisibility({ checkOpacity: true, checkVisibilityCSS: true })
        : true,
      clickProperty: node.onclick !== null && node.onclick !== undefined,
    });
    elements.push([node, handle]);
    return handle;
  }

  function walk(node, parent, context) {
    if (node.nodeType !== Node.ELEMENT_NODE && node.nodeType !== Node.TEXT_NODE) {
      return null;
    }
    const handle = register(node, parent, context);
    if (node.nodeType === Node.TEXT_NODE) {
      return handle;
    }
    const entry = nodes[handle];
    if (node.shadowRoot) {
      const shadowContext = context === "subdocument" ? "subdocument" : "shadowRoot";
      entry.shadowChildren = [];
      for (const child of node.shadowRoot.childNodes) {
        const h = walk(child, { shadowRoot: handle }, shadowContext);
        if (h !== null) entry.shadowChildren.push(h);
      }
    }
    if (node.tagName === "IFRAME") {
      try {
        const doc = node.contentDocument || node.contentWindow.document;
        if (doc && doc.body) {
          const html = register(doc.documentElement, "document", "subdocument");
          const body = walk(doc.body, { element: html }, "subdocument");
          nodes[html].children.push(body);
          entry.frame = { loaded: { body } };
        }
      } catch (e) {
        entry.frame = { blocked: { reason: String(e) } };
      }
      return handle;
    }
    for (const child of node.childNodes) {
      const h = walk(child, { element: handle }, context);
      if (h !== null) entry.children.push(h);
    }
    return handle;
  }

  const html = register(document.documentElement, "document", "document");
  const body = walk(document.body, { element: html }, "document");
  nodes[html].children.push(body);

  for (const [node, handle] of elements) {
    const entry = nodes[handle];
    if (entry.context === "subdocument") continue;
    const x = entry.rect.x + entry.rect.width / 2;
    const y = entry.rect.y + entry.rect.height / 2;
    const root = entry.context === "shadowRoot" ? node.getRootNode() : document;
    try {
      const hit = root.elementFromPoint(x, y);
      entry.centerHit = hit && handles.has(hit) ? { node: handles.get(hit) } : "nothing";
    } catch (e) {
      entry.centerHit = "failed";
    }
  }

  return JSON.stringify({
    viewport: {
      scrollX: window.scrollX,
      scrollY: window.scrollY,
      width: window.innerWidth,
      height: window.innerHeight,
    },
    body,
    nodes,
  });
})()
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedNode {
    pub kind: NodeKind,
    pub parent: ParentLink,
    #[serde(default)]
    pub context: RootContext,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub attributes: Vec<(String, String)>,
    #[serde(default)]
    pub children: Vec<NodeHandle>,
    #[serde(default)]
    pub shadow_children: Option<Vec<NodeHandle>>,
    #[serde(default)]
    pub frame: Option<FrameContent>,
    #[serde(default)]
    pub rect: Rect,
    #[serde(default)]
    pub offset_width: f64,
    #[serde(default)]
    pub offset_height: f64,
    #[serde(default)]
    pub style: ComputedStyle,
    #[serde(default = "default_rendered")]
    pub rendered: bool,
    #[serde(default)]
    pub click_property: bool,
    #[serde(default)]
    pub center_hit: HitTest,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub text_rect: Rect,
}

fn default_rendered() -> bool {
    true
}

impl CapturedNode {
    fn element(tag: &str, parent: ParentLink, context: RootContext, rect: Rect) -> Self {
        Self {
            kind: NodeKind::Element,
            parent,
            context,
            tag: tag.to_ascii_uppercase(),
            attributes: Vec::new(),
            children: Vec::new(),
            shadow_children: None,
            frame: None,
            rect,
            offset_width: rect.width,
            offset_height: rect.height,
            style: ComputedStyle::default(),
            rendered: true,
            click_property: false,
            center_hit: HitTest::Nothing,
            text: String::new(),
            text_rect: Rect::default(),
        }
    }

    fn text(text: &str, parent: ParentLink, context: RootContext, rect: Rect) -> Self {
        Self {
            kind: NodeKind::Text,
            tag: String::new(),
            text: text.to_string(),
            text_rect: rect,
            rect: Rect::default(),
            offset_width: 0.0,
            offset_height: 0.0,
            ..Self::element("", parent, context, Rect::default())
        }
    }
}

/// One capture of a document, addressable by [`NodeHandle`].
///
/// Besides deserializing the output of [`CAPTURE_SCRIPT`], the type can be
/// built up node by node, which is how documents are described offline.
/// Elements added that way start out visible and on top of their own center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedDocument {
    pub viewport: Viewport,
    pub body: Option<NodeHandle>,
    pub nodes: Vec<CapturedNode>,
}

impl CapturedDocument {
    /// A document holding only `<html>` and an empty `<body>` filling the viewport.
    pub fn new(viewport: Viewport) -> Self {
        let page = Rect::new(0.0, 0.0, viewport.width, viewport.height);
        let mut doc = Self {
            viewport,
            body: None,
            nodes: Vec::new(),
        };
        let html = doc.push(CapturedNode::element(
            "html",
            ParentLink::Document,
            RootContext::Document,
            page,
        ));
        let body = doc.insert_element(html, usize::MAX, "body", page);
        doc.body = Some(body);
        doc
    }

    /// Checks that every handle the capture refers to exists.
    pub fn validate(&self) -> Result<(), AgentError> {
        let len = self.nodes.len();
        let in_range = |handle: &NodeHandle| handle.0 < len;
        if let Some(body) = self.body {
            if !in_range(&body) {
                return Err(AgentError::browser(format!(
                    "capture body handle {} out of range",
                    body.0
                )));
            }
        }
        for (index, node) in self.nodes.iter().enumerate() {
            let mut referenced: Vec<NodeHandle> = node.children.clone();
            if let Some(shadow) = &node.shadow_children {
                referenced.extend(shadow.iter().copied());
            }
            match node.parent {
                ParentLink::Element(parent) | ParentLink::ShadowRoot(parent) => {
                    referenced.push(parent)
                }
                ParentLink::Document => {}
            }
            if let Some(FrameContent::Loaded { body }) = node.frame {
                referenced.push(body);
            }
            if let HitTest::Node(hit) = node.center_hit {
                referenced.push(hit);
            }
            if let Some(bad) = referenced.iter().find(|handle| !in_range(*handle)) {
                return Err(AgentError::browser(format!(
                    "capture node {index} references missing node {}",
                    bad.0
                )));
            }
        }
        Ok(())
    }

    pub fn append_element(&mut self, parent: NodeHandle, tag: &str, rect: Rect) -> NodeHandle {
        self.insert_element(parent, usize::MAX, tag, rect)
    }

    /// Inserts an element among `parent`'s children at `position` (clamped).
    pub fn insert_element(
        &mut self,
        parent: NodeHandle,
        position: usize,
        tag: &str,
        rect: Rect,
    ) -> NodeHandle {
        let context = self.node(parent).context;
        let handle = self.push(CapturedNode::element(
            tag,
            ParentLink::Element(parent),
            context,
            rect,
        ));
        self.node_mut(handle).center_hit = HitTest::Node(handle);
        let children = &mut self.node_mut(parent).children;
        let position = position.min(children.len());
        children.insert(position, handle);
        handle
    }

    pub fn append_text(&mut self, parent: NodeHandle, text: &str, rect: Rect) -> NodeHandle {
        let context = self.node(parent).context;
        let handle = self.push(CapturedNode::text(
            text,
            ParentLink::Element(parent),
            context,
            rect,
        ));
        self.node_mut(parent).children.push(handle);
        handle
    }

    /// Appends an element to the open shadow root of `host`, creating the root.
    pub fn append_shadow_element(&mut self, host: NodeHandle, tag: &str, rect: Rect) -> NodeHandle {
        let context = match self.node(host).context {
            RootContext::Subdocument => RootContext::Subdocument,
            _ => RootContext::ShadowRoot,
        };
        let handle = self.push(CapturedNode::element(
            tag,
            ParentLink::ShadowRoot(host),
            context,
            rect,
        ));
        self.node_mut(handle).center_hit = HitTest::Node(handle);
        self.node_mut(host)
            .shadow_children
            .get_or_insert_with(Vec::new)
            .push(handle);
        handle
    }

    /// Appends an `<iframe>` with a same-origin document; returns the iframe
    /// element and the frame document's `<body>`.
    pub fn append_frame(&mut self, parent: NodeHandle, rect: Rect) -> (NodeHandle, NodeHandle) {
        let frame = self.append_element(parent, "iframe", rect);
        let inner = Rect::new(0.0, 0.0, rect.width, rect.height);
        let html = self.push(CapturedNode::element(
            "html",
            ParentLink::Document,
            RootContext::Subdocument,
            inner,
        ));
        let body = self.insert_element(html, usize::MAX, "body", inner);
        self.node_mut(frame).frame = Some(FrameContent::Loaded { body });
        (frame, body)
    }

    /// Marks a frame's document as inaccessible.
    pub fn block_frame(&mut self, frame: NodeHandle, reason: &str) {
        self.node_mut(frame).frame = Some(FrameContent::Blocked {
            reason: reason.to_string(),
        });
    }

    pub fn set_attribute(&mut self, node: NodeHandle, name: &str, value: &str) {
        let attributes = &mut self.node_mut(node).attributes;
        match attributes.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => attributes.push((name.to_string(), value.to_string())),
        }
    }

    /// Applies `display: none`.
    pub fn hide(&mut self, node: NodeHandle) {
        let entry = self.node_mut(node);
        entry.style.display_none = true;
        entry.rendered = false;
        entry.offset_width = 0.0;
        entry.offset_height = 0.0;
    }

    /// Applies `visibility: hidden`, keeping the layout box.
    pub fn make_invisible(&mut self, node: NodeHandle) {
        let entry = self.node_mut(node);
        entry.style.visibility_hidden = true;
        entry.rendered = false;
    }

    /// Makes `by` the element found at `node`'s center.
    pub fn cover(&mut self, node: NodeHandle, by: NodeHandle) {
        self.node_mut(node).center_hit = HitTest::Node(by);
    }

    pub fn set_center_hit(&mut self, node: NodeHandle, hit: HitTest) {
        self.node_mut(node).center_hit = hit;
    }

    pub fn bind_click_property(&mut self, node: NodeHandle) {
        self.node_mut(node).click_property = true;
    }

    /// Removes `node` from its parent's child list. The node stays in the
    /// arena but is no longer reachable.
    pub fn detach(&mut self, node: NodeHandle) {
        match self.node(node).parent {
            ParentLink::Element(parent) => self.node_mut(parent).children.retain(|c| *c != node),
            ParentLink::ShadowRoot(host) => {
                if let Some(shadow) = self.node_mut(host).shadow_children.as_mut() {
                    shadow.retain(|c| *c != node);
                }
            }
            ParentLink::Document => {}
        }
    }

    fn push(&mut self, node: CapturedNode) -> NodeHandle {
        self.nodes.push(node);
        NodeHandle(self.nodes.len() - 1)
    }

    fn node(&self, handle: NodeHandle) -> &CapturedNode {
        &self.nodes[handle.0]
    }

    fn node_mut(&mut self, handle: NodeHandle) -> &mut CapturedNode {
        &mut self.nodes[handle.0]
    }
}

impl Default for CapturedDocument {
    fn default() -> Self {
        Self::new(Viewport::default())
    }
}

impl DocumentView for CapturedDocument {
    fn body(&self) -> Option<NodeHandle> {
        self.body
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn kind(&self, node: NodeHandle) -> NodeKind {
        self.node(node).kind
    }

    fn tag_name(&self, node: NodeHandle) -> &str {
        &self.node(node).tag
    }

    fn attributes(&self, node: NodeHandle) -> &[(String, String)] {
        &self.node(node).attributes
    }

    fn child_nodes(&self, node: NodeHandle) -> &[NodeHandle] {
        &self.node(node).children
    }

    fn shadow_root_children(&self, node: NodeHandle) -> Option<&[NodeHandle]> {
        self.node(node).shadow_children.as_deref()
    }

    fn frame_content(&self, node: NodeHandle) -> Option<&FrameContent> {
        self.node(node).frame.as_ref()
    }

    fn parent(&self, node: NodeHandle) -> ParentLink {
        self.node(node).parent
    }

    fn root_context(&self, node: NodeHandle) -> RootContext {
        self.node(node).context
    }

    fn text(&self, node: NodeHandle) -> &str {
        &self.node(node).text
    }

    fn bounding_rect(&self, node: NodeHandle) -> Rect {
        self.node(node).rect
    }

    fn text_rect(&self, node: NodeHandle) -> Rect {
        self.node(node).text_rect
    }

    fn offset_size(&self, node: NodeHandle) -> (f64, f64) {
        let entry = self.node(node);
        (entry.offset_width, entry.offset_height)
    }

    fn computed_style(&self, node: NodeHandle) -> ComputedStyle {
        self.node(node).style
    }

    fn is_rendered(&self, node: NodeHandle) -> bool {
        self.node(node).rendered
    }

    fn has_click_property(&self, node: NodeHandle) -> bool {
        self.node(node).click_property
    }

    fn element_at_center(&self, node: NodeHandle) -> HitTest {
        self.node(node).center_hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_document_has_html_and_body() {
        let doc = CapturedDocument::default();
        let body = doc.body().unwrap();
        assert_eq!(doc.tag_name(body), "BODY");
        let html = doc.parent_element(body).unwrap();
        assert_eq!(doc.tag_name(html), "HTML");
        assert_eq!(doc.parent(html), ParentLink::Document);
        assert_eq!(doc.child_nodes(html), &[body]);
    }

    #[test]
    fn deserializes_script_output() {
        let raw = json!({
            "viewport": { "scrollX": 0.0, "scrollY": 40.0, "width": 800.0, "height": 600.0 },
            "body": 1,
            "nodes": [
                { "kind": "element", "parent": "document", "context": "document", "tag": "HTML", "children": [1] },
                { "kind": "element", "parent": { "element": 0 }, "context": "document", "tag": "BODY",
                  "children": [2], "rect": { "x": 0.0, "y": -40.0, "width": 800.0, "height": 1200.0 },
                  "offsetWidth": 800.0, "offsetHeight": 1200.0, "centerHit": { "node": 1 } },
                { "kind": "text", "parent": { "element": 1 }, "context": "document", "text": "hello",
                  "textRect": { "x": 8.0, "y": 8.0, "width": 30.0, "height": 16.0 } }
            ]
        });
        let doc: CapturedDocument = serde_json::from_value(raw).unwrap();
        doc.validate().unwrap();
        assert_eq!(doc.viewport().scroll_y, 40.0);
        assert_eq!(doc.kind(NodeHandle(2)), NodeKind::Text);
        assert_eq!(doc.text(NodeHandle(2)), "hello");
        assert!(doc.is_rendered(NodeHandle(1)));
        assert_eq!(doc.element_at_center(NodeHandle(1)), HitTest::Node(NodeHandle(1)));
    }

    #[test]
    fn validate_rejects_dangling_handles() {
        let mut doc = CapturedDocument::default();
        let body = doc.body().unwrap();
        doc.nodes[body.0].children.push(NodeHandle(99));
        assert!(doc.validate().is_err());
    }

    #[test]
    fn detach_unlinks_from_parent() {
        let mut doc = CapturedDocument::default();
        let body = doc.body().unwrap();
        let button = doc.append_element(body, "button", Rect::new(0.0, 0.0, 10.0, 10.0));
        doc.detach(button);
        assert!(doc.child_nodes(body).is_empty());
    }

    #[test]
    fn frames_get_their_own_document() {
        let mut doc = CapturedDocument::default();
        let body = doc.body().unwrap();
        let (frame, inner_body) = doc.append_frame(body, Rect::new(0.0, 0.0, 300.0, 200.0));
        assert_eq!(
            doc.frame_content(frame),
            Some(&FrameContent::Loaded { body: inner_body })
        );
        assert_eq!(doc.root_context(inner_body), RootContext::Subdocument);
    }
}
