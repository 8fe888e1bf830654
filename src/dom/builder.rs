//! Depth-first traversal turning a [`DocumentView`] into a [`DomSnapshot`].
//!
//! Two counters run through the walk. Highlight indices are handed out when
//! an element is first visited, before its children, while node ids are only
//! taken when a node is registered, after its children. Ids therefore follow
//! post-order and highlight indices follow visitation order.
//!
//! An anchor whose filtered child list comes back empty is dropped after its
//! children were walked. It may already have taken a highlight index, so the
//! indices of surviving nodes are compacted at the end to keep them dense.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use super::capture::HIGHLIGHT_CONTAINER_ID;
use super::document::{DocumentView, FrameContent, NodeHandle, NodeKind};
use super::highlight::{HighlightOverlay, palette_color};
use super::predicates::{
    is_denied, is_interactive, is_text_visible, is_top_element, is_visible, xpath,
};
use super::snapshot::{
    Coordinates, DomNode, DomNodeKind, DomSnapshot, SnapshotOptions, ViewportInfo,
};

/// Snapshot plus the overlays to draw when highlighting is enabled.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuild {
    pub snapshot: DomSnapshot,
    pub overlays: Vec<HighlightOverlay>,
}

/// Builds a snapshot of the subtree under `root` (the document body when `None`).
pub fn build_snapshot<D: DocumentView>(
    doc: &D,
    root: Option<NodeHandle>,
    options: &SnapshotOptions,
) -> SnapshotBuild {
    let Some(root) = root.or_else(|| doc.body()) else {
        return SnapshotBuild::default();
    };

    let mut traversal = Traversal {
        doc,
        options,
        next_id: 0,
        next_highlight: 0,
        map: BTreeMap::new(),
        candidates: Vec::new(),
    };
    let root_id = traversal.visit(root, None);
    traversal.finish(root_id)
}

/// Overlay geometry recorded at visitation time, before compaction.
struct Candidate {
    provisional: usize,
    top: f64,
    left: f64,
    width: f64,
    height: f64,
}

struct Traversal<'a, D> {
    doc: &'a D,
    options: &'a SnapshotOptions,
    next_id: usize,
    next_highlight: usize,
    map: BTreeMap<String, DomNode>,
    candidates: Vec<Candidate>,
}

impl<D: DocumentView> Traversal<'_, D> {
    fn visit(&mut self, node: NodeHandle, parent_frame: Option<NodeHandle>) -> Option<String> {
        let doc = self.doc;
        match doc.kind(node) {
            NodeKind::Text => {
                let text = doc.text(node).trim();
                if text.is_empty() || !is_text_visible(doc, node) {
                    return None;
                }
                Some(self.register(DomNode::text_node(text)))
            }
            NodeKind::Element => self.visit_element(node, parent_frame),
        }
    }

    fn visit_element(
        &mut self,
        node: NodeHandle,
        parent_frame: Option<NodeHandle>,
    ) -> Option<String> {
        let doc = self.doc;
        if doc.attribute(node, "id") == Some(HIGHLIGHT_CONTAINER_ID) {
            return None;
        }
        let tag = doc.tag_name(node).to_ascii_lowercase();
        if is_denied(&tag) {
            return None;
        }

        let rect = doc.bounding_rect(node);
        let viewport = doc.viewport();
        let interactive = is_interactive(doc, node);
        let visible = is_visible(doc, node);
        let top = is_top_element(doc, node, self.options.viewport_expansion);

        let mut data = DomNode {
            id: String::new(),
            kind: DomNodeKind::Element,
            tag_name: Some(tag.clone()),
            attributes: doc.attributes(node).iter().cloned().collect(),
            xpath: Some(xpath(doc, node)),
            viewport_coordinates: Some(Coordinates::from_rect(rect, 0.0, 0.0)),
            page_coordinates: Some(Coordinates::from_rect(
                rect,
                viewport.scroll_x,
                viewport.scroll_y,
            )),
            viewport: Some(ViewportInfo::from(viewport)),
            children: Vec::new(),
            is_interactive: interactive,
            is_visible: visible,
            is_top_element: top,
            highlight_index: None,
            shadow_root: false,
            in_frame: parent_frame.is_some(),
            text: None,
        };

        if interactive && visible && top {
            let provisional = self.next_highlight;
            self.next_highlight += 1;
            data.highlight_index = Some(provisional);

            let mut top = rect.top() + viewport.scroll_y;
            let mut left = rect.left() + viewport.scroll_x;
            if let Some(frame) = parent_frame {
                let frame_rect = doc.bounding_rect(frame);
                top += frame_rect.top();
                left += frame_rect.left();
            }
            self.candidates.push(Candidate {
                provisional,
                top,
                left,
                width: rect.width,
                height: rect.height,
            });
        }

        if let Some(shadow_children) = doc.shadow_root_children(node) {
            data.shadow_root = true;
            for child in shadow_children {
                if let Some(id) = self.visit(*child, parent_frame) {
                    data.children.push(id);
                }
            }
        }

        if tag == "iframe" {
            match doc.frame_content(node) {
                Some(FrameContent::Loaded { body }) => {
                    for child in doc.child_nodes(*body) {
                        if let Some(id) = self.visit(*child, Some(node)) {
                            data.children.push(id);
                        }
                    }
                }
                Some(FrameContent::Blocked { reason }) => {
                    warn!(
                        xpath = data.xpath.as_deref().unwrap_or(""),
                        %reason,
                        "unable to access iframe"
                    );
                }
                None => {}
            }
        } else {
            for child in doc.child_nodes(node) {
                if let Some(id) = self.visit(*child, parent_frame) {
                    data.children.push(id);
                }
            }
            if tag == "a" && data.children.is_empty() {
                return None;
            }
        }

        Some(self.register(data))
    }

    fn register(&mut self, mut node: DomNode) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        node.id = id.clone();
        self.map.insert(id.clone(), node);
        id
    }

    fn finish(mut self, root_id: Option<String>) -> SnapshotBuild {
        let mut surviving: Vec<(usize, String)> = self
            .map
            .values()
            .filter_map(|node| node.highlight_index.map(|index| (index, node.id.clone())))
            .collect();
        surviving.sort();

        let mut dense = HashMap::with_capacity(surviving.len());
        for (index, (provisional, id)) in surviving.into_iter().enumerate() {
            dense.insert(provisional, index);
            if let Some(node) = self.map.get_mut(&id) {
                node.highlight_index = Some(index);
            }
        }

        let overlays = if self.options.highlight {
            self.candidates
                .iter()
                .filter_map(|candidate| {
                    let index = *dense.get(&candidate.provisional)?;
                    if self.options.focus_index.is_some_and(|focus| focus != index) {
                        return None;
                    }
                    Some(HighlightOverlay {
                        index,
                        color: palette_color(index).to_string(),
                        top: candidate.top,
                        left: candidate.left,
                        width: candidate.width,
                        height: candidate.height,
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        SnapshotBuild {
            snapshot: DomSnapshot {
                root_id,
                map: self.map,
            },
            overlays,
        }
    }
}
