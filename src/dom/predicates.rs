//! Per-element predicates deciding which nodes get a highlight index.

use super::document::{DocumentView, HitTest, NodeHandle, NodeKind, ParentLink, RootContext};
use super::snapshot::ViewportExpansion;

/// Markup-only tags skipped together with their subtree.
pub const DENIED_TAGS: &[&str] = &["svg", "script", "style", "link", "meta"];

const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "summary", "video", "audio", "iframe", "details",
];

const INTERACTIVE_ROLES: &[&str] = &["button", "link", "searchbox", "textbox", "combobox"];

const INTERACTIVE_CLASS_HINTS: &[&str] = &["clickable", "button", "input", "select", "search"];

const CLICK_HANDLER_ATTRIBUTES: &[&str] = &["onclick", "ng-click", "@click"];

const DATA_ATTRIBUTE_HINTS: &[&str] = &["click", "action", "target", "toggle"];

pub fn is_denied(tag: &str) -> bool {
    DENIED_TAGS.contains(&tag)
}

pub fn is_interactive<D: DocumentView>(doc: &D, node: NodeHandle) -> bool {
    let tag = doc.tag_name(node).to_ascii_lowercase();
    if INTERACTIVE_TAGS.contains(&tag.as_str()) {
        return true;
    }

    if let Some(role) = doc.attribute(node, "role") {
        if INTERACTIVE_ROLES.contains(&role) {
            return true;
        }
    }

    if let Some(class) = doc.attribute(node, "class") {
        if INTERACTIVE_CLASS_HINTS.iter().any(|hint| class.contains(hint)) {
            return true;
        }
    }

    if doc.has_click_property(node)
        || CLICK_HANDLER_ATTRIBUTES
            .iter()
            .any(|name| doc.attribute(node, name).is_some())
    {
        return true;
    }

    let data_hint = doc.attributes(node).iter().any(|(name, _)| {
        name.starts_with("data-") && DATA_ATTRIBUTE_HINTS.iter().any(|hint| name.contains(hint))
    });
    if data_hint {
        return true;
    }

    if (tag == "div" || tag == "span") && inside_form(doc, node) {
        return true;
    }

    doc.attribute(node, "placeholder").is_some() || doc.attribute(node, "aria-label").is_some()
}

/// `element.closest('form')`, which stops at shadow and document roots.
fn inside_form<D: DocumentView>(doc: &D, node: NodeHandle) -> bool {
    let mut current = Some(node);
    while let Some(element) = current {
        if doc.tag_name(element).eq_ignore_ascii_case("form") {
            return true;
        }
        current = doc.parent_element(element);
    }
    false
}

pub fn is_visible<D: DocumentView>(doc: &D, node: NodeHandle) -> bool {
    let (width, height) = doc.offset_size(node);
    let style = doc.computed_style(node);
    width > 0.0 && height > 0.0 && !style.visibility_hidden && !style.display_none
}

/// A text node counts when its range has a box starting inside the vertical
/// viewport band and its parent element is rendered.
pub fn is_text_visible<D: DocumentView>(doc: &D, node: NodeHandle) -> bool {
    let rect = doc.text_rect(node);
    let viewport = doc.viewport();
    if rect.is_empty() || rect.top() < 0.0 || rect.top() > viewport.height {
        return false;
    }
    doc.parent_element(node)
        .is_some_and(|parent| doc.is_rendered(parent))
}

pub fn is_top_element<D: DocumentView>(
    doc: &D,
    node: NodeHandle,
    expansion: ViewportExpansion,
) -> bool {
    match doc.root_context(node) {
        RootContext::Subdocument => true,
        RootContext::ShadowRoot => match doc.element_at_center(node) {
            HitTest::Node(hit) => hit_within_shadow(doc, hit, node),
            HitTest::Nothing => false,
            HitTest::Failed => true,
        },
        RootContext::Document => match expansion {
            ViewportExpansion::Unbounded => true,
            ViewportExpansion::Pixels(px) => top_in_document(doc, node, px as f64),
        },
    }
}

fn top_in_document<D: DocumentView>(doc: &D, node: NodeHandle, expansion: f64) -> bool {
    let rect = doc.bounding_rect(node);
    let viewport = doc.viewport();

    let view_top = viewport.scroll_y - expansion;
    let view_left = viewport.scroll_x - expansion;
    let view_bottom = viewport.scroll_y + viewport.height + expansion;
    let view_right = viewport.scroll_x + viewport.width + expansion;

    let abs_top = rect.top() + viewport.scroll_y;
    let abs_left = rect.left() + viewport.scroll_x;
    let abs_bottom = rect.bottom() + viewport.scroll_y;
    let abs_right = rect.right() + viewport.scroll_x;

    if abs_bottom < view_top
        || abs_top > view_bottom
        || abs_right < view_left
        || abs_left > view_right
    {
        return false;
    }

    let (x, y) = rect.center();
    if x < 0.0 || x >= viewport.width || y < 0.0 || y >= viewport.height {
        return true;
    }

    match doc.element_at_center(node) {
        HitTest::Node(hit) => hit_within_document(doc, hit, node),
        HitTest::Nothing => false,
        HitTest::Failed => true,
    }
}

/// Walks up from the hit element looking for `target`, stopping at the
/// document element.
fn hit_within_document<D: DocumentView>(doc: &D, hit: NodeHandle, target: NodeHandle) -> bool {
    let mut current = Some(hit);
    while let Some(element) = current {
        if doc.parent(element) == ParentLink::Document {
            return false;
        }
        if element == target {
            return true;
        }
        current = doc.parent_element(element);
    }
    false
}

fn hit_within_shadow<D: DocumentView>(doc: &D, hit: NodeHandle, target: NodeHandle) -> bool {
    let mut current = Some(hit);
    while let Some(element) = current {
        if element == target {
            return true;
        }
        current = doc.parent_element(element);
    }
    false
}

/// Slash-separated tag path from the nearest document, shadow root or frame
/// boundary down to `node`; repeated sibling tags get a 1-based `[n]`.
pub fn xpath<D: DocumentView>(doc: &D, node: NodeHandle) -> String {
    let mut segments = Vec::new();
    let mut current = Some(node);

    while let Some(element) = current {
        if doc.kind(element) != NodeKind::Element {
            break;
        }
        let parent = doc.parent(element);
        if matches!(parent, ParentLink::ShadowRoot(_)) {
            break;
        }

        let tag = doc.tag_name(element);
        let siblings: &[NodeHandle] = match parent {
            ParentLink::Element(parent) => doc.child_nodes(parent),
            _ => &[],
        };
        let position = siblings
            .iter()
            .take_while(|sibling| **sibling != element)
            .filter(|sibling| {
                doc.kind(**sibling) == NodeKind::Element
                    && doc.tag_name(**sibling).eq_ignore_ascii_case(tag)
            })
            .count();

        let tag = tag.to_ascii_lowercase();
        segments.push(if position > 0 {
            format!("{tag}[{}]", position + 1)
        } else {
            tag
        });

        current = match parent {
            ParentLink::Element(parent) => Some(parent),
            _ => None,
        };
    }

    segments.reverse();
    segments.join("/")
}
