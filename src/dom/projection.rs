//! Actionable view of a snapshot.
//!
//! Indices are only meaningful against the snapshot they were projected
//! from. Anything acting on an index must project a fresh snapshot first.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::snapshot::{DomNode, DomSnapshot};
use crate::browser::Locator;
use crate::error::AgentError;

/// Attributes carried into the perception listing.
pub const LISTED_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "type",
    "role",
    "placeholder",
    "aria-label",
    "href",
    "value",
];

const MAX_TEXT_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveElement {
    pub index: usize,
    pub locator: Locator,
    pub tag_name: String,
    pub is_visible: bool,
    pub is_interactive: bool,
    pub text_or_placeholder: String,
    pub attributes: BTreeMap<String, String>,
    /// `locator` only holds inside the element's own frame document.
    #[serde(default)]
    pub in_frame: bool,
}

/// Highlighted nodes of `snapshot`, ordered by highlight index.
pub fn project(snapshot: &DomSnapshot) -> Vec<InteractiveElement> {
    snapshot
        .highlighted()
        .into_iter()
        .filter(|node| node.is_interactive && node.is_visible)
        .filter_map(|node| {
            let index = node.highlight_index?;
            Some(InteractiveElement {
                index,
                locator: locator_for(node),
                tag_name: node.tag().to_string(),
                is_visible: node.is_visible,
                is_interactive: node.is_interactive,
                text_or_placeholder: text_for(snapshot, node),
                attributes: node
                    .attributes
                    .iter()
                    .filter(|(name, _)| LISTED_ATTRIBUTES.contains(&name.as_str()))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
                in_frame: node.in_frame,
            })
        })
        .collect()
}

/// Looks `index` up in a projection. Frame elements are refused, their
/// locator would match against the top-level document instead.
pub fn resolve(
    elements: &[InteractiveElement],
    index: usize,
) -> Result<&InteractiveElement, AgentError> {
    let element = elements
        .iter()
        .find(|element| element.index == index)
        .ok_or_else(|| AgentError::element_not_found(format!("index {index}")))?;
    if element.in_frame {
        return Err(AgentError::element_not_found(format!(
            "index {index} is inside an iframe and cannot be targeted"
        )));
    }
    Ok(element)
}

fn locator_for(node: &DomNode) -> Locator {
    let xpath = node.xpath.as_deref().unwrap_or("");
    if xpath.starts_with("html") {
        return Locator::XPath(format!("/{xpath}"));
    }
    if let Some(id) = node.attribute("id").filter(|id| !id.is_empty()) {
        return Locator::Css(format!("#{id}"));
    }
    if !xpath.is_empty() {
        return Locator::XPath(format!("//{xpath}"));
    }
    Locator::Css(node.tag().to_string())
}

fn text_for(snapshot: &DomSnapshot, node: &DomNode) -> String {
    let text = snapshot.descendant_text(&node.id);
    let text = text.trim();
    if !text.is_empty() {
        return text.chars().take(MAX_TEXT_CHARS).collect();
    }
    node.attribute("placeholder")
        .or_else(|| node.attribute("aria-label"))
        .unwrap_or("")
        .to_string()
}
