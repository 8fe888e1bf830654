//! Decoding reasoning-engine replies into decisions.
//!
//! Replies are free text. A clean JSON object is taken as is; otherwise the
//! text is scanned for brace-delimited fragments (at most one level of
//! nested braces each) and a state block and an action block are picked out
//! of them and merged.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::types::{ActionRequest, AgentDecision, CurrentState, file_timestamp};

static FRAGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(?:[^{}]|(?:\{[^{}]*\}))*\}").expect("fragment regex"));

/// Parses one reply into at most one decision.
pub fn parse_response(content: &str) -> Option<AgentDecision> {
    let decision = parse_strict(content).or_else(|| parse_fragments(content))?;
    Some(fill_screenshot_path(decision))
}

fn parse_strict(content: &str) -> Option<AgentDecision> {
    let cleaned = strip_fences(content);
    match serde_json::from_str::<AgentDecision>(cleaned) {
        Ok(decision) => Some(decision),
        Err(e) => {
            debug!(error = %e, "reply is not a bare decision, scanning fragments");
            None
        }
    }
}

/// Strips a surrounding markdown code fence.
fn strip_fences(content: &str) -> &str {
    content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn parse_fragments(content: &str) -> Option<AgentDecision> {
    let fragments: Vec<Value> = FRAGMENT
        .find_iter(content)
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .collect();
    if fragments.is_empty() {
        debug!("no JSON fragments in reply");
        return None;
    }

    let whole = fragments.iter().find_map(|fragment| {
        if fragment.get("current_state").is_some() && fragment.get("action").is_some() {
            serde_json::from_value::<AgentDecision>(fragment.clone()).ok()
        } else {
            None
        }
    });
    if whole.is_some() {
        return whole;
    }

    let state = fragments.iter().find_map(state_block);
    let action = fragments.iter().find_map(action_block);
    match (state, action) {
        (Some(current_state), Some(action)) => Some(AgentDecision {
            current_state,
            action,
        }),
        _ => {
            debug!(fragments = fragments.len(), "no state/action pair in reply");
            None
        }
    }
}

/// `{"page_summary": ...}` or `{"current_state": {...}}`.
fn state_block(fragment: &Value) -> Option<CurrentState> {
    let block = match fragment.get("current_state") {
        Some(inner) => inner,
        None if fragment.get("page_summary").is_some() => fragment,
        None => return None,
    };
    serde_json::from_value(block.clone()).ok()
}

/// `{"type": ..., "params": {...}}` or `{"action": {...}}`.
fn action_block(fragment: &Value) -> Option<ActionRequest> {
    let block = match fragment.get("action") {
        Some(inner) if inner.is_object() => inner,
        _ => fragment,
    };
    if !block.get("type").is_some_and(Value::is_string) {
        return None;
    }
    if block.get("params").is_none() && block.get("type") != Some(&Value::from("complete")) {
        return None;
    }
    serde_json::from_value(block.clone()).ok()
}

fn fill_screenshot_path(mut decision: AgentDecision) -> AgentDecision {
    if let ActionRequest::Screenshot { path: path @ None } = &mut decision.action {
        *path = Some(format!("screenshot-{}.png", file_timestamp()));
    }
    decision
}
