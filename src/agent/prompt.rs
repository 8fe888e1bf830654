//! Conversation turns sent to the reasoning engine.

use super::perception::PageState;
use crate::dom::InteractiveElement;
use crate::types::{ActionHistory, ActionRequest, ChatMessage};

const SYSTEM_PROMPT: &str = r##"You are a precise browser automation agent that controls a real browser through structured commands. Each turn you receive the current page state and reply with exactly ONE next action.

RESPONSE FORMAT: always reply with a single JSON object, no markdown, no prose:
{
    "current_state": {
        "page_summary": "New, task-relevant information on the current page.",
        "evaluation_previous_goal": "Success|Failed|Unknown - did the previous action achieve its goal? The page is the ground truth.",
        "memory": "What has been done so far and what remains. Count repetitions explicitly.",
        "next_goal": "What the next action is meant to achieve."
    },
    "action": {
        "type": "actionType",
        "params": {}
    }
}

AVAILABLE ACTIONS:
- navigate: {"url": "https://..."} (alias: goto)
- click: {"index": N} using an index from the element list, or {"selector": "css or xpath"}
- type: {"selector": "css or xpath", "text": "..."}
- screenshot: {"path": "optional/file.png"}
- waitForSelector: {"selector": "...", "timeout": milliseconds}
- complete: {} once the whole task is done

RULES:
1. Only interact with elements present in the current element list. Indices change between turns; always use the latest list.
2. Wait for elements that are still loading before acting on them.
3. Close cookie banners and popups that block the page.
4. If an action fails, try a different approach instead of repeating it.
5. Only use "complete" when every requirement of the task is met and visible on the page. Do not complete while something is still pending.

EXAMPLE (typing a query):
{
    "current_state": {
        "page_summary": "Search homepage with an empty search box",
        "evaluation_previous_goal": "Success - page loaded",
        "memory": "Starting search, 0/1 searches done",
        "next_goal": "Enter the query"
    },
    "action": {"type": "type", "params": {"selector": "#kw", "text": "rust async runtime"}}
}

EXAMPLE (finishing):
{
    "current_state": {
        "page_summary": "Search results for the query are listed",
        "evaluation_previous_goal": "Success - results loaded",
        "memory": "Searched, found results, 1/1 searches done",
        "next_goal": "Task complete"
    },
    "action": {"type": "complete", "params": {}}
}"##;

pub fn system_turn(suffix: Option<&str>) -> ChatMessage {
    match suffix.map(str::trim).filter(|s| !s.is_empty()) {
        Some(suffix) => ChatMessage::system(format!("{SYSTEM_PROMPT}\n\n{suffix}")),
        None => ChatMessage::system(SYSTEM_PROMPT),
    }
}

pub fn task_turn(task: &str) -> ChatMessage {
    ChatMessage::user(format!(
        "Task: {task}\n\nThe browser is on the current page. What should be the first action?"
    ))
}

/// Renders one perception cycle.
pub fn perception_turn(
    state: &PageState,
    history: &ActionHistory,
    history_lines: usize,
) -> ChatMessage {
    let mut out = String::from("Current page state:\n");
    out.push_str(&format!("- URL: {}\n", state.url));
    out.push_str(&format!("- Title: {}\n", state.title));
    out.push_str(&format!("- Interactive elements: {}\n", state.elements.len()));
    out.push_str("- Clickable elements:\n");
    if state.elements.is_empty() {
        out.push_str("  (none)\n");
    } else {
        for element in &state.elements {
            out.push_str("  ");
            out.push_str(&render_element(element));
            out.push('\n');
        }
    }
    out.push_str(&format!("- Visible text: {}...\n", state.visible_text));

    let lines = history.summary(history_lines);
    if !lines.is_empty() {
        out.push_str("- Action history:\n");
        for line in lines {
            out.push_str("  ");
            out.push_str(&line);
            out.push('\n');
        }
    }

    out.push_str(
        "\nBased on this state, analyze the situation and reply with the next action. \
         Use an index from the clickable elements list above.",
    );
    ChatMessage::user(out)
}

/// `[index]<tag attrs>text</tag>`
pub fn render_element(element: &InteractiveElement) -> String {
    let attrs: String = element
        .attributes
        .iter()
        .map(|(name, value)| format!(" {name}=\"{}\"", truncate_string(value, 60)))
        .collect();
    format!(
        "[{}]<{}{}>{}</{}>",
        element.index, element.tag_name, attrs, element.text_or_placeholder, element.tag_name
    )
}

pub fn executed_turn(action: &ActionRequest) -> ChatMessage {
    ChatMessage::user(format!(
        "Action executed: {}\nWhat should I do next?",
        action.to_json()
    ))
}

pub fn veto_turn(reason: &str) -> ChatMessage {
    ChatMessage::user(format!(
        "The task is not complete yet: {reason}\nContinue working on the task and reply with the next action."
    ))
}

/// Truncates on a char boundary, appending "..." when shortened.
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
