use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A single action the reasoning engine asks the agent to perform.
///
/// On the wire this is `{"type": ..., "params": {...}}`. Types that are not
/// recognized decode into [`ActionRequest::Unknown`] so the dispatcher can
/// reject them explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub enum ActionRequest {
    Navigate {
        url: String,
    },
    Click {
        target: ClickTarget,
    },
    Type {
        selector: String,
        text: String,
    },
    Screenshot {
        path: Option<String>,
    },
    WaitForSelector {
        selector: String,
        timeout_ms: Option<u64>,
    },
    Complete,
    Unknown {
        kind: String,
        params: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClickTarget {
    Index(usize),
    Selector(String),
}

impl fmt::Display for ClickTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClickTarget::Index(index) => write!(f, "[{index}]"),
            ClickTarget::Selector(selector) => f.write_str(selector),
        }
    }
}

impl ActionRequest {
    /// Wire name of the action type.
    pub fn kind(&self) -> &str {
        match self {
            ActionRequest::Navigate { .. } => "navigate",
            ActionRequest::Click { .. } => "click",
            ActionRequest::Type { .. } => "type",
            ActionRequest::Screenshot { .. } => "screenshot",
            ActionRequest::WaitForSelector { .. } => "waitForSelector",
            ActionRequest::Complete => "complete",
            ActionRequest::Unknown { kind, .. } => kind,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ActionRequest::Complete)
    }

    pub fn to_json(&self) -> Value {
        let raw = RawAction::from(self.clone());
        json!({ "type": raw.kind, "params": raw.params })
    }
}

/// Wire form of an [`ActionRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Value,
}

impl TryFrom<RawAction> for ActionRequest {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let params = &raw.params;
        let action = match raw.kind.as_str() {
            "navigate" | "goto" => ActionRequest::Navigate {
                url: required_str(params, "url", &raw.kind)?,
            },
            "click" => ActionRequest::Click {
                target: click_target(params)?,
            },
            "type" => ActionRequest::Type {
                selector: required_str(params, "selector", &raw.kind)?,
                text: required_str(params, "text", &raw.kind)?,
            },
            "screenshot" => ActionRequest::Screenshot {
                path: optional_str(params, "path"),
            },
            "waitForSelector" => ActionRequest::WaitForSelector {
                selector: required_str(params, "selector", &raw.kind)?,
                timeout_ms: params.get("timeout").and_then(Value::as_u64),
            },
            "complete" => ActionRequest::Complete,
            _ => ActionRequest::Unknown {
                kind: raw.kind,
                params: raw.params,
            },
        };
        Ok(action)
    }
}

impl From<ActionRequest> for RawAction {
    fn from(action: ActionRequest) -> Self {
        let (kind, params) = match action {
            ActionRequest::Navigate { url } => ("navigate".to_string(), json!({ "url": url })),
            ActionRequest::Click { target } => {
                let params = match target {
                    ClickTarget::Index(index) => json!({ "index": index }),
                    ClickTarget::Selector(selector) => json!({ "selector": selector }),
                };
                ("click".to_string(), params)
            }
            ActionRequest::Type { selector, text } => (
                "type".to_string(),
                json!({ "selector": selector, "text": text }),
            ),
            ActionRequest::Screenshot { path } => {
                let mut params = Map::new();
                if let Some(path) = path {
                    params.insert("path".into(), Value::String(path));
                }
                ("screenshot".to_string(), Value::Object(params))
            }
            ActionRequest::WaitForSelector {
                selector,
                timeout_ms,
            } => {
                let mut params = Map::new();
                params.insert("selector".into(), Value::String(selector));
                if let Some(timeout) = timeout_ms {
                    params.insert("timeout".into(), json!(timeout));
                }
                ("waitForSelector".to_string(), Value::Object(params))
            }
            ActionRequest::Complete => ("complete".to_string(), json!({})),
            ActionRequest::Unknown { kind, params } => (kind, params),
        };
        RawAction { kind, params }
    }
}

fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}

fn required_str(params: &Value, key: &str, kind: &str) -> Result<String, String> {
    optional_str(params, key).ok_or_else(|| format!("'{kind}' action requires params.{key}"))
}

/// Index wins over selector when both are present. Numeric strings count as
/// indices.
fn click_target(params: &Value) -> Result<ClickTarget, String> {
    match params.get("index") {
        Some(Value::Number(n)) => {
            if let Some(index) = n.as_u64() {
                return Ok(ClickTarget::Index(index as usize));
            }
        }
        Some(Value::String(s)) => {
            if let Ok(index) = s.trim().parse::<usize>() {
                return Ok(ClickTarget::Index(index));
            }
        }
        _ => {}
    }
    optional_str(params, "selector")
        .map(ClickTarget::Selector)
        .ok_or_else(|| "'click' action requires params.index or params.selector".to_string())
}

/// Result of dispatching one action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn ok_with(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: ActionRequest,
    pub outcome: ActionOutcome,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn describe(&self) -> String {
        let target = match &self.action {
            ActionRequest::Navigate { url } => format!(" {url}"),
            ActionRequest::Click { target } => format!(" {target}"),
            ActionRequest::Type { selector, text } => format!(" {selector} <- \"{text}\""),
            ActionRequest::Screenshot { path } => {
                path.as_deref().map(|p| format!(" {p}")).unwrap_or_default()
            }
            ActionRequest::WaitForSelector { selector, .. } => format!(" {selector}"),
            ActionRequest::Complete | ActionRequest::Unknown { .. } => String::new(),
        };
        let result = match (self.outcome.success, self.outcome.error.as_deref()) {
            (true, _) => "ok".to_string(),
            (false, Some(error)) => format!("failed: {error}"),
            (false, None) => "failed".to_string(),
        };
        format!("{}{} -> {}", self.action.kind(), target, result)
    }
}

/// Append-only log of dispatched actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionHistory {
    entries: Vec<HistoryEntry>,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action: ActionRequest, outcome: ActionOutcome) {
        self.record_at(action, outcome, Utc::now());
    }

    /// Records an entry stamped with the time the action started.
    pub fn record_at(
        &mut self,
        action: ActionRequest,
        outcome: ActionOutcome,
        timestamp: DateTime<Utc>,
    ) {
        self.entries.push(HistoryEntry {
            action,
            outcome,
            timestamp,
        });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Numbered one-line descriptions of the most recent `limit` entries.
    pub fn summary(&self, limit: usize) -> Vec<String> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, entry)| format!("{}. {}", i + 1, entry.describe()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation history sent to the reasoning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered turns of one run. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// The engine's own account of where the task stands.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentState {
    pub page_summary: String,
    pub evaluation_previous_goal: String,
    pub memory: String,
    pub next_goal: String,
}

/// One parsed reply: state plus exactly one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDecision {
    #[serde(default)]
    pub current_state: CurrentState,
    pub action: ActionRequest,
}

/// UTC timestamp usable in file names, e.g. `2026-10-16T09-30-12-045Z`.
pub fn file_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}
