#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dom_pilot::brain::fallback_reply;
use dom_pilot::dom::{CAPTURE_SCRIPT, CapturedDocument, DocumentView, Rect};
use dom_pilot::{AgentError, BrowserPage, ChatMessage, Locator, ReasoningEngine};
use serde_json::{Value, json};

pub fn line(y: f64) -> Rect {
    Rect::new(10.0, y, 200.0, 24.0)
}

/// A search form: `[0]` the query input, `[1]` the submit button.
pub fn search_form() -> CapturedDocument {
    let mut doc = CapturedDocument::default();
    let body = doc.body().unwrap();
    let input = doc.append_element(body, "input", line(10.0));
    doc.set_attribute(input, "id", "kw");
    doc.set_attribute(input, "placeholder", "Search");
    let button = doc.append_element(body, "button", line(40.0));
    doc.set_attribute(button, "id", "su");
    doc.append_text(button, "百度一下", line(40.0));
    doc
}

/// In-memory page backed by a [`CapturedDocument`].
pub struct FakePage {
    document: Mutex<CapturedDocument>,
    url: Mutex<String>,
    calls: Mutex<Vec<String>>,
    missing: HashSet<String>,
    flaky: Mutex<HashMap<String, u32>>,
}

impl FakePage {
    pub fn new(document: CapturedDocument) -> Self {
        Self {
            document: Mutex::new(document),
            url: Mutex::new("about:blank".into()),
            calls: Mutex::new(Vec::new()),
            missing: HashSet::new(),
            flaky: Mutex::new(HashMap::new()),
        }
    }

    /// Locators (in `Display` form) that never appear.
    pub fn missing(mut self, locator: &str) -> Self {
        self.missing.insert(Locator::parse(locator).to_string());
        self
    }

    /// Clicks on `locator` fail this many times before succeeding.
    pub fn flaky(self, locator: &str, failures: u32) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(Locator::parse(locator).to_string(), failures);
        self
    }

    pub fn edit(&self, f: impl FnOnce(&mut CapturedDocument)) {
        f(&mut self.document.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn present(&self, locator: &Locator) -> Result<(), AgentError> {
        if self.missing.contains(&locator.to_string()) {
            return Err(AgentError::element_not_found(locator.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, url: &str) -> Result<(), AgentError> {
        self.log(format!("navigate {url}"));
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn wait_for_network_idle(&self) -> Result<(), AgentError> {
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, AgentError> {
        if script == CAPTURE_SCRIPT {
            let doc = self.document.lock().unwrap();
            return Ok(serde_json::to_value(&*doc).unwrap());
        }
        self.log("evaluate".into());
        Ok(json!(0))
    }

    async fn wait_for_selector(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<(), AgentError> {
        self.present(locator)
            .map_err(|_| AgentError::timeout(locator.to_string()))
    }

    async fn click(&self, locator: &Locator) -> Result<(), AgentError> {
        self.log(format!("click {locator}"));
        self.present(locator)?;
        let mut flaky = self.flaky.lock().unwrap();
        if let Some(remaining) = flaky.get_mut(&locator.to_string()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AgentError::element_not_found(format!("{locator} detached")));
            }
        }
        Ok(())
    }

    async fn clear(&self, locator: &Locator) -> Result<(), AgentError> {
        self.present(locator)?;
        self.log(format!("clear {locator}"));
        Ok(())
    }

    async fn type_text(
        &self,
        locator: &Locator,
        text: &str,
        _char_delay: Duration,
    ) -> Result<(), AgentError> {
        self.present(locator)?;
        self.log(format!("type {locator} {text}"));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
        self.log("screenshot".into());
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn url(&self) -> Result<String, AgentError> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn title(&self) -> Result<String, AgentError> {
        Ok("Fake page".into())
    }

    async fn page_text(&self) -> Result<String, AgentError> {
        Ok("Search  the\n web".into())
    }
}

/// Replays canned replies in order, then falls back like an unreachable engine.
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<usize>>,
}

impl ScriptedEngine {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Conversation length at each call.
    pub fn seen(&self) -> Vec<usize> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn complete(&self, messages: &[ChatMessage]) -> String {
        self.seen.lock().unwrap().push(messages.len());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| fallback_reply("error", "script exhausted"))
    }
}

/// A full decision reply for `action`.
pub fn reply(memory: &str, next_goal: &str, action: Value) -> String {
    json!({
        "current_state": {
            "page_summary": "search page",
            "evaluation_previous_goal": "Success",
            "memory": memory,
            "next_goal": next_goal,
        },
        "action": action,
    })
    .to_string()
}
