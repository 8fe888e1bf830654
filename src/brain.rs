//! The reasoning engine: an OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::types::{ChatMessage, file_timestamp};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-5.2";

/// Text-in, text-out decision source consulted once per cycle.
///
/// Implementations never fail: transport problems are turned into a reply
/// the response parser can still decode.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrainConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl BrainConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            timeout: Duration::from_secs(60),
        }
    }

    /// Reads `OPENAI_API_KEY` (or `LLM_API_KEY`), `LLM_BASE_URL` and `LLM_MODEL`.
    pub fn from_env() -> Result<Self, AgentError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .or_else(|_| std::env::var("LLM_API_KEY"))
            .map_err(|_| AgentError::Config("OPENAI_API_KEY not set in environment".into()))?;
        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

pub struct Brain {
    client: Client,
    config: BrainConfig,
}

impl Brain {
    pub fn new(config: BrainConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Engine(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, AgentError> {
        Self::new(BrainConfig::from_env()?)
    }

    pub fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content.trim() }))
            .collect();
        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": false,
        })
    }

    /// One round trip. Returns the reply content, possibly empty.
    async fn request(&self, messages: &[ChatMessage]) -> Result<String, AgentError> {
        if messages.len() > 40 {
            debug!(turns = messages.len(), "conversation is getting long");
        }

        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| AgentError::Engine(format!("request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Engine(format!("invalid response body: {e}")))?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown API error");
            return Err(AgentError::Engine(format!("API error ({status}): {message}")));
        }

        Ok(extract_content(&body).unwrap_or_default())
    }
}

#[async_trait]
impl ReasoningEngine for Brain {
    async fn complete(&self, messages: &[ChatMessage]) -> String {
        match self.request(messages).await {
            Ok(content) if !content.trim().is_empty() => {
                debug!(%content, "engine replied");
                content
            }
            Ok(_) => {
                warn!("empty reply from reasoning engine, falling back to a screenshot");
                fallback_reply("empty-response", "The reasoning engine returned no content.")
            }
            Err(e) => {
                warn!(error = %e, "reasoning engine unavailable, falling back to a screenshot");
                fallback_reply("error", &e.to_string())
            }
        }
    }
}

fn extract_content(body: &Value) -> Option<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
}

/// A decodable decision that only captures the page, used whenever the
/// engine cannot produce a reply.
pub fn fallback_reply(prefix: &str, reason: &str) -> String {
    json!({
        "current_state": {
            "page_summary": "",
            "evaluation_previous_goal": format!("Unknown - {reason}"),
            "memory": "",
            "next_goal": "Capture the current page for diagnosis",
        },
        "action": {
            "type": "screenshot",
            "params": { "path": format!("{prefix}-{}.png", file_timestamp()) },
        },
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::parse_response;
    use crate::types::ActionRequest;

    #[test]
    fn request_body_uses_chat_format() {
        let brain = Brain::new(BrainConfig::new("sk-test").model("test-model")).unwrap();
        let body = brain.request_body(&[
            ChatMessage::system("be precise"),
            ChatMessage::user("  Task: search  "),
        ]);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Task: search");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn extracts_first_choice() {
        let body = json!({"choices": [{"message": {"content": "{\"a\":1}"}}]});
        assert_eq!(extract_content(&body).as_deref(), Some("{\"a\":1}"));
        assert_eq!(extract_content(&json!({"choices": []})), None);
    }

    #[test]
    fn fallback_reply_parses_as_screenshot() {
        let decision = parse_response(&fallback_reply("error", "connection refused")).unwrap();
        match decision.action {
            ActionRequest::Screenshot { path: Some(path) } => {
                assert!(path.starts_with("error-"));
                assert!(path.ends_with(".png"));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(
            decision
                .current_state
                .evaluation_previous_goal
                .contains("connection refused")
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_fallback() {
        let mut config = BrainConfig::new("sk-test");
        config.base_url = "http://127.0.0.1:9/v1/chat/completions".into();
        config.timeout = Duration::from_secs(2);
        let brain = Brain::new(config).unwrap();

        let reply = brain.complete(&[ChatMessage::user("hello")]).await;
        let decision = parse_response(&reply).unwrap();
        assert_eq!(decision.action.kind(), "screenshot");
    }
}
