//! Executes one [`ActionRequest`] against the page.
//!
//! Every dispatch appends exactly one history entry, success or failure.
//! Errors are returned to the caller; the only recovery done here is the
//! single click retry and the fallback wait of `waitForSelector`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};

use super::perception::Perceiver;
use crate::browser::{BrowserPage, Locator};
use crate::config::AgentConfig;
use crate::dom::resolve;
use crate::error::AgentError;
use crate::types::{ActionHistory, ActionOutcome, ActionRequest, ClickTarget, file_timestamp};

pub struct Dispatcher<'a, P: ?Sized> {
    page: &'a P,
    config: &'a AgentConfig,
}

impl<'a, P: BrowserPage + ?Sized> Dispatcher<'a, P> {
    pub fn new(page: &'a P, config: &'a AgentConfig) -> Self {
        Self { page, config }
    }

    pub async fn dispatch(
        &self,
        action: &ActionRequest,
        history: &mut ActionHistory,
    ) -> Result<ActionOutcome, AgentError> {
        let started = Utc::now();
        let result = self.execute(action).await;
        match &result {
            Ok(outcome) => {
                info!(action = action.kind(), "action dispatched");
                history.record_at(action.clone(), outcome.clone(), started);
            }
            Err(e) => {
                warn!(action = action.kind(), error = %e, "action failed");
                history.record_at(action.clone(), ActionOutcome::failed(e), started);
            }
        }
        result
    }

    async fn execute(&self, action: &ActionRequest) -> Result<ActionOutcome, AgentError> {
        match action {
            ActionRequest::Navigate { url } => self.navigate(url).await,
            ActionRequest::Click { target } => self.click(target).await,
            ActionRequest::Type { selector, text } => self.type_into(selector, text).await,
            ActionRequest::Screenshot { path } => self.screenshot(path.as_deref()).await,
            ActionRequest::WaitForSelector {
                selector,
                timeout_ms,
            } => self.wait_for_selector(selector, *timeout_ms).await,
            ActionRequest::Complete => Ok(ActionOutcome::ok()),
            ActionRequest::Unknown { kind, .. } => Err(AgentError::dispatch(format!(
                "unrecognized action type '{kind}'"
            ))),
        }
    }

    async fn navigate(&self, url: &str) -> Result<ActionOutcome, AgentError> {
        self.page.navigate(url).await.map_err(|e| match e {
            AgentError::Browser(message) => AgentError::Navigation(format!("{url}: {message}")),
            other => other,
        })?;
        self.page.wait_for_network_idle().await?;
        Ok(ActionOutcome::ok_with(json!({ "url": url })))
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout_ms: Option<u64>,
    ) -> Result<ActionOutcome, AgentError> {
        let locator = Locator::parse(selector);
        let timeout = timeout_ms
            .map(std::time::Duration::from_millis)
            .unwrap_or_else(|| self.config.selector_timeout());

        match self.page.wait_for_selector(&locator, timeout).await {
            Ok(()) => Ok(ActionOutcome::ok_with(json!({ "selector": selector }))),
            Err(e) if e.is_retryable() => {
                let fallback = Locator::parse(&self.config.fallback_locator);
                warn!(%locator, %fallback, "selector did not appear, waiting for result container");
                self.page
                    .wait_for_selector(&fallback, self.config.fallback_wait())
                    .await
                    .map_err(|_| {
                        AgentError::timeout(format!("{selector} (fallback {fallback} also absent)"))
                    })?;
                Ok(ActionOutcome::ok_with(json!({
                    "selector": selector,
                    "fallback": fallback.to_string(),
                })))
            }
            Err(e) => Err(e),
        }
    }

    async fn click(&self, target: &ClickTarget) -> Result<ActionOutcome, AgentError> {
        match self.click_once(target).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_retryable() => {
                warn!(%target, error = %e, "click failed, retrying once after the page settles");
                self.page.wait_for_network_idle().await?;
                sleep(self.config.click_retry_delay()).await;
                self.click_once(target).await
            }
            Err(e) => Err(e),
        }
    }

    async fn click_once(&self, target: &ClickTarget) -> Result<ActionOutcome, AgentError> {
        match target {
            ClickTarget::Index(index) => {
                // Indices are only valid against a projection taken right now.
                let perceiver = Perceiver::new(
                    self.page,
                    self.config.snapshot,
                    self.config.visible_text_chars,
                );
                let elements = perceiver.elements().await?;
                let element = resolve(&elements, *index)?;
                self.page.click(&element.locator).await?;
                Ok(ActionOutcome::ok_with(json!({
                    "index": index,
                    "locator": element.locator.to_string(),
                    "tag": element.tag_name,
                    "text": element.text_or_placeholder,
                })))
            }
            ClickTarget::Selector(selector) => {
                let locator = Locator::parse(selector);
                self.page
                    .wait_for_selector(&locator, self.config.selector_timeout())
                    .await?;
                sleep(self.config.click_settle()).await;
                self.page.click(&locator).await?;
                Ok(ActionOutcome::ok_with(json!({ "selector": selector })))
            }
        }
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<ActionOutcome, AgentError> {
        let locator = Locator::parse(selector);
        self.page
            .wait_for_selector(&locator, self.config.selector_timeout())
            .await?;
        self.page.clear(&locator).await?;
        self.page
            .type_text(&locator, text, self.config.typing_char_delay())
            .await?;
        sleep(self.config.type_settle()).await;
        Ok(ActionOutcome::ok_with(json!({ "selector": selector, "text": text })))
    }

    async fn screenshot(&self, path: Option<&str>) -> Result<ActionOutcome, AgentError> {
        let path = screenshot_path(path, &self.config.screenshot_dir);
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let bytes = self.page.screenshot().await?;
        tokio::fs::write(&path, &bytes).await?;

        match tokio::fs::try_exists(&path).await {
            Ok(true) => info!(path = %path.display(), bytes = bytes.len(), "screenshot saved"),
            Ok(false) => warn!(path = %path.display(), "screenshot missing after write"),
            Err(e) => warn!(path = %path.display(), error = %e, "could not verify screenshot"),
        }

        Ok(ActionOutcome::ok_with(json!({
            "path": path.display().to_string(),
            "bytes": bytes.len(),
        })))
    }
}

/// Final location of a screenshot: a timestamped name when none is given,
/// a `.png` extension, and `default_dir` when the name has no directory.
pub fn screenshot_path(requested: Option<&str>, default_dir: &Path) -> PathBuf {
    let mut name = requested
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("task-{}.png", file_timestamp()));
    if !name.to_lowercase().ends_with(".png") {
        name.push_str(".png");
    }

    let path = PathBuf::from(name);
    let has_dir = path
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty());
    if has_dir {
        path
    } else {
        default_dir.join(path)
    }
}
