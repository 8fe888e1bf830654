//! Run configuration for the agent loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dom::SnapshotOptions;
use crate::error::AgentError;

/// Locator waited on when a `waitForSelector` target never shows up.
pub const DEFAULT_FALLBACK_LOCATOR: &str = ".c-container, #search, #results, main";

/// Configuration for one agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Cycles before the run stops with `BudgetExhausted`.
    /// Default: 25
    pub max_cycles: u32,

    /// Highlighting, focus index and viewport expansion for every snapshot.
    pub snapshot: SnapshotOptions,

    /// Wait for a selector before acting on it.
    /// Default: 5000
    pub selector_timeout_ms: u64,

    /// Wait for the fallback locator after a `waitForSelector` timeout.
    /// Default: 10000
    pub fallback_wait_ms: u64,

    pub fallback_locator: String,

    /// Pause between a selector appearing and clicking it.
    /// Default: 500
    pub click_settle_ms: u64,

    /// Pause after network idle before retrying a failed click.
    /// Default: 1000
    pub click_retry_delay_ms: u64,

    /// Pause between typed characters.
    /// Default: 50
    pub typing_char_delay_ms: u64,

    /// Pause after typing finishes.
    /// Default: 500
    pub type_settle_ms: u64,

    /// Grace delay after network idle between cycles.
    /// Default: 1000
    pub settle_grace_ms: u64,

    /// Directory for screenshots given without a directory.
    /// Default: "screenshots"
    pub screenshot_dir: PathBuf,

    /// Characters of page text included in each perception.
    /// Default: 200
    pub visible_text_chars: usize,

    /// Most recent history entries included in each perception.
    /// Default: 10
    pub history_lines: usize,

    /// Extra instructions appended to the system turn.
    pub system_prompt_suffix: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_cycles: 25,
            snapshot: SnapshotOptions::default(),
            selector_timeout_ms: 5_000,
            fallback_wait_ms: 10_000,
            fallback_locator: DEFAULT_FALLBACK_LOCATOR.to_string(),
            click_settle_ms: 500,
            click_retry_delay_ms: 1_000,
            typing_char_delay_ms: 50,
            type_settle_ms: 500,
            settle_grace_ms: 1_000,
            screenshot_dir: PathBuf::from("screenshots"),
            visible_text_chars: 200,
            history_lines: 10,
            system_prompt_suffix: None,
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// No delays and a short budget; for tests and replays.
    pub fn minimal() -> Self {
        Self {
            max_cycles: 10,
            selector_timeout_ms: 100,
            fallback_wait_ms: 100,
            click_settle_ms: 0,
            click_retry_delay_ms: 0,
            typing_char_delay_ms: 0,
            type_settle_ms: 0,
            settle_grace_ms: 0,
            ..Self::default()
        }
    }

    /// Loads a JSON config file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| AgentError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.max_cycles == 0 {
            return Err(AgentError::Config("max_cycles must be at least 1".into()));
        }
        if self.fallback_locator.trim().is_empty() {
            return Err(AgentError::Config("fallback_locator must not be empty".into()));
        }
        Ok(())
    }

    /// Builder: set the cycle budget.
    pub fn max_cycles(mut self, cycles: u32) -> Self {
        self.max_cycles = cycles;
        self
    }

    /// Builder: draw overlays over highlighted elements.
    pub fn highlight(mut self, enabled: bool) -> Self {
        self.snapshot.highlight = enabled;
        self
    }

    /// Builder: set the default screenshot directory.
    pub fn screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    pub fn system_prompt_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.system_prompt_suffix = Some(suffix.into());
        self
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn fallback_wait(&self) -> Duration {
        Duration::from_millis(self.fallback_wait_ms)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn click_retry_delay(&self) -> Duration {
        Duration::from_millis(self.click_retry_delay_ms)
    }

    pub fn typing_char_delay(&self) -> Duration {
        Duration::from_millis(self.typing_char_delay_ms)
    }

    pub fn type_settle(&self) -> Duration {
        Duration::from_millis(self.type_settle_ms)
    }

    pub fn settle_grace(&self) -> Duration {
        Duration::from_millis(self.settle_grace_ms)
    }
}
