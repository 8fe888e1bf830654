//! The page primitives the agent consumes from a browser.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;

/// How an element is located on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    /// Parses a selector string: `css=` and `xpath=` prefixes are honored,
    /// anything starting with `/` or `(/` is XPath and the rest is CSS.
    pub fn parse(selector: &str) -> Self {
        let selector = selector.trim();
        if let Some(rest) = selector.strip_prefix("xpath=") {
            return Locator::XPath(rest.trim().to_string());
        }
        if let Some(rest) = selector.strip_prefix("css=") {
            return Locator::Css(rest.trim().to_string());
        }
        if selector.starts_with('/') || selector.starts_with("(/") {
            Locator::XPath(selector.to_string())
        } else {
            Locator::Css(selector.to_string())
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css={s}"),
            Locator::XPath(s) => write!(f, "xpath={s}"),
        }
    }
}

/// A single page driven by one run. Calls are issued strictly one at a time.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), AgentError>;

    /// Waits until in-flight navigation and network activity have settled.
    async fn wait_for_network_idle(&self) -> Result<(), AgentError>;

    /// Evaluates `script` and returns its JSON value.
    async fn evaluate(&self, script: &str) -> Result<Value, AgentError>;

    async fn wait_for_selector(&self, locator: &Locator, timeout: Duration)
        -> Result<(), AgentError>;

    async fn click(&self, locator: &Locator) -> Result<(), AgentError>;

    /// Empties the value of an input-like element.
    async fn clear(&self, locator: &Locator) -> Result<(), AgentError>;

    /// Types `text` into the element, pausing `char_delay` between characters.
    async fn type_text(
        &self,
        locator: &Locator,
        text: &str,
        char_delay: Duration,
    ) -> Result<(), AgentError>;

    /// Full-page PNG.
    async fn screenshot(&self) -> Result<Vec<u8>, AgentError>;

    async fn url(&self) -> Result<String, AgentError>;

    async fn title(&self) -> Result<String, AgentError>;

    /// `document.body.innerText`.
    async fn page_text(&self) -> Result<String, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selector_prefixes() {
        assert_eq!(Locator::parse("#su"), Locator::Css("#su".into()));
        assert_eq!(
            Locator::parse("/html/body/form/input"),
            Locator::XPath("/html/body/form/input".into())
        );
        assert_eq!(
            Locator::parse("(//button)[2]"),
            Locator::XPath("(//button)[2]".into())
        );
        assert_eq!(
            Locator::parse("xpath=//a[text()='Next']"),
            Locator::XPath("//a[text()='Next']".into())
        );
        assert_eq!(Locator::parse("css= .c-container"), Locator::Css(".c-container".into()));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let locator = Locator::XPath("//div".into());
        assert_eq!(Locator::parse(&locator.to_string()), locator);
    }
}
