use thiserror::Error;

/// Errors emitted while perceiving, deciding and acting on a page.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The reasoning engine reply could not be decoded into a decision.
    #[error("unparseable reply: {0}")]
    Parse(String),

    /// A stale index or a selector that matched nothing.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// Unrecognized action variant or unusable action parameters.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// The browser collaborator failed (CDP, script evaluation, worker join).
    #[error("browser error: {0}")]
    Browser(String),

    /// The reasoning engine could not be reached or answered with an error.
    #[error("reasoning engine error: {0}")]
    Engine(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub fn element_not_found(message: impl Into<String>) -> Self {
        Self::ElementNotFound(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch(message.into())
    }

    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser(message.into())
    }

    /// Errors a click is allowed to retry once after the page settles.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ElementNotFound(_) | AgentError::Timeout(_) | AgentError::Browser(_)
        )
    }
}
