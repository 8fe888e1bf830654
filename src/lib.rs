//! A browser agent: snapshots the page into an indexed tree of interactive
//! elements, asks a reasoning engine for the next action and executes it
//! until the task is done.

pub mod agent;
pub mod brain;
pub mod browser;
pub mod config;
pub mod dom;
pub mod error;
pub mod hands;
pub mod types;

pub use agent::{Agent, RunReport, RunStatus};
pub use brain::{Brain, BrainConfig, ReasoningEngine};
pub use browser::{BrowserPage, Locator};
pub use config::AgentConfig;
pub use error::AgentError;
pub use hands::ChromeSession;
pub use types::{ActionRequest, AgentDecision, ChatMessage};
