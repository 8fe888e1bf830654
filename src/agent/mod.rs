//! Agent loop: perception, reply parsing, completion guard and action
//! dispatch.

pub mod control;
pub mod dispatcher;
pub mod guard;
pub mod parser;
pub mod perception;
pub mod prompt;

pub use control::{Agent, LoopState, RunReport, RunStatus};
pub use dispatcher::{Dispatcher, screenshot_path};
pub use guard::{CompletionCheck, CompletionGuard, GuardContext, GuardVerdict};
pub use parser::parse_response;
pub use perception::{PageState, Perceiver};
