//! The perceive, decide, act loop.

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::dispatcher::Dispatcher;
use super::guard::{CompletionGuard, GuardVerdict};
use super::parser::parse_response;
use super::perception::Perceiver;
use super::prompt::{
    executed_turn, perception_turn, system_turn, task_turn, truncate_string, veto_turn,
};
use crate::brain::ReasoningEngine;
use crate::browser::BrowserPage;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::types::{
    ActionHistory, ActionRequest, AgentDecision, ChatMessage, Conversation, file_timestamp,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Initializing,
    AwaitingDecision,
    ExecutingAction,
    Completed,
    Failed,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The guard accepted a `complete`, or the engine produced an
    /// unparseable reply.
    Completed,
    /// An action or a browser call failed.
    Failed,
    /// The cycle budget ran out first.
    BudgetExhausted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub reason: Option<String>,
    pub cycles: u32,
    pub history: ActionHistory,
    pub conversation: Conversation,
    /// The accepted `complete` decision.
    pub final_decision: Option<AgentDecision>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed && self.final_decision.is_some()
    }
}

/// How one cycle ended.
enum Cycle {
    Continue,
    Finished(RunStatus, Option<String>),
}

pub struct Agent<P, E> {
    page: P,
    engine: E,
    config: AgentConfig,
    guard: CompletionGuard,
    state: LoopState,
}

impl<P: BrowserPage, E: ReasoningEngine> Agent<P, E> {
    pub fn new(page: P, engine: E, config: AgentConfig) -> Self {
        Self {
            page,
            engine,
            config,
            guard: CompletionGuard::default(),
            state: LoopState::Initializing,
        }
    }

    pub fn with_guard(mut self, guard: CompletionGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Drives the page toward `task` until it completes, fails or the cycle
    /// budget runs out.
    pub async fn run(&mut self, task: &str) -> RunReport {
        self.transition(LoopState::Initializing);
        let mut conversation = Conversation::new();
        conversation.push(system_turn(self.config.system_prompt_suffix.as_deref()));
        conversation.push(task_turn(task));
        let mut history = ActionHistory::new();
        let mut final_decision = None;

        info!(task, max_cycles = self.config.max_cycles, "starting run");

        let mut cycles = 0;
        while cycles < self.config.max_cycles {
            cycles += 1;
            let outcome = self
                .cycle(cycles, task, &mut conversation, &mut history, &mut final_decision)
                .await;
            let (status, reason) = match outcome {
                Ok(Cycle::Continue) => continue,
                Ok(Cycle::Finished(status, reason)) => (status, reason),
                Err(e) => {
                    error!(cycle = cycles, error = %e, "run failed");
                    (RunStatus::Failed, Some(e.to_string()))
                }
            };
            self.transition(match status {
                RunStatus::Failed => LoopState::Failed,
                _ => LoopState::Completed,
            });
            info!(?status, cycles, "run finished");
            return RunReport {
                status,
                reason,
                cycles,
                history,
                conversation,
                final_decision,
            };
        }

        warn!(cycles, "cycle budget exhausted");
        self.transition(LoopState::Failed);
        RunReport {
            status: RunStatus::BudgetExhausted,
            reason: Some(format!(
                "reached the maximum of {} cycles",
                self.config.max_cycles
            )),
            cycles,
            history,
            conversation,
            final_decision,
        }
    }

    async fn cycle(
        &mut self,
        cycle: u32,
        task: &str,
        conversation: &mut Conversation,
        history: &mut ActionHistory,
        final_decision: &mut Option<AgentDecision>,
    ) -> Result<Cycle, AgentError> {
        self.transition(LoopState::AwaitingDecision);

        let perceiver = Perceiver::new(
            &self.page,
            self.config.snapshot,
            self.config.visible_text_chars,
        );
        let state = perceiver.perceive().await?;
        debug!(cycle, url = %state.url, elements = state.elements.len(), "perceived page");
        conversation.push(perception_turn(&state, history, self.config.history_lines));

        let reply = self.engine.complete(conversation.messages()).await;
        conversation.push(ChatMessage::assistant(reply.clone()));

        let Some(decision) = parse_response(&reply) else {
            let err = AgentError::Parse(truncate_string(reply.trim(), 200));
            warn!(cycle, error = %err, "ending run on unparseable reply");
            return Ok(Cycle::Finished(RunStatus::Completed, Some(err.to_string())));
        };
        info!(
            cycle,
            action = decision.action.kind(),
            next_goal = %decision.current_state.next_goal,
            "decision received"
        );

        if decision.action.is_complete() {
            return match self.guard.evaluate(task, &decision, history) {
                GuardVerdict::Reject { check, reason } => {
                    warn!(cycle, check, %reason, "completion vetoed");
                    conversation.push(veto_turn(&reason));
                    Ok(Cycle::Continue)
                }
                GuardVerdict::Accept => {
                    self.transition(LoopState::ExecutingAction);
                    let screenshot = ActionRequest::Screenshot {
                        path: Some(format!("task-complete-{}.png", file_timestamp())),
                    };
                    Dispatcher::new(&self.page, &self.config)
                        .dispatch(&screenshot, history)
                        .await?;
                    *final_decision = Some(decision);
                    Ok(Cycle::Finished(RunStatus::Completed, None))
                }
            };
        }

        self.transition(LoopState::ExecutingAction);
        Dispatcher::new(&self.page, &self.config)
            .dispatch(&decision.action, history)
            .await?;
        conversation.push(executed_turn(&decision.action));

        self.page.wait_for_network_idle().await?;
        sleep(self.config.settle_grace()).await;
        Ok(Cycle::Continue)
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "loop state");
            self.state = next;
        }
    }
}
