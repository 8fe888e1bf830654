//! Veto over premature `complete` decisions.
//!
//! Each rule is a [`CompletionCheck`]; the guard runs them in order and the
//! first rejection wins. The rules are text heuristics over the task, the
//! decision's own state block and the history, so false accepts and false
//! rejects are expected.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{ActionHistory, ActionRequest, AgentDecision, ClickTarget, CurrentState};

static SEARCH_INTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(search\w*|look(?:ing)? up|book(?:ing|ed)?|reserv\w*)\b|搜索|预订|查询")
        .expect("search intent regex")
});

/// Substrings marking a locator or element text as a search trigger.
pub const SEARCH_TRIGGER_HINTS: &[&str] = &[
    "#su", "submit", "search", "btnk", "btng", "搜索", "查询", "百度一下",
];

/// Phrases in memory or next goal claiming the search already happened.
pub const SEARCH_OUTCOME_PHRASES: &[&str] = &[
    "searched",
    "search results",
    "search completed",
    "search complete",
    "search done",
    "found results",
    "results found",
    "搜索完成",
];

/// Phrases in memory or next goal saying work remains.
pub const PENDING_PHRASES: &[&str] = &[
    "need to",
    "needs to",
    "waiting for",
    "not yet",
    "still need",
    "still have to",
];

/// Next-goal verbs meaning the engine still plans to act.
pub const PENDING_GOAL_VERBS: &[&str] = &["enter", "select", "search", "click"];

/// Everything a check may look at.
pub struct GuardContext<'a> {
    pub task: &'a str,
    pub decision: &'a AgentDecision,
    pub history: &'a ActionHistory,
}

pub trait CompletionCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err(reason)` vetoes the completion.
    fn check(&self, ctx: &GuardContext<'_>) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Accept,
    Reject { check: &'static str, reason: String },
}

impl GuardVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, GuardVerdict::Accept)
    }
}

pub struct CompletionGuard {
    checks: Vec<Box<dyn CompletionCheck>>,
}

impl Default for CompletionGuard {
    fn default() -> Self {
        Self {
            checks: vec![Box::new(SearchIntentCheck), Box::new(PendingWorkCheck)],
        }
    }
}

impl CompletionGuard {
    /// A guard without checks; accepts everything.
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn with_check(mut self, check: impl CompletionCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn evaluate(
        &self,
        task: &str,
        decision: &AgentDecision,
        history: &ActionHistory,
    ) -> GuardVerdict {
        let ctx = GuardContext {
            task,
            decision,
            history,
        };
        for check in &self.checks {
            if let Err(reason) = check.check(&ctx) {
                return GuardVerdict::Reject {
                    check: check.name(),
                    reason,
                };
            }
        }
        GuardVerdict::Accept
    }
}

/// Search or booking tasks need evidence that the search was actually run.
pub struct SearchIntentCheck;

impl CompletionCheck for SearchIntentCheck {
    fn name(&self) -> &'static str {
        "search-intent"
    }

    fn check(&self, ctx: &GuardContext<'_>) -> Result<(), String> {
        if !task_implies_search(ctx.task) {
            return Ok(());
        }
        if history_has_search_click(ctx.history)
            || claims_search_outcome(&ctx.decision.current_state)
        {
            return Ok(());
        }
        Err("the task asks for a search, but no search was submitted or reported".into())
    }
}

/// The engine's own state says something is still outstanding.
pub struct PendingWorkCheck;

impl CompletionCheck for PendingWorkCheck {
    fn name(&self) -> &'static str {
        "pending-work"
    }

    fn check(&self, ctx: &GuardContext<'_>) -> Result<(), String> {
        match pending_work(&ctx.decision.current_state) {
            Some(evidence) => Err(format!("the current state says work remains (\"{evidence}\")")),
            None => Ok(()),
        }
    }
}

pub fn task_implies_search(task: &str) -> bool {
    SEARCH_INTENT.is_match(task)
}

pub fn is_search_trigger(text: &str) -> bool {
    let text = text.to_lowercase();
    SEARCH_TRIGGER_HINTS.iter().any(|hint| text.contains(*hint))
}

/// A successful click whose selector, or whose resolved locator and element
/// text for index clicks, looks like a search trigger.
pub fn history_has_search_click(history: &ActionHistory) -> bool {
    history.entries().iter().any(|entry| {
        if !entry.outcome.success {
            return false;
        }
        let ActionRequest::Click { target } = &entry.action else {
            return false;
        };
        if let ClickTarget::Selector(selector) = target {
            if is_search_trigger(selector) {
                return true;
            }
        }
        entry.outcome.data.as_ref().is_some_and(|data| {
            ["locator", "text", "selector"]
                .iter()
                .filter_map(|key| data.get(*key).and_then(|v| v.as_str()))
                .any(is_search_trigger)
        })
    })
}

pub fn claims_search_outcome(state: &CurrentState) -> bool {
    [&state.memory, &state.next_goal].iter().any(|text| {
        let text = text.to_lowercase();
        SEARCH_OUTCOME_PHRASES.iter().any(|phrase| text.contains(*phrase))
    })
}

/// The first phrase or verb showing outstanding work, if any.
pub fn pending_work(state: &CurrentState) -> Option<String> {
    for text in [&state.memory, &state.next_goal] {
        let text = text.to_lowercase();
        if let Some(phrase) = PENDING_PHRASES.iter().find(|phrase| text.contains(**phrase)) {
            return Some(phrase.to_string());
        }
    }
    let goal = state.next_goal.to_lowercase();
    goal.split(|c: char| !c.is_alphanumeric())
        .find(|word| PENDING_GOAL_VERBS.iter().any(|verb| word.starts_with(verb)))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionOutcome;
    use serde_json::json;

    fn complete(memory: &str, next_goal: &str) -> AgentDecision {
        AgentDecision {
            current_state: CurrentState {
                page_summary: "results page".into(),
                evaluation_previous_goal: "Success".into(),
                memory: memory.into(),
                next_goal: next_goal.into(),
            },
            action: ActionRequest::Complete,
        }
    }

    fn typed_query() -> ActionHistory {
        let mut history = ActionHistory::new();
        history.record(
            ActionRequest::Navigate {
                url: "https://www.baidu.com".into(),
            },
            ActionOutcome::ok(),
        );
        history.record(
            ActionRequest::Type {
                selector: "#kw".into(),
                text: "X".into(),
            },
            ActionOutcome::ok(),
        );
        history
    }

    #[test]
    fn rejects_search_task_without_search() {
        let guard = CompletionGuard::default();
        let verdict = guard.evaluate(
            "search for X and screenshot",
            &complete("results not yet found", ""),
            &typed_query(),
        );
        assert!(!verdict.is_accept());
    }

    #[test]
    fn accepts_search_task_after_trigger_click() {
        let guard = CompletionGuard::default();
        let mut history = typed_query();
        history.record(
            ActionRequest::Click {
                target: ClickTarget::Selector("#su".into()),
            },
            ActionOutcome::ok(),
        );
        let verdict = guard.evaluate(
            "search for X and screenshot",
            &complete("searched, found results", ""),
            &history,
        );
        assert_eq!(verdict, GuardVerdict::Accept);
    }

    #[test]
    fn index_click_counts_through_recorded_locator() {
        let mut history = typed_query();
        history.record(
            ActionRequest::Click {
                target: ClickTarget::Index(4),
            },
            ActionOutcome::ok_with(json!({
                "locator": "xpath=/html/body/form/input[2]",
                "tag": "input",
                "text": "百度一下",
            })),
        );
        assert!(history_has_search_click(&history));
    }

    #[test]
    fn failed_click_is_no_evidence() {
        let mut history = typed_query();
        history.record(
            ActionRequest::Click {
                target: ClickTarget::Selector("button[type=submit]".into()),
            },
            ActionOutcome::failed("timed out: button[type=submit]"),
        );
        assert!(!history_has_search_click(&history));
    }

    #[test]
    fn memory_claim_satisfies_search_intent() {
        let verdict = SearchIntentCheck.check(&GuardContext {
            task: "Look up the weather in Oslo",
            decision: &complete("Search completed, forecast visible", ""),
            history: &ActionHistory::new(),
        });
        assert!(verdict.is_ok());
    }

    #[test]
    fn non_search_tasks_skip_the_search_rule() {
        assert!(!task_implies_search("open example.com and take a screenshot"));
        assert!(!task_implies_search("read my facebook notifications"));
        assert!(task_implies_search("Book a table for two"));
        assert!(task_implies_search("在百度搜索 Rust"));
    }

    #[test]
    fn pending_phrases_and_goal_verbs() {
        assert_eq!(
            pending_work(&complete("still need to check price", "").current_state).as_deref(),
            Some("need to")
        );
        assert_eq!(
            pending_work(&complete("", "Click the first result").current_state).as_deref(),
            Some("click")
        );
        assert_eq!(
            pending_work(&complete("", "Selecting the date").current_state).as_deref(),
            Some("selecting")
        );
        assert!(pending_work(&complete("all done", "Task complete").current_state).is_none());
    }

    #[test]
    fn pending_work_vetoes_any_task() {
        let verdict = CompletionGuard::default().evaluate(
            "open example.com",
            &complete("waiting for the page", ""),
            &ActionHistory::new(),
        );
        match verdict {
            GuardVerdict::Reject { check, .. } => assert_eq!(check, "pending-work"),
            GuardVerdict::Accept => panic!("expected a veto"),
        }
    }

    #[test]
    fn empty_guard_accepts() {
        let verdict = CompletionGuard::empty().evaluate(
            "search for X",
            &complete("not yet", "click"),
            &ActionHistory::new(),
        );
        assert!(verdict.is_accept());
    }
}
