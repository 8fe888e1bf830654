mod support;

use dom_pilot::agent::{CompletionCheck, CompletionGuard, Dispatcher, GuardContext, LoopState};
use dom_pilot::types::{ActionHistory, ActionRequest, ClickTarget, Role};
use dom_pilot::{Agent, AgentConfig, AgentError, RunStatus};
use serde_json::json;
use dom_pilot::dom::{CapturedDocument, DocumentView, Rect};
use support::{FakePage, ScriptedEngine, line, reply, search_form};

fn config(dir: &tempfile::TempDir) -> AgentConfig {
    AgentConfig::minimal().screenshot_dir(dir.path())
}

fn screenshots(dir: &tempfile::TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn search_task_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new([
        reply(
            "",
            "Open baidu",
            json!({"type": "navigate", "params": {"url": "https://www.baidu.com"}}),
        ),
        reply(
            "On baidu",
            "Type the query",
            json!({"type": "type", "params": {"selector": "#kw", "text": "rust"}}),
        ),
        reply(
            "Query typed",
            "Submit",
            json!({"type": "click", "params": {"index": 1}}),
        ),
        reply(
            "Searched, search results are visible",
            "Finish",
            json!({"type": "complete"}),
        ),
    ]);
    let mut agent = Agent::new(FakePage::new(search_form()), engine, config(&dir));

    let report = agent.run("search for rust on baidu").await;

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.is_success());
    assert_eq!(report.cycles, 4);
    assert_eq!(agent.state(), LoopState::Completed);

    let kinds: Vec<&str> = report
        .history
        .entries()
        .iter()
        .map(|entry| entry.action.kind())
        .collect();
    assert_eq!(kinds, ["navigate", "type", "click", "screenshot"]);
    assert!(report.history.entries().iter().all(|e| e.outcome.success));

    let click = &report.history.entries()[2].outcome;
    assert_eq!(click.data.as_ref().unwrap()["text"], "百度一下");

    let calls = agent.page().calls();
    assert!(calls.contains(&"navigate https://www.baidu.com".to_string()));
    assert!(calls.contains(&"type css=#kw rust".to_string()));

    let shots = screenshots(&dir);
    assert_eq!(shots.len(), 1);
    assert!(shots[0].starts_with("task-complete-"));
}

#[tokio::test]
async fn conversation_carries_perception_and_executed_turns() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new([
        reply(
            "",
            "Open the site",
            json!({"type": "navigate", "params": {"url": "https://example.com"}}),
        ),
        reply("Page opened", "Done", json!({"type": "complete"})),
    ]);
    let mut agent = Agent::new(FakePage::new(search_form()), engine, config(&dir));

    let report = agent.run("open example.com").await;
    assert_eq!(report.status, RunStatus::Completed);

    let messages = report.conversation.messages();
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].role, Role::User);
    assert!(messages[1].content.contains("open example.com"));

    let perception = &messages[2];
    assert_eq!(perception.role, Role::User);
    assert!(perception.content.contains("- Interactive elements: 2"));
    assert!(perception.content.contains("[1]<button id=\"su\">百度一下</button>"));
    assert!(perception.content.contains("Search the web"));

    assert_eq!(messages[3].role, Role::Assistant);
    assert!(messages[4].content.starts_with("Action executed: "));
    assert!(
        messages[5]
            .content
            .contains("- URL: https://example.com")
    );

    assert_eq!(agent.engine().seen(), [3, 6]);
}

#[tokio::test]
async fn premature_complete_is_vetoed() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new([
        reply(
            "Query typed",
            "",
            json!({"type": "type", "params": {"selector": "#kw", "text": "rust"}}),
        ),
        reply("Results not yet shown", "", json!({"type": "complete"})),
        reply(
            "Query typed",
            "Submit",
            json!({"type": "click", "params": {"selector": "#su"}}),
        ),
        reply("Searched", "", json!({"type": "complete"})),
    ]);
    let mut agent = Agent::new(FakePage::new(search_form()), engine, config(&dir));

    let report = agent.run("search for rust").await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.cycles, 4);
    let vetoes = report
        .conversation
        .messages()
        .iter()
        .filter(|m| m.content.starts_with("The task is not complete yet"))
        .count();
    assert_eq!(vetoes, 1);

    let kinds: Vec<&str> = report
        .history
        .entries()
        .iter()
        .map(|entry| entry.action.kind())
        .collect();
    assert_eq!(kinds, ["type", "click", "screenshot"]);
}

/// Refuses completion until a screenshot has been taken.
struct ScreenshotFirst;

impl CompletionCheck for ScreenshotFirst {
    fn name(&self) -> &'static str {
        "screenshot_first"
    }

    fn check(&self, ctx: &GuardContext<'_>) -> Result<(), String> {
        let taken = ctx
            .history
            .entries()
            .iter()
            .any(|entry| entry.action.kind() == "screenshot");
        if taken {
            Ok(())
        } else {
            Err("take a screenshot of the result first".into())
        }
    }
}

#[tokio::test]
async fn custom_completion_check_vetoes_through_the_conversation() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new([
        reply("Page looks done", "", json!({"type": "complete"})),
        reply(
            "Vetoed",
            "Capture the page",
            json!({"type": "screenshot", "params": {"path": "proof"}}),
        ),
        reply("Screenshot saved", "", json!({"type": "complete"})),
    ]);
    let guard = CompletionGuard::empty().with_check(ScreenshotFirst);
    let mut agent =
        Agent::new(FakePage::new(search_form()), engine, config(&dir)).with_guard(guard);

    let report = agent.run("open the page").await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.cycles, 3);
    let vetoes: Vec<&str> = report
        .conversation
        .messages()
        .iter()
        .filter(|m| m.content.starts_with("The task is not complete yet"))
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(vetoes.len(), 1);
    assert!(vetoes[0].contains("take a screenshot of the result first"));
    assert!(screenshots(&dir).contains(&"proof.png".to_string()));
}

#[tokio::test]
async fn dispatch_failure_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new([reply(
        "",
        "Click the missing thing",
        json!({"type": "click", "params": {"selector": "#missing"}}),
    )]);
    let page = FakePage::new(search_form()).missing("#missing");
    let mut agent = Agent::new(page, engine, config(&dir));

    let report = agent.run("click the thing").await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(agent.state(), LoopState::Failed);
    assert_eq!(report.cycles, 1);
    assert_eq!(report.history.len(), 1);
    let last = report.history.last().unwrap();
    assert!(!last.outcome.success);
    assert!(last.outcome.error.as_deref().unwrap().contains("#missing"));
    assert!(report.reason.unwrap().contains("#missing"));
}

#[tokio::test]
async fn unknown_action_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new([reply(
        "",
        "Scroll",
        json!({"type": "scroll", "params": {"dy": 300}}),
    )]);
    let mut agent = Agent::new(FakePage::new(search_form()), engine, config(&dir));

    let report = agent.run("read the page").await;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.reason.unwrap().contains("unrecognized action type 'scroll'"));
    assert_eq!(report.history.len(), 1);
}

#[tokio::test]
async fn unparseable_reply_ends_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new(["I am not sure what to do here."]);
    let mut agent = Agent::new(FakePage::new(search_form()), engine, config(&dir));

    let report = agent.run("do something").await;

    assert_eq!(report.status, RunStatus::Completed);
    assert!(!report.is_success());
    assert!(report.final_decision.is_none());
    assert!(report.history.is_empty());
    assert!(report.reason.unwrap().contains("unparseable"));
}

#[tokio::test]
async fn budget_exhaustion_stops_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new(Vec::<String>::new());
    let mut agent = Agent::new(
        FakePage::new(search_form()),
        engine,
        config(&dir).max_cycles(3),
    );

    let report = agent.run("anything").await;

    assert_eq!(report.status, RunStatus::BudgetExhausted);
    assert_eq!(report.cycles, 3);
    assert_eq!(report.history.len(), 3);
    assert!(
        screenshots(&dir)
            .iter()
            .all(|name| name.starts_with("error-"))
    );
}

#[tokio::test]
async fn click_is_retried_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let page = FakePage::new(search_form()).flaky("#su", 1);
    let mut history = ActionHistory::new();

    let outcome = Dispatcher::new(&page, &config)
        .dispatch(
            &ActionRequest::Click {
                target: ClickTarget::Selector("#su".into()),
            },
            &mut history,
        )
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(history.len(), 1);
    let clicks = page
        .calls()
        .iter()
        .filter(|call| *call == "click css=#su")
        .count();
    assert_eq!(clicks, 2);
}

#[tokio::test]
async fn click_retry_gives_up_after_second_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let page = FakePage::new(search_form()).flaky("#su", 2);
    let mut history = ActionHistory::new();

    let err = Dispatcher::new(&page, &config)
        .dispatch(
            &ActionRequest::Click {
                target: ClickTarget::Selector("#su".into()),
            },
            &mut history,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::ElementNotFound(_)));
    assert_eq!(history.len(), 1);
    assert!(!history.last().unwrap().outcome.success);
}

#[tokio::test]
async fn wait_for_selector_falls_back_to_result_container() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let page = FakePage::new(search_form()).missing("#content_left");
    let mut history = ActionHistory::new();

    let outcome = Dispatcher::new(&page, &config)
        .dispatch(
            &ActionRequest::WaitForSelector {
                selector: "#content_left".into(),
                timeout_ms: Some(50),
            },
            &mut history,
        )
        .await
        .unwrap();

    let data = outcome.data.unwrap();
    assert_eq!(data["selector"], "#content_left");
    assert!(data["fallback"].as_str().unwrap().contains(".c-container"));
}

#[tokio::test]
async fn index_click_resolves_against_the_current_page() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let page = FakePage::new(search_form());
    page.edit(|doc| {
        let body = doc.body().unwrap();
        let link = doc.insert_element(body, 0, "a", line(0.0));
        doc.set_attribute(link, "href", "/news");
        doc.append_text(link, "News", line(0.0));
    });
    let mut history = ActionHistory::new();

    let outcome = Dispatcher::new(&page, &config)
        .dispatch(
            &ActionRequest::Click {
                target: ClickTarget::Index(0),
            },
            &mut history,
        )
        .await
        .unwrap();

    let data = outcome.data.unwrap();
    assert_eq!(data["tag"], "a");
    assert_eq!(data["text"], "News");
}

#[tokio::test]
async fn index_out_of_range_is_element_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let page = FakePage::new(search_form());
    let mut history = ActionHistory::new();

    let err = Dispatcher::new(&page, &config)
        .dispatch(
            &ActionRequest::Click {
                target: ClickTarget::Index(7),
            },
            &mut history,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::ElementNotFound(_)));
}

#[tokio::test]
async fn screenshot_names_are_normalized_into_the_default_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let page = FakePage::new(search_form());
    let mut history = ActionHistory::new();

    Dispatcher::new(&page, &config)
        .dispatch(
            &ActionRequest::Screenshot {
                path: Some("results".into()),
            },
            &mut history,
        )
        .await
        .unwrap();

    assert_eq!(screenshots(&dir), ["results.png"]);
    let bytes = std::fs::read(dir.path().join("results.png")).unwrap();
    assert!(bytes.starts_with(b"\x89PNG"));
}

#[tokio::test]
async fn index_click_refuses_elements_inside_frames() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let page = FakePage::new(CapturedDocument::default());
    page.edit(|doc| {
        let body = doc.body().unwrap();
        let delete = doc.append_element(body, "button", line(10.0));
        doc.append_text(delete, "Delete account", line(10.0));
        let (_, frame_body) = doc.append_frame(body, Rect::new(0.0, 100.0, 400.0, 300.0));
        let pay = doc.append_element(frame_body, "button", line(5.0));
        doc.append_text(pay, "Pay", line(5.0));
    });
    let mut history = ActionHistory::new();

    // [0] Delete account, [1] the iframe, [2] Pay inside it.
    let err = Dispatcher::new(&page, &config)
        .dispatch(
            &ActionRequest::Click {
                target: ClickTarget::Index(2),
            },
            &mut history,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::ElementNotFound(_)));
    assert!(err.to_string().contains("iframe"));
    assert!(!page.calls().iter().any(|call| call.starts_with("click")));
}
