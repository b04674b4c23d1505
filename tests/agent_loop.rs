mod common;

use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use common::{Call, MockBackend, ScriptedModel, answer, config, step};
use web_navigator::{Agent, AgentConfig, AgentEvent, LocalizationMode, TaskStatus};

#[tokio::test(start_paused = true)]
async fn test_answer_ends_task_without_touching_page() {
    let model = ScriptedModel::new(
        vec![
            step(
                "Open the search box",
                "",
                json!({"action": "click_element", "element": "search box", "x": 10, "y": 20}),
            ),
            answer("42"),
        ],
        vec![r#"{"x": 100, "y": 200}"#],
    );
    let backend = MockBackend::new();
    let mut agent = Agent::new(model, Box::new(backend.clone()), config(10));

    let result = agent
        .run_task("What is the answer?", None, &CancellationToken::new())
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.final_answer.as_deref(), Some("42"));
    assert_eq!(result.total_steps, 2);
    assert_eq!(
        backend.actions(),
        vec![
            Call::Restart,
            Call::Goto("https://www.google.com".into()),
            Call::Click(100, 200),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_step_budget_returns_notes() {
    let wait = json!({"action": "wait", "seconds": 1});
    let model = ScriptedModel::new(
        vec![
            step("look", "price is 10", wait.clone()),
            step("look", "", wait.clone()),
            step("look", "shipping free", wait.clone()),
            answer("too late"),
        ],
        vec![],
    );
    let backend = MockBackend::new();
    let mut agent = Agent::new(model, Box::new(backend.clone()), config(3));

    let result = agent.run_task("find a price", None, &CancellationToken::new()).await;

    assert_eq!(result.status, TaskStatus::MaxStepsReached);
    assert_eq!(result.total_steps, 3);
    assert_eq!(
        result.final_answer.as_deref(),
        Some("Step 1: price is 10\nStep 3: shipping free")
    );
    let screenshots = backend
        .calls()
        .into_iter()
        .filter(|call| *call == Call::Screenshot)
        .count();
    assert_eq!(screenshots, 3);
}

#[tokio::test(start_paused = true)]
async fn test_scrolls_beyond_cap_are_skipped() {
    let scroll = json!({"action": "scroll", "direction": "down"});
    let model = ScriptedModel::new(
        vec![
            step("more", "", scroll.clone()),
            step("more", "", scroll.clone()),
            step("more", "", scroll.clone()),
            step("more", "", scroll.clone()),
            answer("bottom"),
        ],
        vec![],
    );
    let backend = MockBackend::new();
    let mut agent = Agent::new(model, Box::new(backend.clone()), config(10));

    let result = agent.run_task("read the page", None, &CancellationToken::new()).await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.total_steps, 5);
    let scrolls: Vec<Call> = backend
        .actions()
        .into_iter()
        .filter(|call| matches!(call, Call::Scroll(..)))
        .collect();
    assert_eq!(scrolls, vec![Call::Scroll(0, 500); 3]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_action_does_not_end_task() {
    let model = ScriptedModel::new(
        vec![
            step(
                "click it",
                "",
                json!({"action": "click_element", "element": "button", "x": 1, "y": 2}),
            ),
            answer("done anyway"),
        ],
        vec![r#"{"x": 3, "y": 4}"#],
    );
    let (tx, mut rx) = broadcast::channel(32);
    let mut agent = Agent::new(model, Box::new(MockBackend::failing("click")), config(10))
        .with_events(tx);

    let result = agent.run_task("press the button", None, &CancellationToken::new()).await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.total_steps, 2);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(
        events
            .iter()
            .any(|e| matches!(e, AgentEvent::StepError { number: 1, .. }))
    );
    assert!(matches!(events.last(), Some(AgentEvent::Ready)));
}

#[tokio::test(start_paused = true)]
async fn test_dead_browser_aborts_with_error() {
    let model = ScriptedModel::new(vec![answer("unreachable")], vec![]);
    let mut agent = Agent::new(model, Box::new(MockBackend::dead()), config(10));

    let result = agent.run_task("anything", None, &CancellationToken::new()).await;

    assert_eq!(result.status, TaskStatus::Error);
    assert_eq!(result.total_steps, 0);
    assert!(result.message.is_some());
    assert!(result.final_answer.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_first_step() {
    let model = ScriptedModel::new(vec![answer("unreachable")], vec![]);
    let backend = MockBackend::new();
    let mut agent = Agent::new(model.clone(), Box::new(backend.clone()), config(10));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = agent.run_task("anything", None, &cancel).await;

    assert_eq!(result.status, TaskStatus::Cancelled);
    assert_eq!(result.total_steps, 0);
    assert!(model.navigation_prompts.lock().unwrap().is_empty());
    assert!(!backend.calls().contains(&Call::Screenshot));
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_location_falls_back_to_hint() {
    let model = ScriptedModel::new(
        vec![
            step(
                "click it",
                "",
                json!({"action": "click_element", "element": "logo", "x": 10, "y": 20}),
            ),
            answer("ok"),
        ],
        vec!["I cannot see it"],
    );
    let backend = MockBackend::new();
    let mut agent = Agent::new(model, Box::new(backend.clone()), config(10));

    agent.run_task("click the logo", None, &CancellationToken::new()).await;

    assert!(backend.actions().contains(&Call::Click(10, 20)));
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_location_without_fallback_skips_click() {
    let model = ScriptedModel::new(
        vec![
            step(
                "click it",
                "",
                json!({"action": "click_element", "element": "logo", "x": 10, "y": 20}),
            ),
            answer("ok"),
        ],
        vec!["I cannot see it"],
    );
    let backend = MockBackend::new();
    let config = AgentConfig {
        fallback_to_hint: false,
        ..config(10)
    };
    let mut agent = Agent::new(model, Box::new(backend.clone()), config);

    let result = agent.run_task("click the logo", None, &CancellationToken::new()).await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert!(!backend.actions().iter().any(|c| matches!(c, Call::Click(..))));
}

#[tokio::test(start_paused = true)]
async fn test_textual_localization() {
    let model = ScriptedModel::new(
        vec![
            step(
                "click it",
                "",
                json!({"action": "click_element", "element": "menu", "x": 0, "y": 0}),
            ),
            answer("ok"),
        ],
        vec!["Click(30, 40)"],
    );
    let backend = MockBackend::new();
    let config = AgentConfig {
        localization_mode: LocalizationMode::Textual,
        ..config(10)
    };
    let mut agent = Agent::new(model.clone(), Box::new(backend.clone()), config);

    agent.run_task("open the menu", None, &CancellationToken::new()).await;

    assert!(backend.actions().contains(&Call::Click(30, 40)));
    let prompts = model.localization_prompts.lock().unwrap();
    assert!(prompts[0].contains("Click(x, y)"));
    assert!(prompts[0].contains("menu"));
}

#[tokio::test(start_paused = true)]
async fn test_write_clicks_types_and_submits() {
    let model = ScriptedModel::new(
        vec![
            step(
                "search",
                "",
                json!({
                    "action": "write_element_abs",
                    "element": "search field",
                    "content": "rust borrow checker",
                    "x": 1,
                    "y": 1
                }),
            ),
            answer("found"),
        ],
        vec![r#"```json
{"x": 5, "y": 6}
```"#],
    );
    let backend = MockBackend::new();
    let mut agent = Agent::new(model, Box::new(backend.clone()), config(10));

    agent.run_task("search for rust", None, &CancellationToken::new()).await;

    let actions = backend.actions();
    let from_click = actions
        .iter()
        .position(|c| *c == Call::Click(5, 6))
        .expect("click on located field");
    assert_eq!(
        actions[from_click..],
        [
            Call::Click(5, 6),
            Call::Type("rust borrow checker".into()),
            Call::Key("Enter".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_goto_without_scheme_gets_https() {
    let model = ScriptedModel::new(
        vec![
            step("go", "", json!({"action": "goto", "url": "example.com/docs"})),
            answer("ok"),
        ],
        vec![],
    );
    let backend = MockBackend::new();
    let mut agent = Agent::new(model, Box::new(backend.clone()), config(10));

    agent
        .run_task("read docs", Some("example.org"), &CancellationToken::new())
        .await;

    let gotos: Vec<Call> = backend
        .actions()
        .into_iter()
        .filter(|c| matches!(c, Call::Goto(_)))
        .collect();
    assert_eq!(
        gotos,
        vec![
            Call::Goto("https://example.org".into()),
            Call::Goto("https://example.com/docs".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_malformed_reply_becomes_wait() {
    let model = ScriptedModel::raw(vec![
        "I think we should click the button",
        r#"{"thought": "x", "action": {"action": "wait", "seconds": 60}}"#,
        r#"{"thought": "done", "action": {"action": "answer", "content": "fine"}}"#,
    ]);
    let backend = MockBackend::new();
    let mut agent = Agent::new(model, Box::new(backend.clone()), config(10));

    let result = agent.run_task("anything", None, &CancellationToken::new()).await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.final_answer.as_deref(), Some("fine"));
    assert_eq!(result.total_steps, 3);
    // Only the opening restart and navigation touched the page.
    assert_eq!(backend.actions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_history_reaches_next_prompt() {
    let model = ScriptedModel::new(
        vec![
            step("check the top of the page", "logo is blue", json!({"action": "refresh"})),
            answer("blue"),
        ],
        vec![],
    );
    let mut agent = Agent::new(model.clone(), Box::new(MockBackend::new()), config(10));

    agent.run_task("what colour is the logo", None, &CancellationToken::new()).await;

    let prompts = model.navigation_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("No previous actions"));
    assert!(prompts[1].contains("Step 1:"));
    assert!(prompts[1].contains("Thought: check the top of the page"));
    assert!(prompts[1].contains("Action: refresh"));
    assert!(prompts[1].contains("logo is blue"));
}

#[tokio::test(start_paused = true)]
async fn test_each_task_starts_fresh() {
    let model = ScriptedModel::new(
        vec![
            step("scroll", "", json!({"action": "scroll", "direction": "down"})),
            answer("first"),
            answer("second"),
        ],
        vec![],
    );
    let backend = MockBackend::new();
    let mut agent = Agent::new(model.clone(), Box::new(backend.clone()), config(10));
    let cancel = CancellationToken::new();

    let first = agent.run_task("one", None, &cancel).await;
    let second = agent.run_task("two", None, &cancel).await;

    assert_eq!(first.total_steps, 2);
    assert_eq!(second.total_steps, 1);
    assert_eq!(second.final_answer.as_deref(), Some("second"));
    let restarts = backend
        .calls()
        .into_iter()
        .filter(|c| *c == Call::Restart)
        .count();
    assert_eq!(restarts, 2);
    let prompts = model.navigation_prompts.lock().unwrap();
    assert!(prompts[2].contains("No previous actions"));
}

#[tokio::test(start_paused = true)]
async fn test_scroll_cap_resets_for_next_task() {
    let scroll = json!({"action": "scroll", "direction": "down"});
    let model = ScriptedModel::new(
        vec![
            step("more", "", scroll.clone()),
            step("more", "", scroll.clone()),
            step("more", "", scroll.clone()),
            step("more", "", scroll.clone()),
            answer("first"),
            step("more", "", scroll.clone()),
            answer("second"),
        ],
        vec![],
    );
    let backend = MockBackend::new();
    let mut agent = Agent::new(model, Box::new(backend.clone()), config(10));
    let cancel = CancellationToken::new();

    agent.run_task("one", None, &cancel).await;
    let capped = backend
        .actions()
        .into_iter()
        .filter(|c| matches!(c, Call::Scroll(..)))
        .count();
    agent.run_task("two", None, &cancel).await;
    let total = backend
        .actions()
        .into_iter()
        .filter(|c| matches!(c, Call::Scroll(..)))
        .count();

    assert_eq!(capped, 3);
    assert_eq!(total, 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_task_returns_notes() {
    let model = ScriptedModel::new(
        vec![
            step("read it", "opening hours 9-18", json!({"action": "wait", "seconds": 1})),
            answer("unreachable"),
        ],
        vec![],
    );
    let cancel = CancellationToken::new();
    model.cancel_during(1, cancel.clone());
    let backend = MockBackend::new();
    let mut agent = Agent::new(model.clone(), Box::new(backend.clone()), config(10));

    let result = agent.run_task("opening hours", None, &cancel).await;

    assert_eq!(result.status, TaskStatus::Cancelled);
    assert_eq!(result.total_steps, 1);
    assert_eq!(
        result.final_answer.as_deref(),
        Some("Step 1: opening hours 9-18")
    );
    assert_eq!(model.navigation_prompts.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_browser_crash_during_click_aborts() {
    let model = ScriptedModel::new(
        vec![
            step(
                "click it",
                "",
                json!({"action": "click_element", "element": "button", "x": 1, "y": 2}),
            ),
            answer("unreachable"),
        ],
        vec![r#"{"x": 3, "y": 4}"#],
    );
    let backend = MockBackend::crashing("click");
    let mut agent = Agent::new(model.clone(), Box::new(backend.clone()), config(10));

    let result = agent.run_task("press the button", None, &CancellationToken::new()).await;

    assert_eq!(result.status, TaskStatus::Error);
    assert_eq!(result.total_steps, 1);
    assert!(result.message.is_some());
    let screenshots = backend
        .calls()
        .into_iter()
        .filter(|c| *c == Call::Screenshot)
        .count();
    assert_eq!(screenshots, 1);
    assert_eq!(model.navigation_prompts.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pointer_reset_after_failed_write() {
    let model = ScriptedModel::new(
        vec![
            step(
                "search",
                "",
                json!({
                    "action": "write_element_abs",
                    "element": "search field",
                    "content": "rust",
                    "x": 1,
                    "y": 1
                }),
            ),
            answer("done"),
        ],
        vec![r#"{"x": 5, "y": 6}"#],
    );
    let backend = MockBackend::failing("type");
    let mut agent = Agent::new(model, Box::new(backend.clone()), config(10));

    let result = agent.run_task("search for rust", None, &CancellationToken::new()).await;

    assert_eq!(result.status, TaskStatus::Completed);
    let calls = backend.calls();
    let typed = calls
        .iter()
        .position(|c| *c == Call::Type("rust".into()))
        .expect("typing attempted");
    assert_eq!(calls[typed + 1], Call::ResetPointer);
    assert!(!calls.contains(&Call::Key("Enter".into())));
}
