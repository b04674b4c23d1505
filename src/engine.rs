//! The control loop: screenshot -> decide -> dispatch -> record, one step at
//! a time, until the model answers, the budget runs out, the host cancels or
//! the browser dies.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::action::{Action, normalize_url};
use crate::brain::Brain;
use crate::browser::BrowserBackend;
use crate::config::AgentConfig;
use crate::error::{BackendError, DispatchError};
use crate::events::AgentEvent;
use crate::localizer::ElementLocalizer;
use crate::memory::AgentMemory;
use crate::model::VisionModel;
use crate::types::{ClickAction, Screenshot, TaskResult};

/// Where a task's loop currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Running(usize),
    /// The last dispatch failed but the session is fine; keep going.
    StepError(usize),
    Completed(String),
    MaxStepsReached,
    Aborted(String),
    Cancelled,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopState::Completed(_)
                | LoopState::MaxStepsReached
                | LoopState::Aborted(_)
                | LoopState::Cancelled
        )
    }
}

/// What a dispatched action did to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Performed(String),
    /// Accepted but intentionally not executed (e.g. over the scroll cap).
    Skipped(String),
}

impl DispatchOutcome {
    pub fn message(&self) -> &str {
        match self {
            DispatchOutcome::Performed(message) | DispatchOutcome::Skipped(message) => message,
        }
    }
}

/// Per-task mutable state. Rebuilt at the start of every task.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub memory: AgentMemory,
    pub scroll_count: u32,
}

impl TaskState {
    pub fn new(task: &str) -> Self {
        Self {
            memory: AgentMemory::new(task),
            scroll_count: 0,
        }
    }
}

/// Runs tasks against one browser session, strictly one at a time.
pub struct Agent {
    backend: Box<dyn BrowserBackend>,
    brain: Brain,
    localizer: ElementLocalizer,
    config: AgentConfig,
    events: Option<broadcast::Sender<AgentEvent>>,
}

impl Agent {
    pub fn new(
        model: Arc<dyn VisionModel>,
        backend: Box<dyn BrowserBackend>,
        config: AgentConfig,
    ) -> Self {
        let brain = Brain::new(model.clone(), &config);
        let localizer = ElementLocalizer::new(
            model,
            config.localization_mode,
            config.localization_max_tokens,
        );
        Self {
            backend,
            brain,
            localizer,
            config,
            events: None,
        }
    }

    /// Publish progress on `events` while tasks run.
    pub fn with_events(mut self, events: broadcast::Sender<AgentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run `task` to a terminal state. `starting_url` overrides the
    /// configured one. Cancellation is honoured between steps.
    pub async fn run_task(
        &mut self,
        task: &str,
        starting_url: Option<&str>,
        cancel: &CancellationToken,
    ) -> TaskResult {
        let mut run = TaskState::new(task);
        let start = normalize_url(starting_url.unwrap_or(&self.config.starting_url));
        info!(task, url = %start, max_steps = self.config.max_steps, "starting task");

        let mut state = match self.open(&start, &mut run).await {
            Ok(()) => LoopState::Running(0),
            Err(e) => LoopState::Aborted(e.to_string()),
        };

        while !state.is_terminal() {
            state = self.advance(&mut run, cancel).await;
            debug!(?state, "loop transition");
        }

        let result = self.finish(state, &run);
        self.emit(AgentEvent::Ready);
        result
    }

    async fn open(&mut self, url: &str, run: &mut TaskState) -> Result<(), BackendError> {
        // A fresh page per task; a failure here only costs us the old tab.
        if let Err(e) = self.backend.restart().await {
            if e.is_fatal() {
                error!(error = %e, "browser unusable at task start");
                return Err(e);
            }
            warn!(error = %e, "could not open a fresh page, reusing the current one");
        }

        let navigated = async {
            self.backend.goto(url).await?;
            self.backend.wait_for_load().await
        }
        .await;
        match navigated {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                error!(error = %e, "browser unusable at task start");
                return Err(e);
            }
            Err(e) => warn!(url, error = %e, "starting page did not load cleanly"),
        }

        run.memory.current_url = url.to_string();
        Ok(())
    }

    /// One transition out of `Running`/`StepError`.
    async fn advance(&mut self, run: &mut TaskState, cancel: &CancellationToken) -> LoopState {
        if cancel.is_cancelled() {
            info!(step = run.memory.step_count, "task cancelled");
            return LoopState::Cancelled;
        }
        if run.memory.step_count >= self.config.max_steps {
            warn!(max_steps = self.config.max_steps, "step limit reached");
            return LoopState::MaxStepsReached;
        }

        let screenshot = match self.backend.screenshot().await {
            Ok(screenshot) => screenshot,
            Err(e) => {
                error!(error = %e, "screenshot failed, aborting task");
                return LoopState::Aborted(e.to_string());
            }
        };
        let number = run.memory.observe(screenshot.clone());
        if let Some(dir) = &self.config.screenshot_dir {
            save_screenshot(dir, number, &screenshot).await;
        }

        self.emit(AgentEvent::Thinking { step: number });
        let step = self
            .brain
            .decide_next_action(run.memory.task(), &screenshot, &run.memory)
            .await;
        info!(step = number, action = %step.action, thought = %step.thought, "model decided");

        if let Action::Answer { content } = &step.action {
            return LoopState::Completed(content.clone());
        }

        self.emit(AgentEvent::Step {
            number,
            thought: step.thought.clone(),
            description: step.action.to_string(),
        });

        let dispatched = self.dispatch(&step.action, &screenshot, run).await;
        run.memory.record(step);

        let next = match dispatched {
            Ok(outcome) => {
                info!(step = number, result = outcome.message(), "step done");
                LoopState::Running(number)
            }
            Err(e) if e.is_fatal() => {
                error!(step = number, error = %e, "browser unusable, aborting task");
                return LoopState::Aborted(e.to_string());
            }
            Err(e) => {
                warn!(step = number, error = %e, "step failed, continuing");
                self.emit(AgentEvent::StepError {
                    number,
                    message: e.to_string(),
                });
                LoopState::StepError(number)
            }
        };

        if let Err(e) = self.settle(run).await {
            error!(step = number, error = %e, "browser unusable, aborting task");
            return LoopState::Aborted(e.to_string());
        }
        next
    }

    /// Refresh the URL and give the page time to react to the last action.
    async fn settle(&mut self, run: &mut TaskState) -> Result<(), BackendError> {
        match self.backend.current_url().await {
            Ok(url) => run.memory.current_url = url,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(error = %e, "could not read current URL"),
        }
        tokio::time::sleep(self.config.settle_delay).await;
        Ok(())
    }

    /// Execute one non-terminal action against the browser.
    pub async fn dispatch(
        &mut self,
        action: &Action,
        screenshot: &Screenshot,
        run: &mut TaskState,
    ) -> Result<DispatchOutcome, DispatchError> {
        match action {
            Action::ClickElement { element, x, y } => {
                let target = locate(
                    &self.localizer,
                    self.config.fallback_to_hint,
                    screenshot,
                    element,
                    *x,
                    *y,
                )
                .await?;
                let clicked = self.backend.click(target.x, target.y).await;
                let reset = self.backend.reset_pointer().await;
                clicked?;
                reset?;
                Ok(DispatchOutcome::Performed(format!(
                    "Clicked '{element}' at ({}, {})",
                    target.x, target.y
                )))
            }
            Action::WriteElementAbs {
                element,
                content,
                x,
                y,
            } => {
                let target = locate(
                    &self.localizer,
                    self.config.fallback_to_hint,
                    screenshot,
                    element,
                    *x,
                    *y,
                )
                .await?;
                let focus_delay = self.config.focus_delay;
                let backend = &mut self.backend;
                let written = async {
                    backend.click(target.x, target.y).await?;
                    // Focus handlers often run asynchronously.
                    tokio::time::sleep(focus_delay).await;
                    backend.type_text(content).await?;
                    backend.press_key("Enter").await
                }
                .await;
                let reset = self.backend.reset_pointer().await;
                written?;
                reset?;
                Ok(DispatchOutcome::Performed(format!(
                    "Wrote '{content}' in '{element}' at ({}, {})",
                    target.x, target.y
                )))
            }
            Action::Scroll { direction } => {
                run.scroll_count += 1;
                if run.scroll_count > self.config.scroll_cap {
                    return Ok(DispatchOutcome::Skipped(format!(
                        "Scroll limit of {} reached, skipping scroll {direction}",
                        self.config.scroll_cap
                    )));
                }
                let (dx, dy) = direction.delta(self.config.scroll_pixels);
                self.backend.scroll(dx, dy).await?;
                Ok(DispatchOutcome::Performed(format!("Scrolled {direction}")))
            }
            Action::GoBack => {
                self.backend.go_back().await?;
                self.backend.wait_for_load().await?;
                Ok(DispatchOutcome::Performed("Navigated back".to_string()))
            }
            Action::Refresh => {
                self.backend.refresh().await?;
                self.backend.wait_for_load().await?;
                Ok(DispatchOutcome::Performed("Refreshed page".to_string()))
            }
            Action::Goto { url } => {
                let url = normalize_url(url);
                self.backend.goto(&url).await?;
                self.backend.wait_for_load().await?;
                Ok(DispatchOutcome::Performed(format!("Navigated to {url}")))
            }
            Action::Wait { seconds } => {
                tokio::time::sleep(Duration::from_secs(*seconds)).await;
                Ok(DispatchOutcome::Performed(format!("Waited {seconds} seconds")))
            }
            Action::Answer { .. } => Err(DispatchError::TerminalAction),
        }
    }

    fn finish(&self, state: LoopState, run: &TaskState) -> TaskResult {
        let steps = run.memory.step_count;
        let notes = run.memory.notes();
        match state {
            LoopState::Completed(answer) => {
                info!(steps, answer = %answer, "task complete");
                self.emit(AgentEvent::TaskComplete {
                    summary: answer.clone(),
                });
                TaskResult::completed(answer, steps)
            }
            LoopState::MaxStepsReached => {
                self.emit(AgentEvent::TaskError {
                    message: format!("Reached maximum step limit ({})", self.config.max_steps),
                });
                TaskResult::max_steps_reached(notes, steps)
            }
            LoopState::Aborted(message) => {
                self.emit(AgentEvent::TaskError {
                    message: message.clone(),
                });
                TaskResult::error(message, steps)
            }
            LoopState::Cancelled => {
                self.emit(AgentEvent::TaskError {
                    message: "Task cancelled".to_string(),
                });
                TaskResult::cancelled((!notes.is_empty()).then_some(notes), steps)
            }
            LoopState::Running(_) | LoopState::StepError(_) => {
                TaskResult::error("task loop stopped before a terminal state", steps)
            }
        }
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Localize `element`; the step's own coordinates are the fallback.
async fn locate(
    localizer: &ElementLocalizer,
    fallback_to_hint: bool,
    screenshot: &Screenshot,
    element: &str,
    hint_x: i32,
    hint_y: i32,
) -> Result<ClickAction, DispatchError> {
    match localizer.localize(screenshot, element).await {
        Ok(click) => Ok(click),
        Err(e) if fallback_to_hint => {
            warn!(
                element,
                error = %e,
                x = hint_x,
                y = hint_y,
                "localization failed, using the step's coordinates"
            );
            Ok(ClickAction {
                x: hint_x,
                y: hint_y,
            })
        }
        Err(e) => Err(e.into()),
    }
}

async fn save_screenshot(dir: &Path, number: usize, screenshot: &Screenshot) {
    let path = dir.join(format!("step-{number:03}.png"));
    let written = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, screenshot.as_bytes()).await
    }
    .await;
    if let Err(e) = written {
        warn!(path = %path.display(), error = %e, "could not save screenshot");
    }
}
