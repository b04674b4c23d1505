use crate::prompt::NO_HISTORY;
use crate::types::{NavigationStep, Screenshot};

/// Everything one task has seen and done. Owned by the engine for the
/// lifetime of the task and rebuilt from scratch for the next one.
#[derive(Debug, Clone)]
pub struct AgentMemory {
    task: String,
    pub screenshots: Vec<Screenshot>,
    pub steps: Vec<NavigationStep>,
    pub current_url: String,
    pub step_count: usize,
}

impl AgentMemory {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            screenshots: Vec::new(),
            steps: Vec::new(),
            current_url: String::new(),
            step_count: 0,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Record a fresh observation and advance the step counter.
    pub fn observe(&mut self, screenshot: Screenshot) -> usize {
        self.screenshots.push(screenshot);
        self.step_count += 1;
        self.step_count
    }

    pub fn record(&mut self, step: NavigationStep) {
        self.steps.push(step);
    }

    /// Render the last `window` steps for the prompt.
    ///
    /// Each step shows its 1-based index, thought, action tag and note (if
    /// any). Older steps stay in memory but are never replayed.
    pub fn recent_history(&self, window: usize) -> String {
        if self.steps.is_empty() || window == 0 {
            return NO_HISTORY.to_string();
        }

        let start = self.steps.len().saturating_sub(window);
        let mut lines = Vec::new();
        for (offset, step) in self.steps[start..].iter().enumerate() {
            lines.push(format!("Step {}:", start + offset + 1));
            lines.push(format!("Thought: {}", step.thought));
            lines.push(format!("Action: {}", step.action.tag()));
            if !step.note.trim().is_empty() {
                lines.push(format!("Notes: {}", step.note.trim()));
            }
            lines.push("---".to_string());
        }
        lines.join("\n")
    }

    /// Every non-empty note so far, one `Step N: ...` line each.
    pub fn notes(&self) -> String {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, step)| !step.note.trim().is_empty())
            .map(|(i, step)| format!("Step {}: {}", i + 1, step.note.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
