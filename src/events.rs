use serde::Serialize;

/// Progress published while a task runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking { step: usize },
    Step {
        number: usize,
        thought: String,
        description: String,
    },
    StepError { number: usize, message: String },
    TaskComplete { summary: String },
    TaskError { message: String },
    Ready,
}

impl AgentEvent {
    /// Event name used on the wire (SSE `event:` field).
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Thinking { .. } => "thinking",
            AgentEvent::Step { .. } => "step",
            AgentEvent::StepError { .. } => "step_error",
            AgentEvent::TaskComplete { .. } => "task_complete",
            AgentEvent::TaskError { .. } => "task_error",
            AgentEvent::Ready => "ready",
        }
    }
}
