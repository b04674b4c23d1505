//! A screenshot-driven web navigation agent.
//!
//! Each step the [`Agent`] captures the browser, asks a vision-language model
//! ([`VisionModel`]) for one [`Action`], executes it through a
//! [`BrowserBackend`] and records the step in [`AgentMemory`], until the model
//! answers or the step budget is spent.

pub mod action;
pub mod brain;
pub mod browser;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod localizer;
pub mod memory;
pub mod model;
pub mod prompt;
pub mod types;

pub use action::{Action, ScrollDirection};
pub use brain::Brain;
pub use browser::BrowserBackend;
pub use config::{AgentConfig, BrowserConfig, LocalizationMode, ModelConfig};
pub use engine::{Agent, DispatchOutcome, LoopState, TaskState};
pub use error::{
    BackendError, ConfigError, DecisionError, DispatchError, InferenceError, LocalizationError,
    SchemaViolation,
};
pub use events::AgentEvent;
pub use localizer::ElementLocalizer;
pub use memory::AgentMemory;
pub use model::{ChatMessage, ContentPart, Conversation, OpenAiModel, Role, VisionModel};
pub use types::{ClickAction, NavigationStep, Screenshot, TaskResult, TaskStatus};
