//! The navigation decider: one screenshot in, one validated step out.

use std::sync::Arc;

use chrono::Local;
use serde_json::Value;
use tracing::{debug, warn};

use crate::action::{has_http_scheme, normalize_url};
use crate::config::AgentConfig;
use crate::error::{DecisionError, SchemaViolation};
use crate::memory::AgentMemory;
use crate::model::{Conversation, VisionModel};
use crate::prompt::{NavigationContext, navigation_conversation};
use crate::types::{NavigationStep, Screenshot, decode_json_reply};

pub struct Brain {
    model: Arc<dyn VisionModel>,
    max_tokens: u32,
    history_window: usize,
    scroll_cap: u32,
}

impl Brain {
    pub fn new(model: Arc<dyn VisionModel>, config: &AgentConfig) -> Self {
        Self {
            model,
            max_tokens: config.navigation_max_tokens,
            history_window: config.history_window,
            scroll_cap: config.scroll_cap,
        }
    }

    /// The prompt for the current step of `memory`.
    pub fn conversation(&self, task: &str, memory: &AgentMemory, timestamp: &str) -> Conversation {
        let history = memory.recent_history(self.history_window);
        let notes = memory.notes();
        navigation_conversation(&NavigationContext {
            task,
            step: memory.step_count,
            history: &history,
            notes: &notes,
            timestamp,
            scroll_cap: self.scroll_cap,
        })
    }

    /// Ask the model for the next step. Never fails: unusable output or a
    /// failed model call yields [`NavigationStep::fallback`].
    pub async fn decide_next_action(
        &self,
        task: &str,
        screenshot: &Screenshot,
        memory: &AgentMemory,
    ) -> NavigationStep {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        match self.try_decide(task, screenshot, memory, &timestamp).await {
            Ok(step) => step,
            Err(e) => {
                warn!(
                    step = memory.step_count,
                    error = %e,
                    "no usable step from model, falling back to wait"
                );
                NavigationStep::fallback(&format!("Could not use the model reply ({e})"))
            }
        }
    }

    async fn try_decide(
        &self,
        task: &str,
        screenshot: &Screenshot,
        memory: &AgentMemory,
        timestamp: &str,
    ) -> Result<NavigationStep, DecisionError> {
        let conversation = self.conversation(task, memory, timestamp);
        let raw = self
            .model
            .infer(&conversation, screenshot, self.max_tokens)
            .await?;
        debug!(step = memory.step_count, response = %raw, "navigation reply");
        Ok(parse_step(&raw)?)
    }
}

/// Parse a model reply into a step. Scheme-less `goto` URLs are given
/// `https://` before validation.
pub fn parse_step(raw: &str) -> Result<NavigationStep, SchemaViolation> {
    let mut value = decode_json_reply(raw)
        .map_err(|e| SchemaViolation::new("response", format!("invalid JSON: {e}")))?;
    normalize_goto(&mut value);
    NavigationStep::from_value(&value)
}

fn normalize_goto(value: &mut Value) {
    let Some(action) = value.get_mut("action").and_then(Value::as_object_mut) else {
        return;
    };
    if action.get("action").and_then(Value::as_str) != Some("goto") {
        return;
    }
    if let Some(Value::String(url)) = action.get_mut("url") {
        if !url.trim().is_empty() && !has_http_scheme(url) {
            *url = normalize_url(url);
        }
    }
}
