use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{Action, DEFAULT_WAIT_SECS};
use crate::error::SchemaViolation;

/// One decision cycle's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct NavigationStep {
    /// Task-relevant facts read off the last observation. Often empty.
    pub note: String,
    pub thought: String,
    pub action: Action,
}

impl NavigationStep {
    /// The safe step returned whenever the model's output is unusable.
    pub fn fallback(reason: &str) -> Self {
        Self {
            note: String::new(),
            thought: format!("{reason}; waiting before retrying"),
            action: Action::Wait {
                seconds: DEFAULT_WAIT_SECS,
            },
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, SchemaViolation> {
        let object = value
            .as_object()
            .ok_or_else(|| SchemaViolation::new("step", "expected a JSON object"))?;

        let note = match object.get("note") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(note)) => note.clone(),
            Some(_) => return Err(SchemaViolation::new("note", "must be a string")),
        };

        let thought = match object.get("thought") {
            Some(Value::String(thought)) => thought.clone(),
            Some(_) => return Err(SchemaViolation::new("thought", "must be a string")),
            None => return Err(SchemaViolation::new("thought", "missing field")),
        };

        let action = object
            .get("action")
            .ok_or_else(|| SchemaViolation::new("action", "missing field"))?;

        Ok(Self {
            note,
            thought,
            action: Action::from_value(action)?,
        })
    }
}

impl TryFrom<Value> for NavigationStep {
    type Error = SchemaViolation;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

/// Coordinates produced by one localization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickAction {
    pub x: i32,
    pub y: i32,
}

/// A PNG capture of the browser viewport. Cheap to clone.
#[derive(Clone, PartialEq, Eq)]
pub struct Screenshot {
    png: Arc<[u8]>,
}

impl Screenshot {
    pub fn from_png(bytes: Vec<u8>) -> Self {
        Self { png: bytes.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn len(&self) -> usize {
        self.png.len()
    }

    pub fn is_empty(&self) -> bool {
        self.png.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }

    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.to_base64())
    }
}

impl fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Screenshot({} bytes)", self.png.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    MaxStepsReached,
    Error,
    Cancelled,
}

/// What the host gets back from a task. Never a raw error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskResult {
    pub fn completed(answer: impl Into<String>, total_steps: usize) -> Self {
        Self {
            status: TaskStatus::Completed,
            final_answer: Some(answer.into()),
            total_steps,
            message: None,
        }
    }

    pub fn max_steps_reached(notes: impl Into<String>, total_steps: usize) -> Self {
        Self {
            status: TaskStatus::MaxStepsReached,
            final_answer: Some(notes.into()),
            total_steps,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>, total_steps: usize) -> Self {
        Self {
            status: TaskStatus::Error,
            final_answer: None,
            total_steps,
            message: Some(message.into()),
        }
    }

    pub fn cancelled(notes: Option<String>, total_steps: usize) -> Self {
        Self {
            status: TaskStatus::Cancelled,
            final_answer: notes,
            total_steps,
            message: None,
        }
    }
}

/// Decode model output as JSON. The text is tried as-is first, so fences
/// inside string values survive; only then is a code fence stripped.
pub fn decode_json_reply(raw: &str) -> serde_json::Result<Value> {
    serde_json::from_str(raw.trim()).or_else(|_| serde_json::from_str(strip_code_fence(raw)))
}

/// Strip a markdown code fence (```json ... ```) around model output.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    let after = &trimmed[start + 3..];
    // Drop the info string (`json`, `JSON`, ...) up to the first newline.
    let body = match after.find('\n') {
        Some(newline) if after[..newline].chars().all(|c| c.is_ascii_alphanumeric()) => {
            &after[newline + 1..]
        }
        _ => after.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}
