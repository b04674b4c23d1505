use thiserror::Error;

/// A model payload that does not fit the action vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema violation at `{field}`: {reason}")]
pub struct SchemaViolation {
    pub field: String,
    pub reason: String,
}

impl SchemaViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("model returned no content")]
    EmptyResponse,

    #[error("model call failed: {0}")]
    Other(String),
}

/// Why the decider fell back to its safe step.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Schema(#[from] SchemaViolation),
}

#[derive(Debug, Error)]
pub enum LocalizationError {
    /// Neither the structured decode nor the fallback pattern produced coordinates.
    #[error("could not extract coordinates from model response: {raw:?}")]
    Parse { raw: String },

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The action failed but the session is still usable.
    #[error("browser {operation} failed: {message}")]
    Action {
        operation: &'static str,
        message: String,
    },

    /// The session is gone (crashed, disconnected, worker died).
    #[error("browser session unusable: {message}")]
    Fatal { message: String },
}

impl BackendError {
    pub fn action(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Action {
            operation,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("localization failed: {0}")]
    Localization(#[from] LocalizationError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("answer actions end the task and are never dispatched")]
    TerminalAction,
}

impl DispatchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_fatal())
    }
}

#[derive(Debug, Error)]
#[error("invalid value for {key}: {value:?} ({reason})")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}
