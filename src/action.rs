//! The closed action vocabulary the navigation model may emit.
//!
//! Payloads are parsed once, at the model boundary, into [`Action`]. Nothing
//! downstream ever looks at raw JSON again.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaViolation;

pub const WAIT_MAX_SECS: u64 = 10;
pub const DEFAULT_WAIT_SECS: u64 = 2;

/// Every tag the vocabulary accepts, in schema order.
pub const ACTION_TAGS: [&str; 8] = [
    "click_element",
    "write_element_abs",
    "scroll",
    "go_back",
    "refresh",
    "goto",
    "wait",
    "answer",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// Pixel offset `(dx, dy)` for a scroll of `pixels` in this direction.
    pub fn delta(self, pixels: i64) -> (i64, i64) {
        match self {
            ScrollDirection::Up => (0, -pixels),
            ScrollDirection::Down => (0, pixels),
            ScrollDirection::Left => (-pixels, 0),
            ScrollDirection::Right => (pixels, 0),
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        };
        f.write_str(name)
    }
}

/// A single UI action chosen by the model.
///
/// Deserializing goes through [`Action::validate`], so a decoded value is
/// always within range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", try_from = "RawAction")]
pub enum Action {
    /// Click a described element; `x`/`y` are absolute pixels from the top-left.
    ClickElement { element: String, x: i32, y: i32 },
    /// Focus a described element, type `content`, then commit with Enter.
    WriteElementAbs {
        element: String,
        content: String,
        x: i32,
        y: i32,
    },
    Scroll { direction: ScrollDirection },
    GoBack,
    Refresh,
    Goto { url: String },
    Wait { seconds: u64 },
    /// Terminal: ends the task with `content` as the answer.
    Answer { content: String },
}

fn default_wait_seconds() -> u64 {
    DEFAULT_WAIT_SECS
}

/// Wire shape of [`Action`] before range and format checks.
#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RawAction {
    ClickElement {
        element: String,
        x: i32,
        y: i32,
    },
    WriteElementAbs {
        element: String,
        content: String,
        x: i32,
        y: i32,
    },
    Scroll {
        direction: ScrollDirection,
    },
    GoBack,
    Refresh,
    Goto {
        url: String,
    },
    Wait {
        #[serde(default = "default_wait_seconds")]
        seconds: u64,
    },
    Answer {
        content: String,
    },
}

impl TryFrom<RawAction> for Action {
    type Error = SchemaViolation;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let action = match raw {
            RawAction::ClickElement { element, x, y } => Action::ClickElement { element, x, y },
            RawAction::WriteElementAbs {
                element,
                content,
                x,
                y,
            } => Action::WriteElementAbs {
                element,
                content,
                x,
                y,
            },
            RawAction::Scroll { direction } => Action::Scroll { direction },
            RawAction::GoBack => Action::GoBack,
            RawAction::Refresh => Action::Refresh,
            RawAction::Goto { url } => Action::Goto { url },
            RawAction::Wait { seconds } => Action::Wait { seconds },
            RawAction::Answer { content } => Action::Answer { content },
        };
        action.validate()?;
        Ok(action)
    }
}

impl Action {
    pub fn tag(&self) -> &'static str {
        match self {
            Action::ClickElement { .. } => "click_element",
            Action::WriteElementAbs { .. } => "write_element_abs",
            Action::Scroll { .. } => "scroll",
            Action::GoBack => "go_back",
            Action::Refresh => "refresh",
            Action::Goto { .. } => "goto",
            Action::Wait { .. } => "wait",
            Action::Answer { .. } => "answer",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Answer { .. })
    }

    /// Parse a candidate payload into exactly one validated variant.
    pub fn from_value(value: &Value) -> Result<Self, SchemaViolation> {
        let object = value
            .as_object()
            .ok_or_else(|| SchemaViolation::new("action", "expected a JSON object"))?;

        let tag = match object.get("action") {
            Some(Value::String(tag)) => tag.as_str(),
            Some(other) => {
                return Err(SchemaViolation::new(
                    "action",
                    format!("tag must be a string, got {other}"),
                ));
            }
            None => return Err(SchemaViolation::new("action", "missing action tag")),
        };

        if !ACTION_TAGS.contains(&tag) {
            return Err(SchemaViolation::new(
                "action",
                format!("unknown action `{tag}`"),
            ));
        }

        let raw: RawAction = serde_json::from_value(value.clone())
            .map_err(|e| SchemaViolation::new(tag, e.to_string()))?;
        Action::try_from(raw)
    }

    /// Range and format rules serde cannot express.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        match self {
            Action::Wait { seconds } if *seconds > WAIT_MAX_SECS => Err(SchemaViolation::new(
                "seconds",
                format!("{seconds} is outside 0..={WAIT_MAX_SECS}"),
            )),
            Action::Goto { url } if !has_http_scheme(url) => Err(SchemaViolation::new(
                "url",
                format!("{url:?} must start with http:// or https://"),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::ClickElement { element, x, y } => {
                write!(f, "click '{element}' near ({x}, {y})")
            }
            Action::WriteElementAbs {
                element,
                content,
                x,
                y,
            } => write!(f, "write '{content}' into '{element}' near ({x}, {y})"),
            Action::Scroll { direction } => write!(f, "scroll {direction}"),
            Action::GoBack => f.write_str("go back"),
            Action::Refresh => f.write_str("refresh"),
            Action::Goto { url } => write!(f, "goto {url}"),
            Action::Wait { seconds } => write!(f, "wait {seconds}s"),
            Action::Answer { content } => write!(f, "answer: {content}"),
        }
    }
}

pub fn has_http_scheme(url: &str) -> bool {
    let url = url.trim_start();
    url.starts_with("http://") || url.starts_with("https://")
}

/// Prefix `https://` when the scheme is missing.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}
