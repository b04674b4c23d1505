//! Element localization: natural-language description + screenshot -> pixels.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::LocalizationMode;
use crate::error::LocalizationError;
use crate::model::VisionModel;
use crate::prompt::localization_conversation;
use crate::types::{ClickAction, Screenshot, decode_json_reply};

static COORDINATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""x"\s*:\s*(\d+)\s*,\s*"y"\s*:\s*(\d+)"#).expect("coordinate pattern is valid")
});

pub struct ElementLocalizer {
    model: Arc<dyn VisionModel>,
    mode: LocalizationMode,
    max_tokens: u32,
}

impl ElementLocalizer {
    pub fn new(model: Arc<dyn VisionModel>, mode: LocalizationMode, max_tokens: u32) -> Self {
        Self {
            model,
            mode,
            max_tokens,
        }
    }

    pub fn mode(&self) -> LocalizationMode {
        self.mode
    }

    /// Resolve `description` to a click position on `screenshot`.
    ///
    /// Coordinates are not checked against the viewport.
    pub async fn localize(
        &self,
        screenshot: &Screenshot,
        description: &str,
    ) -> Result<ClickAction, LocalizationError> {
        let conversation = localization_conversation(description, self.mode);
        let raw = self
            .model
            .infer(&conversation, screenshot, self.max_tokens)
            .await?;

        let click = match self.mode {
            LocalizationMode::Structured => parse_structured(&raw),
            LocalizationMode::Textual => parse_click_call(&raw),
        }?;

        debug!(element = description, x = click.x, y = click.y, "localized element");
        Ok(click)
    }
}

/// Strict JSON first, then a pattern search for `"x": N, "y": N` anywhere.
pub fn parse_structured(raw: &str) -> Result<ClickAction, LocalizationError> {
    if let Ok(value) = decode_json_reply(raw) {
        if let Some(click) = coordinates_from_value(&value) {
            return Ok(click);
        }
    }

    warn!(response = raw, "localization reply is not a coordinate object, trying pattern");
    coordinates_from_pattern(raw).ok_or_else(|| LocalizationError::Parse {
        raw: raw.to_string(),
    })
}

/// Parse a `Click(x, y)` reply.
pub fn parse_click_call(raw: &str) -> Result<ClickAction, LocalizationError> {
    let parse_error = || LocalizationError::Parse {
        raw: raw.to_string(),
    };

    let (_, rest) = raw.split_once("Click(").ok_or_else(parse_error)?;
    let (inner, _) = rest.split_once(')').ok_or_else(parse_error)?;
    let (x, y) = inner.split_once(',').ok_or_else(parse_error)?;

    let x = x.trim().parse().map_err(|_| parse_error())?;
    let y = y.trim().parse().map_err(|_| parse_error())?;
    Ok(ClickAction { x, y })
}

fn coordinates_from_value(value: &Value) -> Option<ClickAction> {
    let axis = |key: &str| -> Option<i32> {
        let number = value.get(key)?;
        let n = number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f.round() as i64))?;
        i32::try_from(n).ok()
    };
    Some(ClickAction {
        x: axis("x")?,
        y: axis("y")?,
    })
}

fn coordinates_from_pattern(raw: &str) -> Option<ClickAction> {
    let captures = COORDINATE_PATTERN.captures(raw)?;
    Some(ClickAction {
        x: captures[1].parse().ok()?,
        y: captures[2].parse().ok()?,
    })
}
