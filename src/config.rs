//! Runtime configuration, read from the environment (after `.env` is loaded).
//!
//! Every struct has a `Default` and a `from_env()` constructor. `from_lookup`
//! takes the variable source as a closure so tests never touch the process
//! environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalizationMode {
    /// Ask for `{"x": .., "y": ..}`, fall back to a regex over the raw text.
    Structured,
    /// Ask for `Click(x, y)`.
    Textual,
}

impl FromStr for LocalizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" | "json" => Ok(Self::Structured),
            "textual" | "text" => Ok(Self::Textual),
            other => Err(format!("expected `structured` or `textual`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_steps: usize,
    /// How many recent steps are replayed to the model each turn.
    pub history_window: usize,
    /// Scrolls allowed per task before further scrolls become no-ops.
    pub scroll_cap: u32,
    pub scroll_pixels: i64,
    /// Pause after every dispatched action.
    pub settle_delay: Duration,
    /// Pause between focusing a field and typing into it.
    pub focus_delay: Duration,
    pub navigation_max_tokens: u32,
    pub localization_max_tokens: u32,
    pub localization_mode: LocalizationMode,
    /// Use the model-supplied coordinates when localization fails.
    pub fallback_to_hint: bool,
    pub starting_url: String,
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            history_window: 3,
            scroll_cap: 3,
            scroll_pixels: 500,
            settle_delay: Duration::from_millis(1000),
            focus_delay: Duration::from_millis(500),
            navigation_max_tokens: 512,
            localization_max_tokens: 128,
            localization_mode: LocalizationMode::Structured,
            fallback_to_hint: true,
            starting_url: "https://www.google.com".to_string(),
            screenshot_dir: None,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_steps: parse_or(&lookup, "NAVIGATOR_MAX_STEPS", defaults.max_steps)?,
            history_window: parse_or(&lookup, "NAVIGATOR_HISTORY_WINDOW", defaults.history_window)?,
            scroll_cap: parse_or(&lookup, "NAVIGATOR_SCROLL_CAP", defaults.scroll_cap)?,
            scroll_pixels: parse_or(&lookup, "NAVIGATOR_SCROLL_PIXELS", defaults.scroll_pixels)?,
            settle_delay: millis_or(&lookup, "NAVIGATOR_SETTLE_DELAY_MS", defaults.settle_delay)?,
            focus_delay: millis_or(&lookup, "NAVIGATOR_FOCUS_DELAY_MS", defaults.focus_delay)?,
            navigation_max_tokens: parse_or(
                &lookup,
                "NAVIGATOR_NAVIGATION_MAX_TOKENS",
                defaults.navigation_max_tokens,
            )?,
            localization_max_tokens: parse_or(
                &lookup,
                "NAVIGATOR_LOCALIZATION_MAX_TOKENS",
                defaults.localization_max_tokens,
            )?,
            localization_mode: parse_or(
                &lookup,
                "NAVIGATOR_LOCALIZATION_MODE",
                defaults.localization_mode,
            )?,
            fallback_to_hint: bool_or(
                &lookup,
                "NAVIGATOR_FALLBACK_TO_HINT",
                defaults.fallback_to_hint,
            )?,
            starting_url: lookup("NAVIGATOR_STARTING_URL").unwrap_or(defaults.starting_url),
            screenshot_dir: lookup("NAVIGATOR_SCREENSHOT_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Full URL of an OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            timeout: Duration::from_secs(120),
        }
    }
}

impl ModelConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            endpoint: lookup("NAVIGATOR_MODEL_ENDPOINT").unwrap_or(defaults.endpoint),
            api_key: lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty()),
            model: lookup("NAVIGATOR_MODEL").unwrap_or(defaults.model),
            temperature: parse_or(&lookup, "NAVIGATOR_TEMPERATURE", defaults.temperature)?,
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "NAVIGATOR_MODEL_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    /// DevTools endpoint of an already running Chrome to attach to.
    pub attach_url: Option<String>,
    pub window_size: (u32, u32),
    pub profile_dir: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            attach_url: None,
            window_size: (1280, 720),
            profile_dir: None,
        }
    }
}

impl BrowserConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            headless: bool_or(&lookup, "NAVIGATOR_HEADLESS", defaults.headless)?,
            chrome_path: lookup("NAVIGATOR_CHROME_PATH").map(PathBuf::from),
            attach_url: lookup("NAVIGATOR_ATTACH_URL").filter(|url| !url.trim().is_empty()),
            window_size: (
                parse_or(&lookup, "NAVIGATOR_WINDOW_WIDTH", defaults.window_size.0)?,
                parse_or(&lookup, "NAVIGATOR_WINDOW_HEIGHT", defaults.window_size.1)?,
            ),
            profile_dir: lookup("NAVIGATOR_PROFILE_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let millis = parse_or(lookup, key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

fn bool_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            key: key.to_string(),
            value: raw,
            reason: "expected a boolean".to_string(),
        }),
    }
}
