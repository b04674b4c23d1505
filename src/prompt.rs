//! Prompt construction. Everything here is a pure function of its inputs so
//! prompts can be checked without a model or a browser.

use serde_json::{Value, json};

use crate::action::WAIT_MAX_SECS;
use crate::config::LocalizationMode;
use crate::model::{ChatMessage, ContentPart, Conversation};

/// Rendered when the agent has not executed any step yet.
pub const NO_HISTORY: &str = "No previous actions";

const NAVIGATION_GUIDELINES: &str = r#"You are an agent browsing the web the way a person would, one action at a time, to complete a task.
Each turn you receive the task, a short history of your recent steps, the notes gathered so far and a screenshot of the browser.
Study the screenshot, reason briefly in `thought`, record any facts that help answer the task in `note`, then pick exactly one action.

Guidelines:
- If a cookie banner is shown, accept all cookies first.
- Put every piece of task-relevant information you can read on the screen into `note`. Leave `note` empty when there is nothing new.
- To type into a field, use write_element_abs directly. Do not click the field first.
- Describe the target element precisely in `element`, including the text it already contains and its kind (button, link, text field).
- Prefer links and buttons that jump straight to the information (e.g. "jump to", "go to", a search box) over scrolling.
- Do not scroll more than {scroll_cap} times in a task, and never scroll at the end of a page.
- Never log in and never enter an email address or password. If a page demands it, go back.
- Only refresh when the site reports a rate limit.
- `wait` accepts 0 to {wait_max} seconds.
- As soon as the screenshot and your notes are enough to answer, use the answer action with a complete, detailed answer.

The current date is {timestamp}.

Reply with a single JSON object and nothing else, matching this schema:
{schema}"#;

const LOCALIZATION_STRUCTURED: &str = "Localize an element on the GUI image according to my instructions and output a click position. You must output a valid JSON object with integer fields \"x\" (pixels from the left edge) and \"y\" (pixels from the top edge).";

const LOCALIZATION_TEXTUAL: &str = "Localize an element on the GUI image according to my instructions and output a click position as Click(x, y) with x num pixels from the left edge and y num pixels from the top edge.";

/// Inputs of one navigation prompt.
#[derive(Debug, Clone)]
pub struct NavigationContext<'a> {
    pub task: &'a str,
    pub step: usize,
    /// Condensed recent history, see `AgentMemory::recent_history`.
    pub history: &'a str,
    pub notes: &'a str,
    pub timestamp: &'a str,
    pub scroll_cap: u32,
}

/// JSON schema of a `NavigationStep`, embedded in the system turn.
pub fn navigation_step_schema() -> Value {
    let coordinate = |axis: &str, edge: &str| {
        json!({
            "type": "integer",
            "description": format!("The {axis} coordinate, number of pixels from the {edge} edge.")
        })
    };

    json!({
        "title": "NavigationStep",
        "type": "object",
        "required": ["thought", "action"],
        "properties": {
            "note": {
                "type": "string",
                "default": "",
                "description": "Task-relevant information extracted from the current observation. Empty if nothing new."
            },
            "thought": {
                "type": "string",
                "description": "Reasoning about the next step, under four lines."
            },
            "action": {
                "oneOf": [
                    {
                        "type": "object",
                        "description": "Click a web element identified by its description.",
                        "required": ["action", "element", "x", "y"],
                        "properties": {
                            "action": {"const": "click_element"},
                            "element": {"type": "string", "description": "Text description of the element."},
                            "x": coordinate("x", "left"),
                            "y": coordinate("y", "top")
                        }
                    },
                    {
                        "type": "object",
                        "description": "Write content into a web element, then press Enter.",
                        "required": ["action", "element", "content", "x", "y"],
                        "properties": {
                            "action": {"const": "write_element_abs"},
                            "element": {"type": "string", "description": "Text description of the element."},
                            "content": {"type": "string", "description": "Content to write."},
                            "x": coordinate("x", "left"),
                            "y": coordinate("y", "top")
                        }
                    },
                    {
                        "type": "object",
                        "description": "Scroll the page.",
                        "required": ["action", "direction"],
                        "properties": {
                            "action": {"const": "scroll"},
                            "direction": {"enum": ["up", "down", "left", "right"]}
                        }
                    },
                    {
                        "type": "object",
                        "description": "Navigate to the previous page.",
                        "required": ["action"],
                        "properties": {"action": {"const": "go_back"}}
                    },
                    {
                        "type": "object",
                        "description": "Refresh the current page.",
                        "required": ["action"],
                        "properties": {"action": {"const": "refresh"}}
                    },
                    {
                        "type": "object",
                        "description": "Go to a URL.",
                        "required": ["action", "url"],
                        "properties": {
                            "action": {"const": "goto"},
                            "url": {"type": "string", "description": "A URL starting with http:// or https://."}
                        }
                    },
                    {
                        "type": "object",
                        "description": "Wait for the page to settle.",
                        "required": ["action"],
                        "properties": {
                            "action": {"const": "wait"},
                            "seconds": {"type": "integer", "minimum": 0, "maximum": WAIT_MAX_SECS, "default": 2}
                        }
                    },
                    {
                        "type": "object",
                        "description": "Return the final answer. This ends the task.",
                        "required": ["action", "content"],
                        "properties": {
                            "action": {"const": "answer"},
                            "content": {"type": "string", "description": "The answer."}
                        }
                    }
                ]
            }
        }
    })
}

/// JSON schema of the localization answer.
pub fn click_schema() -> Value {
    json!({
        "title": "ClickAction",
        "description": "Click at specific coordinates on the screen.",
        "type": "object",
        "required": ["x", "y"],
        "properties": {
            "x": {"type": "integer", "description": "The x coordinate, number of pixels from the left edge."},
            "y": {"type": "integer", "description": "The y coordinate, number of pixels from the top edge."}
        }
    })
}

pub fn navigation_system_prompt(timestamp: &str, scroll_cap: u32) -> String {
    let schema = serde_json::to_string_pretty(&navigation_step_schema()).unwrap_or_default();
    NAVIGATION_GUIDELINES
        .replace("{scroll_cap}", &scroll_cap.to_string())
        .replace("{wait_max}", &WAIT_MAX_SECS.to_string())
        .replace("{timestamp}", timestamp)
        .replace("{schema}", &schema)
}

pub fn navigation_conversation(ctx: &NavigationContext<'_>) -> Conversation {
    let mut observation = vec![
        ContentPart::Text(format!("<task>\n{}\n</task>\n", ctx.task)),
        ContentPart::Text(format!("<observation step={}>\n", ctx.step)),
        ContentPart::Text(format!("<history>\n{}\n</history>\n", ctx.history)),
    ];
    if !ctx.notes.trim().is_empty() {
        observation.push(ContentPart::Text(format!("<notes>\n{}\n</notes>\n", ctx.notes.trim())));
    }
    observation.extend([
        ContentPart::Text("<screenshot>\n".to_string()),
        ContentPart::Image,
        ContentPart::Text("\n</screenshot>\n</observation>\n".to_string()),
    ]);

    Conversation::new(vec![
        ChatMessage::system(navigation_system_prompt(ctx.timestamp, ctx.scroll_cap)),
        ChatMessage::user(observation),
    ])
}

pub fn localization_conversation(instruction: &str, mode: LocalizationMode) -> Conversation {
    match mode {
        LocalizationMode::Structured => Conversation::new(vec![
            ChatMessage::system(click_schema().to_string()),
            ChatMessage::user(vec![
                ContentPart::Image,
                ContentPart::Text(format!("{LOCALIZATION_STRUCTURED}\n{instruction}")),
            ]),
        ]),
        LocalizationMode::Textual => Conversation::new(vec![ChatMessage::user(vec![
            ContentPart::Image,
            ContentPart::Text(format!("{LOCALIZATION_TEXTUAL}\n{instruction}")),
        ])]),
    }
}
