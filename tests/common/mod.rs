#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use web_navigator::{
    AgentConfig, BackendError, BrowserBackend, Conversation, InferenceError, Screenshot,
    VisionModel,
};

/// Replies from two queues: one for navigation prompts, one for
/// localization prompts. An empty queue answers with an error.
#[derive(Default)]
pub struct ScriptedModel {
    navigation: Mutex<VecDeque<String>>,
    localization: Mutex<VecDeque<String>>,
    pub navigation_prompts: Mutex<Vec<String>>,
    pub localization_prompts: Mutex<Vec<String>>,
    cancel_at: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedModel {
    pub fn new(navigation: Vec<Value>, localization: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            navigation: Mutex::new(navigation.into_iter().map(|v| v.to_string()).collect()),
            localization: Mutex::new(localization.into_iter().map(String::from).collect()),
            ..Self::default()
        })
    }

    /// Trip `token` while answering the `call`-th navigation prompt.
    pub fn cancel_during(&self, call: usize, token: CancellationToken) {
        *self.cancel_at.lock().unwrap() = Some((call, token));
    }

    /// Navigation replies given verbatim, for malformed output.
    pub fn raw(navigation: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            navigation: Mutex::new(navigation.into_iter().map(String::from).collect()),
            ..Self::default()
        })
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn infer(
        &self,
        conversation: &Conversation,
        _screenshot: &Screenshot,
        _max_tokens: u32,
    ) -> Result<String, InferenceError> {
        let text = conversation.text();
        if text.contains("<task>") {
            let calls = self.navigation_prompts.lock().unwrap().len() + 1;
            if let Some((at, token)) = &*self.cancel_at.lock().unwrap() {
                if *at == calls {
                    token.cancel();
                }
            }
        }
        let (queue, prompts) = if text.contains("<task>") {
            (&self.navigation, &self.navigation_prompts)
        } else {
            (&self.localization, &self.localization_prompts)
        };
        prompts.lock().unwrap().push(text);
        queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| InferenceError::Other("script exhausted".into()))
    }
}

pub fn step(thought: &str, note: &str, action: Value) -> Value {
    json!({ "note": note, "thought": thought, "action": action })
}

pub fn answer(content: &str) -> Value {
    step("I have the answer", "", json!({ "action": "answer", "content": content }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Screenshot,
    Click(i32, i32),
    Type(String),
    Key(String),
    Scroll(i64, i64),
    Goto(String),
    GoBack,
    Refresh,
    WaitForLoad,
    CurrentUrl,
    Restart,
    ResetPointer,
}

impl Call {
    /// Calls that change the page, as opposed to observing it.
    pub fn is_action(&self) -> bool {
        !matches!(
            self,
            Call::Screenshot | Call::CurrentUrl | Call::WaitForLoad | Call::ResetPointer
        )
    }
}

/// Records every call. Clones share the log.
#[derive(Clone, Default)]
pub struct MockBackend {
    calls: Arc<Mutex<Vec<Call>>>,
    /// Operations that fail with a recoverable error.
    pub failing: Vec<&'static str>,
    /// Operations that fail as if the browser had crashed.
    pub crashing: Vec<&'static str>,
    pub dead_screenshots: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(operation: &'static str) -> Self {
        Self {
            failing: vec![operation],
            ..Self::default()
        }
    }

    pub fn crashing(operation: &'static str) -> Self {
        Self {
            crashing: vec![operation],
            ..Self::default()
        }
    }

    pub fn dead() -> Self {
        Self {
            dead_screenshots: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_action).collect()
    }

    fn log(&self, operation: &'static str, call: Call) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(call);
        if self.crashing.contains(&operation) {
            return Err(BackendError::fatal("connection closed"));
        }
        if self.failing.contains(&operation) {
            return Err(BackendError::action(operation, "element not interactable"));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserBackend for MockBackend {
    async fn screenshot(&mut self) -> Result<Screenshot, BackendError> {
        self.calls.lock().unwrap().push(Call::Screenshot);
        if self.dead_screenshots {
            return Err(BackendError::fatal("target closed"));
        }
        Ok(Screenshot::from_png(vec![0x89, b'P', b'N', b'G']))
    }

    async fn click(&mut self, x: i32, y: i32) -> Result<(), BackendError> {
        self.log("click", Call::Click(x, y))
    }

    async fn type_text(&mut self, text: &str) -> Result<(), BackendError> {
        self.log("type", Call::Type(text.to_string()))
    }

    async fn press_key(&mut self, key: &str) -> Result<(), BackendError> {
        self.log("key", Call::Key(key.to_string()))
    }

    async fn scroll(&mut self, dx: i64, dy: i64) -> Result<(), BackendError> {
        self.log("scroll", Call::Scroll(dx, dy))
    }

    async fn goto(&mut self, url: &str) -> Result<(), BackendError> {
        self.log("goto", Call::Goto(url.to_string()))
    }

    async fn go_back(&mut self) -> Result<(), BackendError> {
        self.log("back", Call::GoBack)
    }

    async fn refresh(&mut self) -> Result<(), BackendError> {
        self.log("refresh", Call::Refresh)
    }

    async fn wait_for_load(&mut self) -> Result<(), BackendError> {
        self.log("load", Call::WaitForLoad)
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        self.log("url", Call::CurrentUrl)?;
        Ok("https://example.com/".to_string())
    }

    async fn restart(&mut self) -> Result<(), BackendError> {
        self.log("restart", Call::Restart)
    }

    async fn reset_pointer(&mut self) -> Result<(), BackendError> {
        self.log("reset", Call::ResetPointer)
    }
}

pub fn config(max_steps: usize) -> AgentConfig {
    AgentConfig {
        max_steps,
        ..AgentConfig::default()
    }
}
