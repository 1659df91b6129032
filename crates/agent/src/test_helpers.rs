//! Scripted collaborators for orchestrator tests.

use agentloop_core::error::{ProviderError, ToolError};
use agentloop_core::message::Message;
use agentloop_core::provider::ModelClient;
use agentloop_core::tool::{Arguments, ToolExecutor};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::collaborators::ConfirmationChannel;

/// Render a tool call the way a well-behaved model would.
pub fn tool_call_json(name: &str, arguments: Value) -> String {
    json!({"tool_name": name, "arguments": arguments}).to_string()
}

/// A model that returns scripted replies in order and records every
/// conversation it was shown. Runs dry with `EmptyResponse`.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    repeat_error: Option<ProviderError>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            repeat_error: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A model whose every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            repeat_error: Some(error),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// The message list passed to each call, in call order.
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: &[Message]) -> Result<String, ProviderError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        if let Some(err) = &self.repeat_error {
            return Err(err.clone());
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ProviderError::EmptyResponse))
    }
}

pub struct PanickingModel;

#[async_trait]
impl ModelClient for PanickingModel {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn chat(&self, _messages: &[Message]) -> Result<String, ProviderError> {
        panic!("model exploded");
    }
}

#[derive(Clone)]
enum Behavior {
    Return(Value),
    Fail(ToolError),
    Panic,
}

/// Tools with fixed behaviour per name. Unknown names are `NotFound`.
#[derive(Default)]
pub struct ScriptedTools {
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(mut self, name: &str, value: Value) -> Self {
        self.behaviors.insert(name.into(), Behavior::Return(value));
        self
    }

    pub fn failing(mut self, name: &str, error: ToolError) -> Self {
        self.behaviors.insert(name.into(), Behavior::Fail(error));
        self
    }

    pub fn panicking(mut self, name: &str) -> Self {
        self.behaviors.insert(name.into(), Behavior::Panic);
        self
    }

    /// Names of the tools executed so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for ScriptedTools {
    async fn execute(&self, name: &str, _arguments: &Arguments) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push(name.to_string());
        match self.behaviors.get(name).cloned() {
            Some(Behavior::Return(value)) => Ok(value),
            Some(Behavior::Fail(error)) => Err(error),
            Some(Behavior::Panic) => panic!("tool {name} blew up"),
            None => Err(ToolError::NotFound(name.to_string())),
        }
    }
}

/// Gives a fixed answer and remembers which tools it was asked about.
pub struct RecordingConfirmation {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl RecordingConfirmation {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationChannel for RecordingConfirmation {
    async fn ask_confirmation(&self, tool_name: &str, _arguments: &Arguments) -> bool {
        self.asked.lock().unwrap().push(tool_name.to_string());
        self.answer
    }
}

/// A confirmation channel nobody ever answers.
pub struct NeverAnswers;

#[async_trait]
impl ConfirmationChannel for NeverAnswers {
    async fn ask_confirmation(&self, _tool_name: &str, _arguments: &Arguments) -> bool {
        std::future::pending().await
    }
}
