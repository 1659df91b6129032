//! Command parser — turns free-form model text into a tool call.
//!
//! Models wrap JSON in markdown fences, surround it with prose, use single
//! quotes, and emit several shapes for the same intent. The parser accepts
//! all of them and never fails: anything it cannot interpret comes back as
//! [`ParseOutcome::NotACommand`] or [`ParseOutcome::Malformed`], which the
//! loop treats as a plain-text answer.

use agentloop_core::tool::{Arguments, ToolCall};
use regex_lite::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, warn};

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```(json)?|```$").expect("fence pattern is valid"));

/// A memory entry echoed back by the model: `{...}` followed by `output:`.
static MEMORY_ECHO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*\{.*?\}\s*output:").expect("memory echo pattern is valid")
});

/// Fields some models use to wrap a JSON-encoded tool call in a string.
const WRAPPER_FIELDS: [&str; 5] = ["result", "response", "message", "command", "data"];

/// Result of parsing one piece of model output.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A normalized tool call with a non-empty name
    Command(ToolCall),
    /// No JSON object in the text, or the text echoes a memory entry
    NotACommand,
    /// Looked like JSON but could not be decoded or normalized
    Malformed(String),
    /// A valid object that is neither a tool call nor a function call
    Object(Arguments),
}

impl ParseOutcome {
    pub fn is_command(&self) -> bool {
        matches!(self, ParseOutcome::Command(_))
    }

    pub fn into_command(self) -> Option<ToolCall> {
        match self {
            ParseOutcome::Command(call) => Some(call),
            _ => None,
        }
    }
}

/// Stateless parser for model output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandParser;

impl CommandParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> ParseOutcome {
        parse(text)
    }
}

/// Parse model output into a [`ParseOutcome`]. Never panics.
pub fn parse(text: &str) -> ParseOutcome {
    let cleaned = FENCE.replace_all(text, "");
    let cleaned = cleaned.trim();

    if MEMORY_ECHO.is_match(cleaned) {
        warn!("Model echoed a memory entry instead of a command");
        return ParseOutcome::NotACommand;
    }

    let Some(candidate) = extract_object(cleaned) else {
        debug!("No JSON object in model output");
        return ParseOutcome::NotACommand;
    };

    let value = match decode(candidate) {
        Ok(value) => value,
        Err(reason) => {
            debug!(error = %reason, "Model output is not valid JSON");
            return ParseOutcome::Malformed(reason);
        }
    };

    match value {
        Value::Object(object) => normalize(object),
        other => ParseOutcome::Malformed(format!("expected a JSON object, got {}", type_name(&other))),
    }
}

/// Substring from the first `{` to the last `}` inclusive.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    // Both delimiters are ASCII, so these are valid char boundaries.
    (end > start).then(|| &text[start..=end])
}

/// Strict decode, then one pass with single quotes swapped for double quotes.
///
/// The repair is best-effort: an apostrophe inside a string value is turned
/// into a quote too, which usually makes the retry fail as well.
fn decode(candidate: &str) -> Result<Value, String> {
    match serde_json::from_str(candidate) {
        Ok(value) => Ok(value),
        Err(strict) => {
            let repaired = candidate.replace('\'', "\"");
            serde_json::from_str(&repaired).map_err(|_| strict.to_string())
        }
    }
}

fn normalize(object: Arguments) -> ParseOutcome {
    if object.contains_key("tool_name") {
        return from_tool_name(object);
    }

    if let Some(Value::Object(function)) = object.get("function") {
        if let Some(name) = function.get("name").and_then(Value::as_str) {
            return match arguments_from(function.get("arguments")) {
                Ok(arguments) => command(name, arguments),
                Err(reason) => ParseOutcome::Malformed(reason),
            };
        }
    }

    for field in WRAPPER_FIELDS {
        let Some(Value::String(inner)) = object.get(field) else {
            continue;
        };
        if let Ok(Value::Object(nested)) = serde_json::from_str::<Value>(inner.trim()) {
            if nested.contains_key("tool_name") {
                debug!(field, "Unwrapped tool call from string field");
                return from_tool_name(nested);
            }
        }
    }

    ParseOutcome::Object(object)
}

fn from_tool_name(mut object: Arguments) -> ParseOutcome {
    let name = match object.get("tool_name") {
        Some(Value::String(name)) => name.clone(),
        Some(other) => {
            return ParseOutcome::Malformed(format!(
                "tool_name must be a string, got {}",
                type_name(other)
            ));
        }
        None => return ParseOutcome::Malformed("missing tool_name".into()),
    };

    match arguments_from(object.remove("arguments").as_ref()) {
        Ok(arguments) => command(&name, arguments),
        Err(reason) => ParseOutcome::Malformed(reason),
    }
}

/// Missing or null arguments are empty; a string is decoded as JSON.
fn arguments_from(raw: Option<&Value>) -> Result<Arguments, String> {
    match raw {
        None | Some(Value::Null) => Ok(Arguments::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => Ok(Arguments::new()),
        Some(Value::String(encoded)) => match serde_json::from_str(encoded) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(format!("arguments must be an object, got {}", type_name(&other))),
            Err(e) => Err(format!("arguments are not valid JSON: {e}")),
        },
        Some(other) => Err(format!("arguments must be an object, got {}", type_name(other))),
    }
}

fn command(name: &str, arguments: Arguments) -> ParseOutcome {
    let name = name.trim();
    if name.is_empty() {
        return ParseOutcome::Malformed("tool name is empty".into());
    }
    ParseOutcome::Command(ToolCall::new(name, arguments))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
