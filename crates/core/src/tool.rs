//! Tool abstractions — what the model can ask the host to do.
//!
//! The loop never implements tools. It resolves a tool name to a [`ToolKind`]
//! (to pick gate and formatter behaviour) and hands the call to an injected
//! [`ToolExecutor`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ToolError;

/// Tool arguments: always a JSON object.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// A normalized request to execute a tool.
///
/// `name` is non-empty for every call produced by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    pub fn kind(&self) -> ToolKind {
        ToolKind::from_name(&self.name)
    }

    /// String argument lookup, `None` when missing or not a string.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// The kinds of tool the loop knows how to gate and summarise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    ReadFile,
    WriteFile,
    EditFile,
    DeleteFile,
    MoveFile,
    ListDirectory,
    GlobFiles,
    SearchContent,
    Shell,
    GitStatus,
    GitDiff,
    GitLog,
    GitAdd,
    GitCommit,
    TaskComplete,
    /// Anything not listed above; handled generically.
    Other,
}

/// Every name the loop recognises, aliases included.
const KNOWN_NAMES: &[(&str, ToolKind)] = &[
    ("read_file", ToolKind::ReadFile),
    ("write_file", ToolKind::WriteFile),
    ("edit_file", ToolKind::EditFile),
    ("delete_file", ToolKind::DeleteFile),
    ("remove_file", ToolKind::DeleteFile),
    ("move_file", ToolKind::MoveFile),
    ("rename_file", ToolKind::MoveFile),
    ("list_directory", ToolKind::ListDirectory),
    ("list_files", ToolKind::ListDirectory),
    ("glob_files", ToolKind::GlobFiles),
    ("find_file", ToolKind::GlobFiles),
    ("grep", ToolKind::SearchContent),
    ("grep_content", ToolKind::SearchContent),
    ("code_search", ToolKind::SearchContent),
    ("execute_command", ToolKind::Shell),
    ("bash", ToolKind::Shell),
    ("shell", ToolKind::Shell),
    ("git_status", ToolKind::GitStatus),
    ("git_diff", ToolKind::GitDiff),
    ("git_log", ToolKind::GitLog),
    ("git_add", ToolKind::GitAdd),
    ("git_commit", ToolKind::GitCommit),
    ("task_complete", ToolKind::TaskComplete),
    ("task_completed", ToolKind::TaskComplete),
];

impl ToolKind {
    /// Resolve a tool name, including the aliases models commonly emit.
    pub fn from_name(name: &str) -> Self {
        KNOWN_NAMES
            .iter()
            .find(|(known, _)| *known == name)
            .map_or(ToolKind::Other, |(_, kind)| *kind)
    }

    /// Whether this kind can mutate or destroy external state.
    pub fn is_dangerous(&self) -> bool {
        matches!(
            self,
            ToolKind::WriteFile
                | ToolKind::EditFile
                | ToolKind::DeleteFile
                | ToolKind::MoveFile
                | ToolKind::Shell
                | ToolKind::GitAdd
                | ToolKind::GitCommit
        )
    }

    /// Every known name, aliases included, whose kind is dangerous.
    pub fn default_dangerous_names() -> Vec<&'static str> {
        KNOWN_NAMES
            .iter()
            .filter(|(_, kind)| kind.is_dangerous())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Known names that resolve to the shell.
    pub fn shell_names() -> Vec<&'static str> {
        KNOWN_NAMES
            .iter()
            .filter(|(_, kind)| *kind == ToolKind::Shell)
            .map(|(name, _)| *name)
            .collect()
    }
}

/// A single executable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file", "execute_command").
    fn name(&self) -> &str;

    /// Execute the tool with the given arguments, returning its raw result.
    async fn execute(&self, arguments: &Arguments) -> Result<serde_json::Value, ToolError>;
}

/// Executes tool calls by name. The loop's only way to act on the host.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<serde_json::Value, ToolError>;
}

/// A registry of available tools, keyed by name.
///
/// Built once at startup and then shared immutably behind an `Arc`.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: Box<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments).await
    }
}
