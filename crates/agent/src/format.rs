//! Result formatter — raw tool output to the one-line (or few-line) summary
//! the model sees on its next turn.
//!
//! Dispatch goes through [`formatter_for`], a table from [`ToolKind`] to a
//! formatting function. Unknown kinds fall back to a generic summary.

use agentloop_core::error::ToolError;
use agentloop_core::tool::{Arguments, ToolKind};
use serde_json::Value;

type Formatter = fn(&Value, &Arguments) -> String;

/// Glob results beyond this are summarised with a remainder count.
const GLOB_LIST_LIMIT: usize = 10;

/// Summarise a tool's raw result. Never panics.
///
/// String results pass through unchanged, except for kinds whose summary is
/// derived from the text itself (file reads, git status, git diff).
pub fn format_tool_result(tool_name: &str, result: &Value, arguments: &Arguments) -> String {
    let kind = ToolKind::from_name(tool_name);
    if let Value::String(text) = result {
        if !summarises_text(kind) {
            return text.clone();
        }
    }
    formatter_for(kind)(result, arguments)
}

/// Summary recorded for a tool that returned an error or panicked.
pub fn format_failure(tool_name: &str, error: &ToolError) -> String {
    match error {
        ToolError::NotFound(_) => format!("Tool error: unknown tool '{tool_name}'"),
        other => format!("Tool error: {other}"),
    }
}

/// Whether a successfully returned result still reports a failure: a shell
/// run with a non-zero exit code, or a mapping with `"success": false`.
pub fn reports_failure(tool_name: &str, result: &Value) -> bool {
    let Value::Object(map) = result else {
        return false;
    };
    if ToolKind::from_name(tool_name) == ToolKind::Shell && exit_status(map).is_some_and(is_nonzero) {
        return true;
    }
    matches!(map.get("success"), Some(Value::Bool(false)))
}

pub fn formatter_for(kind: ToolKind) -> Formatter {
    match kind {
        ToolKind::ReadFile => read_file,
        ToolKind::WriteFile => write_file,
        ToolKind::EditFile => edit_file,
        ToolKind::DeleteFile => delete_file,
        ToolKind::MoveFile => move_file,
        ToolKind::ListDirectory => list_directory,
        ToolKind::GlobFiles => glob_files,
        ToolKind::SearchContent => search_content,
        ToolKind::Shell => shell,
        ToolKind::GitStatus => git_status,
        ToolKind::GitDiff => git_diff,
        ToolKind::GitLog
        | ToolKind::GitAdd
        | ToolKind::GitCommit
        | ToolKind::TaskComplete
        | ToolKind::Other => generic,
    }
}

fn summarises_text(kind: ToolKind) -> bool {
    matches!(kind, ToolKind::ReadFile | ToolKind::GitStatus | ToolKind::GitDiff)
}

/// First string argument among `keys`, or `default`.
fn arg<'a>(arguments: &'a Arguments, keys: &[&str], default: &'a str) -> &'a str {
    keys.iter()
        .find_map(|k| arguments.get(*k).and_then(Value::as_str))
        .unwrap_or(default)
}

fn file_path(arguments: &Arguments) -> &str {
    arg(arguments, &["file_path", "path"], "unknown")
}

fn read_file(result: &Value, arguments: &Arguments) -> String {
    let path = file_path(arguments);
    let content = match result {
        Value::String(text) => Some(text.as_str()),
        Value::Object(map) => map.get("content").and_then(Value::as_str),
        _ => None,
    };
    match content {
        Some(text) => format!(
            "Successfully read file '{path}' ({} lines, {} characters)",
            text.split('\n').count(),
            text.chars().count()
        ),
        None => format!("Successfully read file '{path}'"),
    }
}

fn write_file(_: &Value, arguments: &Arguments) -> String {
    format!("Successfully wrote to file '{}'", file_path(arguments))
}

fn edit_file(_: &Value, arguments: &Arguments) -> String {
    format!("Successfully edited file '{}'", file_path(arguments))
}

fn delete_file(_: &Value, arguments: &Arguments) -> String {
    format!("Successfully deleted '{}'", file_path(arguments))
}

fn move_file(_: &Value, arguments: &Arguments) -> String {
    let source = arg(arguments, &["source", "file_path", "path"], "unknown");
    let destination = arg(arguments, &["destination", "dest", "new_path"], "unknown");
    format!("Successfully moved '{source}' to '{destination}'")
}

fn list_directory(result: &Value, arguments: &Arguments) -> String {
    let directory = arg(arguments, &["directory", "path"], ".");
    let Value::Array(items) = result else {
        return format!("Listed directory '{directory}'");
    };

    let flag = |item: &Value, key: &str| item.get(key).and_then(Value::as_bool).unwrap_or(false);
    let files = items.iter().filter(|i| flag(i, "is_file")).count();
    let dirs = items.iter().filter(|i| flag(i, "is_dir")).count();
    format!(
        "Listed directory '{directory}': found {files} files and {dirs} directories ({} total items)",
        items.len()
    )
}

fn shell(result: &Value, arguments: &Arguments) -> String {
    let command = arg(arguments, &["command"], "unknown");
    let Value::Object(map) = result else {
        return format!("Executed command: {command}");
    };

    let status = exit_status(map).filter(|code| is_nonzero(code));
    let stdout = map.get("stdout").and_then(Value::as_str).unwrap_or("").trim();
    let stderr = map.get("stderr").and_then(Value::as_str).unwrap_or("").trim();

    let mut out = match status {
        None => format!("Command executed successfully: {command}"),
        Some(code) => format!("Command failed (exit code {code}): {command}"),
    };
    if !stdout.is_empty() {
        out.push_str("\n--- STDOUT ---\n");
        out.push_str(stdout);
    }
    if !stderr.is_empty() {
        out.push_str("\n--- STDERR ---\n");
        out.push_str(stderr);
    }
    if stdout.is_empty() && stderr.is_empty() {
        out.push_str("\n(No output)");
    }
    out
}

/// `return_code`, falling back to `returncode` when absent or null.
fn exit_status(map: &serde_json::Map<String, Value>) -> Option<&Value> {
    ["return_code", "returncode"]
        .into_iter()
        .filter_map(|key| map.get(key))
        .find(|value| !value.is_null())
}

/// Anything other than a numeric zero counts as a failed run.
fn is_nonzero(status: &Value) -> bool {
    status.as_f64() != Some(0.0)
}

fn search_content(result: &Value, arguments: &Arguments) -> String {
    let pattern = arg(arguments, &["pattern"], "unknown");
    let Value::Object(map) = result else {
        return format!("Searched for pattern '{pattern}'");
    };

    let matches = map.get("matches_found").and_then(Value::as_u64).unwrap_or(0);
    let files = map
        .get("files_with_matches")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    format!("Found {matches} matches in {files} files for pattern '{pattern}'")
}

fn glob_files(result: &Value, arguments: &Arguments) -> String {
    let pattern = arg(arguments, &["name_pattern", "pattern"], "unknown");
    let Value::Array(paths) = result else {
        return format!("Searched for files matching '{pattern}'");
    };

    let count = paths.len();
    if count == 0 {
        return format!("No files found matching pattern '{pattern}'");
    }

    let listing = paths
        .iter()
        .take(GLOB_LIST_LIMIT)
        .map(|p| format!("  - {}", display(p)))
        .collect::<Vec<_>>()
        .join("\n");

    if count <= GLOB_LIST_LIMIT {
        format!("Found {count} file(s) matching pattern '{pattern}':\n{listing}")
    } else {
        format!(
            "Found {count} file(s) matching pattern '{pattern}' (showing first {GLOB_LIST_LIMIT}):\n{listing}\n  ... and {} more",
            count - GLOB_LIST_LIMIT
        )
    }
}

fn git_status(result: &Value, _: &Arguments) -> String {
    match result {
        Value::String(text) => {
            let lines = text.lines().filter(|l| !l.trim().is_empty()).count();
            format!("Git status retrieved ({lines} lines of output)")
        }
        _ => "Git status retrieved".into(),
    }
}

fn git_diff(result: &Value, _: &Arguments) -> String {
    match result {
        Value::String(text) => format!("Git diff retrieved ({} lines)", text.split('\n').count()),
        _ => "Git diff retrieved".into(),
    }
}

fn generic(result: &Value, _: &Arguments) -> String {
    match result {
        Value::Object(map) => {
            if let Some(message) = map.get("message").or_else(|| map.get("output")) {
                return display(message);
            }
            if map.is_empty() {
                return "Operation completed".into();
            }
            let keys = map.keys().take(3).map(String::as_str).collect::<Vec<_>>();
            let more = if map.len() > 3 { "..." } else { "" };
            format!("Operation completed (returned: {}{more})", keys.join(", "))
        }
        Value::Array(items) => format!("Operation completed (returned {} items)", items.len()),
        Value::Null => "Operation completed".into(),
        other => display(other),
    }
}

/// Strings without their JSON quotes; everything else as compact JSON.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
