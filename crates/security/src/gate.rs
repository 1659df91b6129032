//! Security gate — decides whether a parsed tool call needs confirmation.
//!
//! Rules:
//! - Tools in the dangerous registry always need confirmation.
//! - Shell tools are scanned for destructive verbs (`rm`, `del`, `rmdir`,
//!   `mv`, `rename`) anywhere in a compound command line. A match is flagged
//!   and audited. Without a match a shell call still needs confirmation,
//!   unless a [`ShellCommandPolicy`] is installed and permits it.
//! - Everything else is safe.

use agentloop_config::SecurityConfig;
use agentloop_core::tool::Arguments;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::warn;

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};

/// Destructive verb as a standalone token: bounded on the left by the start,
/// whitespace, `;`, `|` or `&`, and on the right by whitespace or the end.
static DESTRUCTIVE_SHELL_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|[;\s|&])(rm|del|rmdir|mv|rename)(\s+|$)")
        .expect("destructive verb pattern is valid")
});

/// The gate's decision for one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityVerdict {
    pub dangerous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SecurityVerdict {
    pub fn safe() -> Self {
        Self {
            dangerous: false,
            reason: None,
        }
    }

    pub fn dangerous(reason: impl Into<String>) -> Self {
        Self {
            dangerous: true,
            reason: Some(reason.into()),
        }
    }
}

/// Host-supplied allow-list for shell commands with no destructive verb.
///
/// Never consulted for a command that matched a destructive verb.
pub trait ShellCommandPolicy: Send + Sync {
    fn permits(&self, command: &str) -> bool;
}

/// Immutable classification tables, built once from configuration.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    dangerous_tools: HashSet<String>,
    shell_tools: HashSet<String>,
}

impl SecurityPolicy {
    pub fn new<D, S>(dangerous_tools: D, shell_tools: S) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        let shell_tools: HashSet<String> = shell_tools.into_iter().map(Into::into).collect();
        // Shell tools are dangerous by default even if the config forgot them.
        let dangerous_tools = dangerous_tools
            .into_iter()
            .map(Into::into)
            .chain(shell_tools.iter().cloned())
            .collect();
        Self {
            dangerous_tools,
            shell_tools,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.dangerous_tools.clone(), config.shell_tools.clone())
    }

    pub fn is_registered(&self, tool_name: &str) -> bool {
        self.dangerous_tools.contains(tool_name)
    }

    pub fn is_shell(&self, tool_name: &str) -> bool {
        self.shell_tools.contains(tool_name)
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::from_config(&SecurityConfig::default())
    }
}

pub struct SecurityGate {
    policy: SecurityPolicy,
    shell_policy: Option<Arc<dyn ShellCommandPolicy>>,
    audit: Arc<AuditLogger>,
}

impl SecurityGate {
    pub fn new(policy: SecurityPolicy, audit: Arc<AuditLogger>) -> Self {
        Self {
            policy,
            shell_policy: None,
            audit,
        }
    }

    /// Install an allow-list for non-destructive shell commands.
    pub fn with_shell_policy(mut self, shell_policy: Arc<dyn ShellCommandPolicy>) -> Self {
        self.shell_policy = Some(shell_policy);
        self
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    pub fn classify(&self, tool_name: &str, arguments: &Arguments) -> SecurityVerdict {
        if !self.policy.is_registered(tool_name) {
            return SecurityVerdict::safe();
        }

        if !self.policy.is_shell(tool_name) {
            return SecurityVerdict::dangerous(format!(
                "'{tool_name}' can modify external state"
            ));
        }

        let command = arguments
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if let Some(verb) = destructive_verb(command) {
            warn!(tool = %tool_name, command = %command, verb = %verb, "Dangerous shell pattern");
            self.audit.log(
                AuditEvent::DangerousCommand {
                    tool_name: tool_name.to_string(),
                    command: command.to_string(),
                },
                "security_gate",
                tool_name,
                AuditOutcome::Flagged,
                Some(format!("destructive verb '{verb}'")),
            );
            return SecurityVerdict::dangerous(format!(
                "command contains '{verb}', which can delete or move files"
            ));
        }

        match &self.shell_policy {
            Some(policy) if policy.permits(command) => SecurityVerdict::safe(),
            _ => SecurityVerdict::dangerous("shell execution requires confirmation"),
        }
    }
}

/// First destructive verb in a command line, lowercased.
pub fn destructive_verb(command: &str) -> Option<String> {
    DESTRUCTIVE_SHELL_VERB
        .captures(command)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().to_ascii_lowercase())
}
