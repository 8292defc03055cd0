//! Per-stage execution states.

use serde::{Deserialize, Serialize};

/// How a stage finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum StageStatus {
    /// Normal exit with a code (including 126/127 for launch failures).
    Exited(i32),
    /// Terminated by a signal.
    Signaled(i32),
}

impl StageStatus {
    /// Shell-style exit code: signals report as `128 + sig`.
    pub fn exit_code(self) -> i32 {
        match self {
            StageStatus::Exited(code) => code,
            StageStatus::Signaled(sig) => 128 + sig,
        }
    }

    pub fn success(self) -> bool {
        self.exit_code() == 0
    }
}

/// Live state of one stage, driven only by wait notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageState {
    Starting,
    Running,
    Stopped(i32),
    Exited(i32),
    Signaled(i32),
}

impl StageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StageState::Exited(_) | StageState::Signaled(_))
    }

    /// The final status, once the stage is terminal.
    pub fn status(self) -> Option<StageStatus> {
        match self {
            StageState::Exited(code) => Some(StageStatus::Exited(code)),
            StageState::Signaled(sig) => Some(StageStatus::Signaled(sig)),
            _ => None,
        }
    }
}

/// How a command name was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutableKind {
    Alias,
    Builtin,
    External,
}

impl std::fmt::Display for ExecutableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutableKind::Alias => write!(f, "alias"),
            ExecutableKind::Builtin => write!(f, "builtin"),
            ExecutableKind::External => write!(f, "external"),
        }
    }
}
