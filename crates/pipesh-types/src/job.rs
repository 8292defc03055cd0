//! Job identification and status types.

use serde::{Deserialize, Serialize};

/// Unique identifier for a pipeline; doubles as its job number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a process group.
///
/// `Starting → Running ⇄ Stopped → Exited`, or `Starting → Exited` when no
/// stage could be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupState {
    Starting,
    Running,
    Stopped,
    Exited,
}

impl GroupState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_become(self, next: GroupState) -> bool {
        use GroupState::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Stopped)
                | (Starting, Exited)
                | (Running, Stopped)
                | (Running, Exited)
                | (Stopped, Running)
                | (Stopped, Exited)
        ) || self == next
    }
}

impl std::fmt::Display for GroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupState::Starting => write!(f, "Starting"),
            GroupState::Running => write!(f, "Running"),
            GroupState::Stopped => write!(f, "Stopped"),
            GroupState::Exited => write!(f, "Exited"),
        }
    }
}

/// Status of a job as shown by `jobs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is currently running.
    Running,
    /// Job was stopped by a signal (e.g., Ctrl-Z / SIGTSTP).
    Stopped,
    /// Job completed successfully.
    Done,
    /// Job completed with a non-zero return code.
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Stopped => write!(f, "Stopped"),
            JobStatus::Done => write!(f, "Done"),
            JobStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Information about a job for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job ID.
    pub id: JobId,
    /// Command line as the user would have typed it.
    pub command: String,
    /// Current status.
    pub status: JobStatus,
    /// Process group ID, when the job owns one.
    pub pgid: Option<u32>,
    /// OS process IDs of the external stages.
    pub pids: Vec<u32>,
    /// Logical return code once the job has finished.
    pub code: Option<i32>,
}
