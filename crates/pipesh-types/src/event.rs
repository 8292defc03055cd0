//! Lifecycle notifications emitted by the pipeline coordinator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// A pipeline lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum PipelineEvent {
    /// All stages have been launched.
    Started { pipeline_id: JobId, command: String },
    /// A foreground pipeline was suspended and handed back to the shell.
    Stopped { pipeline_id: JobId },
    /// Every stage has been reaped and the result is frozen.
    Exited {
        pipeline_id: JobId,
        stage_exit_codes: Vec<i32>,
        duration: Duration,
    },
}

impl PipelineEvent {
    pub fn pipeline_id(&self) -> JobId {
        match self {
            PipelineEvent::Started { pipeline_id, .. }
            | PipelineEvent::Stopped { pipeline_id }
            | PipelineEvent::Exited { pipeline_id, .. } => *pipeline_id,
        }
    }
}
