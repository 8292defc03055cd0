//! Per-pipeline reaper.
//!
//! Stage watchers (one blocking `waitpid` thread per external stage, or
//! the builtin's worker thread) send [`StageEvent`]s over one channel. The
//! reaper applies them in arrival order, and once every stage is terminal
//! it drains the capture readers, freezes the result, and announces the
//! exit. It is spawned detached and never cancelled.

use std::sync::Arc;
use std::time::Duration;

use pipesh_types::{GroupState, PipelineEvent, StageState};
use tokio::sync::{OwnedMutexGuard, mpsc, oneshot};

use super::capture::CaptureBuffer;
use super::job::JobShared;
use crate::events::EventBus;

/// A state change for one stage, identified by its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEvent {
    pub index: usize,
    pub state: StageState,
}

pub type StageSender = mpsc::UnboundedSender<StageEvent>;

pub(crate) struct Reaper {
    pub job: Arc<JobShared>,
    pub events: mpsc::UnboundedReceiver<StageEvent>,
    pub readers: Vec<oneshot::Receiver<()>>,
    pub buffers: Vec<Arc<CaptureBuffer>>,
    /// How long readers may keep going after the last stage exits.
    pub drain: Duration,
    pub bus: EventBus,
    /// Session gate, released as soon as no builtin is still running.
    pub gate: Option<OwnedMutexGuard<()>>,
}

impl Reaper {
    pub async fn run(mut self) {
        let id = self.job.id;
        while !self.job.all_terminal() {
            let Some(event) = self.events.recv().await else {
                tracing::error!(job = %id, "stage watchers gone with stages outstanding");
                break;
            };
            self.job.apply(event);
            if self.gate.is_some() && !self.job.builtins_running() {
                self.gate = None;
            }
        }
        self.gate = None;

        // A grandchild can hold a capture pipe open after its parent
        // exited; give readers a bounded window, then freeze.
        let deadline = tokio::time::Instant::now() + self.drain;
        for reader in self.readers.drain(..) {
            if tokio::time::timeout_at(deadline, reader).await.is_err() {
                tracing::debug!(job = %id, "capture still open after drain window, truncating");
            }
        }
        for buffer in &self.buffers {
            buffer.seal();
        }

        let statuses = self.job.statuses();
        let elapsed = self.job.result.complete(statuses.clone());
        self.job.set_group(GroupState::Exited);
        tracing::debug!(job = %id, ?statuses, ?elapsed, "pipeline finished");
        self.bus.emit(PipelineEvent::Exited {
            pipeline_id: id,
            stage_exit_codes: statuses.iter().map(|s| s.exit_code()).collect(),
            duration: elapsed,
        });
    }
}
