//! Portable backend built on child handles.

use std::process::{Command, ExitStatus};
use std::time::Duration;

use pipesh_types::StageState;

use super::{Capability, JobControl, JobSignal, Member, SignalTarget};
use crate::error::JobControlError;
use crate::scheduler::{StageEvent, StageSender};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Job control without process groups.
///
/// Background execution and kill work; suspend, resume, and terminal
/// transfer report [`JobControlError::Unsupported`].
#[derive(Debug, Default)]
pub struct TaskControl;

impl TaskControl {
    pub fn new() -> Self {
        Self
    }
}

impl JobControl for TaskControl {
    fn capability(&self) -> Capability {
        Capability::TaskHandles
    }

    fn job_control_enabled(&self) -> bool {
        false
    }

    #[cfg(unix)]
    fn terminal(&self) -> Option<std::sync::Arc<super::Terminal>> {
        None
    }

    fn configure(&self, _cmd: &mut Command, _leader: Option<u32>, _foreground: bool) {}

    fn watch(&self, member: &Member, index: usize, events: StageSender) -> std::io::Result<()> {
        let member = member.clone();
        std::thread::Builder::new()
            .name(format!("pipesh-wait-{}", member.pid))
            .spawn(move || {
                let state = loop {
                    let polled = member.child.lock().unwrap_or_else(|e| e.into_inner()).try_wait();
                    match polled {
                        Ok(Some(status)) => break exit_state(status),
                        Ok(None) => std::thread::sleep(POLL_INTERVAL),
                        Err(e) => {
                            tracing::error!(pid = member.pid, "try_wait failed: {}", e);
                            break StageState::Exited(255);
                        }
                    }
                };
                tracing::debug!(pid = member.pid, index, ?state, "stage exited");
                let _ = events.send(StageEvent { index, state });
            })?;
        Ok(())
    }

    fn signal(&self, target: &SignalTarget, sig: JobSignal) -> Result<(), JobControlError> {
        match sig {
            JobSignal::Kill | JobSignal::Terminate | JobSignal::Interrupt | JobSignal::Hangup => {
                for member in &target.members {
                    let mut child = member.child.lock().unwrap_or_else(|e| e.into_inner());
                    match child.kill() {
                        Ok(()) => {}
                        // Already exited.
                        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
                        Err(e) => return Err(JobControlError::os("kill", e)),
                    }
                }
                Ok(())
            }
            JobSignal::Stop => Err(JobControlError::Unsupported("suspend")),
            JobSignal::Continue => Err(JobControlError::Unsupported("resume")),
            JobSignal::Other(_) => Err(JobControlError::Unsupported("sending arbitrary signals")),
        }
    }
}

fn exit_state(status: ExitStatus) -> StageState {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return StageState::Signaled(sig);
        }
    }
    StageState::Exited(status.code().unwrap_or(1))
}
