//! Native process groups: `waitpid`, `killpg`, `setpgid`.

use std::os::fd::BorrowedFd;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{self, Pid};
use pipesh_types::StageState;

use super::{Capability, JobControl, JobSignal, Member, SignalTarget, Terminal};
use crate::error::JobControlError;
use crate::scheduler::{StageEvent, StageSender};

/// Signals a shell ignores while it owns the terminal; children get them back.
const JOB_SIGNALS: [Signal; 6] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGCHLD,
];

#[derive(Debug)]
pub struct NativeControl {
    enabled: bool,
    terminal: Option<Arc<Terminal>>,
}

impl NativeControl {
    pub fn new(enabled: bool, terminal: Option<Arc<Terminal>>) -> Self {
        Self { enabled, terminal }
    }
}

impl JobControl for NativeControl {
    fn capability(&self) -> Capability {
        Capability::NativeProcessGroups
    }

    fn job_control_enabled(&self) -> bool {
        self.enabled
    }

    fn terminal(&self) -> Option<Arc<Terminal>> {
        self.terminal.clone()
    }

    fn configure(&self, cmd: &mut Command, leader: Option<u32>, foreground: bool) {
        if !self.enabled {
            return;
        }
        cmd.process_group(leader.map(|pgid| pgid as i32).unwrap_or(0));
        // The child is already in its group here. It must own the terminal
        // before SIGTTIN and SIGTTOU return to their defaults.
        let tty = if foreground {
            self.terminal.as_ref().map(|t| t.raw_fd())
        } else {
            None
        };
        // SAFETY: only getpgrp, tcsetpgrp and sigaction run between fork and
        // exec, all async-signal-safe.
        unsafe {
            cmd.pre_exec(move || {
                if let Some(fd) = tty {
                    let tty = BorrowedFd::borrow_raw(fd);
                    // A lost race with the parent is harmless.
                    let _ = unistd::tcsetpgrp(tty, unistd::getpgrp());
                }
                reset_job_signals()
            });
        }
    }

    fn watch(&self, member: &Member, index: usize, events: StageSender) -> std::io::Result<()> {
        let pid = Pid::from_raw(member.pid as i32);
        std::thread::Builder::new()
            .name(format!("pipesh-reap-{}", member.pid))
            .spawn(move || reap(pid, index, events))?;
        Ok(())
    }

    fn signal(&self, target: &SignalTarget, sig: JobSignal) -> Result<(), JobControlError> {
        let sig = to_nix(sig)?;
        match target.pgid {
            Some(pgid) => match signal::killpg(Pid::from_raw(pgid as i32), sig) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(JobControlError::os("killpg", e)),
            },
            None => {
                for member in &target.members {
                    match signal::kill(Pid::from_raw(member.pid as i32), sig) {
                        Ok(()) | Err(Errno::ESRCH) => {}
                        Err(e) => return Err(JobControlError::os("kill", e)),
                    }
                }
                Ok(())
            }
        }
    }
}

fn to_nix(sig: JobSignal) -> Result<Signal, JobControlError> {
    Ok(match sig {
        JobSignal::Interrupt => Signal::SIGINT,
        JobSignal::Terminate => Signal::SIGTERM,
        JobSignal::Kill => Signal::SIGKILL,
        JobSignal::Stop => Signal::SIGTSTP,
        JobSignal::Continue => Signal::SIGCONT,
        JobSignal::Hangup => Signal::SIGHUP,
        JobSignal::Other(n) => {
            Signal::try_from(n).map_err(|e| JobControlError::os("signal", e))?
        }
    })
}

fn reset_job_signals() -> std::io::Result<()> {
    for sig in JOB_SIGNALS {
        unsafe { signal::signal(sig, SigHandler::SigDfl) }?;
    }
    Ok(())
}

/// Wait on one pid until it exits, forwarding stops and continues.
fn reap(pid: Pid, index: usize, events: StageSender) {
    let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    loop {
        let state = match waitpid(pid, Some(flags)) {
            Ok(WaitStatus::Exited(_, code)) => StageState::Exited(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => StageState::Signaled(sig as i32),
            Ok(WaitStatus::Stopped(_, sig)) => StageState::Stopped(sig as i32),
            Ok(WaitStatus::Continued(_)) => StageState::Running,
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(e) => {
                // ECHILD here means someone else reaped our child.
                tracing::error!(%pid, "waitpid failed: {}", e);
                StageState::Exited(255)
            }
        };
        tracing::debug!(%pid, index, ?state, "stage state change");
        let done = state.is_terminal();
        if events.send(StageEvent { index, state }).is_err() && !done {
            tracing::debug!(%pid, "reaper gone, still waiting");
        }
        if done {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[test]
    fn foreground_child_leads_its_group_without_a_terminal() {
        let control = NativeControl::new(true, None);
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "read line; exit 3"]).stdin(Stdio::null());
        control.configure(&mut cmd, None, true);
        let mut child = cmd.spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        assert_eq!(unistd::getpgid(Some(pid)).unwrap(), pid);
        assert_eq!(child.wait().unwrap().code(), Some(3));
    }
}
