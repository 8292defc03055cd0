//! Controlling-terminal ownership.

use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Mutex};

use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd::{self, Pid};

use crate::error::JobControlError;

/// The shell's controlling terminal.
///
/// At most one process group owns it at a time. Foreground jobs take it
/// through a [`TerminalLease`], which hands it back to the shell when
/// dropped, whether the job exited, stopped, or its waiter was cancelled.
#[derive(Debug)]
pub struct Terminal {
    /// Close-on-exec duplicate of the shell's stdin, so children can reach
    /// the tty after their own stdin is redirected.
    tty: OwnedFd,
    shell_pgid: Pid,
    owner: Mutex<Option<u32>>,
}

impl Terminal {
    /// Put the shell in its own group and make it the terminal's foreground.
    pub fn claim() -> Result<Arc<Self>, JobControlError> {
        for sig in [Signal::SIGTTOU, Signal::SIGTTIN, Signal::SIGTSTP, Signal::SIGQUIT] {
            // SAFETY: installing SIG_IGN has no handler code to race with.
            unsafe { signal::signal(sig, SigHandler::SigIgn) }
                .map_err(|e| JobControlError::os("signal", e))?;
        }

        let pid = unistd::getpid();
        if unistd::getpgrp() != pid {
            // Fails for session leaders, which already lead their group.
            if let Err(e) = unistd::setpgid(pid, pid) {
                tracing::debug!("setpgid for shell failed: {}", e);
            }
        }
        let shell_pgid = unistd::getpgrp();
        let tty = std::io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .map_err(|e| JobControlError::os("dup", e))?;
        unistd::tcsetpgrp(&tty, shell_pgid).map_err(|e| JobControlError::os("tcsetpgrp", e))?;

        tracing::debug!(pgid = %shell_pgid, "shell owns the terminal");
        Ok(Arc::new(Self {
            tty,
            shell_pgid,
            owner: Mutex::new(None),
        }))
    }

    pub fn shell_pgid(&self) -> u32 {
        self.shell_pgid.as_raw() as u32
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.tty.as_raw_fd()
    }

    /// Give the terminal to `pgid` until the lease is dropped.
    pub fn lease(self: &Arc<Self>, pgid: u32) -> Result<TerminalLease, JobControlError> {
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        unistd::tcsetpgrp(&self.tty, Pid::from_raw(pgid as i32))
            .map_err(|e| JobControlError::os("tcsetpgrp", e))?;
        if let Some(previous) = owner.replace(pgid) {
            tracing::debug!(previous, pgid, "terminal moved between job groups");
        }
        Ok(TerminalLease {
            terminal: Arc::clone(self),
            pgid,
        })
    }

    fn reclaim(&self, pgid: u32) -> Result<(), JobControlError> {
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        if *owner != Some(pgid) {
            // A later lease took over; it will reclaim.
            return Ok(());
        }
        *owner = None;
        unistd::tcsetpgrp(&self.tty, self.shell_pgid)
            .map_err(|e| JobControlError::os("tcsetpgrp", e))
    }
}

/// Scoped terminal ownership for one job group.
#[derive(Debug)]
pub struct TerminalLease {
    terminal: Arc<Terminal>,
    pgid: u32,
}

impl TerminalLease {
    pub fn pgid(&self) -> u32 {
        self.pgid
    }
}

impl Drop for TerminalLease {
    fn drop(&mut self) {
        if let Err(e) = self.terminal.reclaim(self.pgid) {
            tracing::warn!("failed to reclaim terminal: {}", e);
        }
    }
}
