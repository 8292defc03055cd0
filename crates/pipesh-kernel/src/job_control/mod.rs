//! Job control backends.
//!
//! ```text
//!                ┌──────────────────────┐
//!   probe() ───► │  dyn JobControl      │
//!                ├──────────┬───────────┤
//!                │ Native   │ Tasks     │
//!                │ (unix)   │ (portable)│
//!                └────┬─────┴─────┬─────┘
//!                     │           │
//!          waitpid/killpg    try_wait/kill
//! ```
//!
//! The backend is picked once per kernel. The native backend reaps with
//! `waitpid(WUNTRACED | WCONTINUED)` and signals whole process groups; the
//! task backend only knows child handles, so it can run background jobs
//! but cannot suspend them or hand them the terminal.

#[cfg(unix)]
mod native;
mod tasks;
#[cfg(unix)]
mod terminal;

use std::process::{Child, Command};
use std::sync::{Arc, Mutex};

#[cfg(unix)]
pub use native::NativeControl;
pub use tasks::TaskControl;
#[cfg(unix)]
pub use terminal::{Terminal, TerminalLease};

use crate::config::ShellConfig;
use crate::error::JobControlError;
use crate::scheduler::StageSender;

/// What the active backend can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Process groups, stop/continue, terminal transfer.
    NativeProcessGroups,
    /// Child handles only: wait and kill.
    TaskHandles,
}

/// A signal a job can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSignal {
    Interrupt,
    Terminate,
    Kill,
    Stop,
    Continue,
    Hangup,
    Other(i32),
}

impl JobSignal {
    /// Parse `INT`, `SIGINT`, `int`, or a number.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim_start_matches('-');
        if let Ok(n) = s.parse::<i32>() {
            return Some(Self::from_number(n));
        }
        let upper = s.to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        match name {
            "INT" => Some(JobSignal::Interrupt),
            "TERM" => Some(JobSignal::Terminate),
            "KILL" => Some(JobSignal::Kill),
            "STOP" | "TSTP" => Some(JobSignal::Stop),
            "CONT" => Some(JobSignal::Continue),
            "HUP" => Some(JobSignal::Hangup),
            "QUIT" => Some(JobSignal::Other(3)),
            "USR1" => Some(JobSignal::Other(10)),
            "USR2" => Some(JobSignal::Other(12)),
            _ => None,
        }
    }

    pub fn from_number(n: i32) -> Self {
        match n {
            1 => JobSignal::Hangup,
            2 => JobSignal::Interrupt,
            9 => JobSignal::Kill,
            15 => JobSignal::Terminate,
            18 => JobSignal::Continue,
            20 => JobSignal::Stop,
            other => JobSignal::Other(other),
        }
    }

    /// POSIX signal number.
    pub fn number(self) -> i32 {
        match self {
            JobSignal::Hangup => 1,
            JobSignal::Interrupt => 2,
            JobSignal::Kill => 9,
            JobSignal::Terminate => 15,
            JobSignal::Continue => 18,
            JobSignal::Stop => 20,
            JobSignal::Other(n) => n,
        }
    }
}

/// One external stage process.
#[derive(Debug, Clone)]
pub struct Member {
    pub pid: u32,
    pub(crate) child: Arc<Mutex<Child>>,
}

impl Member {
    pub(crate) fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Arc::new(Mutex::new(child)),
        }
    }
}

/// The live members of a job at the moment a signal is sent.
#[derive(Debug, Clone)]
pub struct SignalTarget {
    /// Set when the job leads its own process group.
    pub pgid: Option<u32>,
    pub members: Vec<Member>,
}

/// Platform job-control backend.
pub trait JobControl: Send + Sync + std::fmt::Debug {
    fn capability(&self) -> Capability;

    /// Whether pipelines are placed in their own process groups.
    fn job_control_enabled(&self) -> bool;

    /// The controlling terminal, when the shell owns one.
    #[cfg(unix)]
    fn terminal(&self) -> Option<Arc<Terminal>>;

    /// Prepare an external stage's command. `leader` is the pgid to join,
    /// `None` to start a new group. A `foreground` child takes the terminal
    /// for its group before it execs.
    fn configure(&self, cmd: &mut Command, leader: Option<u32>, foreground: bool);

    /// Start reaping `member`, reporting state changes for stage `index`.
    fn watch(&self, member: &Member, index: usize, events: StageSender) -> std::io::Result<()>;

    fn signal(&self, target: &SignalTarget, signal: JobSignal) -> Result<(), JobControlError>;
}

/// Terminal ownership held by a foreground job group.
///
/// Dropping it hands the terminal back to the shell.
#[must_use]
#[derive(Debug)]
pub struct ForegroundGuard {
    pgid: u32,
    #[cfg(unix)]
    _lease: TerminalLease,
}

impl ForegroundGuard {
    pub fn pgid(&self) -> u32 {
        self.pgid
    }
}

/// Give the terminal to `pgid` if this session owns one.
#[cfg(unix)]
pub fn take_terminal(control: &dyn JobControl, pgid: u32) -> Result<Option<ForegroundGuard>, JobControlError> {
    match control.terminal() {
        Some(terminal) => Ok(Some(ForegroundGuard {
            pgid,
            _lease: terminal.lease(pgid)?,
        })),
        None => Ok(None),
    }
}

#[cfg(not(unix))]
pub fn take_terminal(_control: &dyn JobControl, _pgid: u32) -> Result<Option<ForegroundGuard>, JobControlError> {
    Ok(None)
}

/// Pick the backend for this platform and configuration.
pub fn probe(config: &ShellConfig) -> Arc<dyn JobControl> {
    if config.portable_jobs {
        tracing::debug!("task-handle job control (forced)");
        return Arc::new(TaskControl::new());
    }
    platform_control(config)
}

#[cfg(unix)]
fn platform_control(config: &ShellConfig) -> Arc<dyn JobControl> {
    use std::io::IsTerminal;

    let tty = std::io::stdin().is_terminal();
    let enabled = config.job_control.unwrap_or(config.interactive && tty);
    let terminal = if enabled && config.interactive && tty {
        match Terminal::claim() {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!("cannot take the terminal, job control limited: {}", e);
                None
            }
        }
    } else {
        None
    };
    tracing::debug!(enabled, has_terminal = terminal.is_some(), "native job control");
    Arc::new(NativeControl::new(enabled, terminal))
}

#[cfg(not(unix))]
fn platform_control(_config: &ShellConfig) -> Arc<dyn JobControl> {
    tracing::debug!("task-handle job control");
    Arc::new(TaskControl::new())
}
