//! Builtin commands.
//!
//! Coreutils (`echo`, `cat`, `pwd`, `tee`, `tty`, `uname`, `yes`, `true`,
//! `false`) are in-process replacements for the usual binaries. Session
//! builtins edit the shell's cwd and environment. Job builtins drive the job
//! manager.

mod cat;
mod cd;
mod echo;
mod env;
mod fg;
mod jobs;
mod kill;
mod pwd;
mod tee;
mod true_false;
mod tty;
mod uname;
mod wait;
mod yes;

pub use cat::Cat;
pub use cd::Cd;
pub use echo::Echo;
pub use env::{Export, Unset};
pub use fg::{Bg, Fg};
pub use jobs::Jobs;
pub use kill::Kill;
pub use pwd::Pwd;
pub use tee::Tee;
pub use true_false::{False, True};
pub use tty::Tty;
pub use uname::Uname;
pub use wait::Wait;
pub use yes::Yes;

use std::io::ErrorKind;

use pipesh_types::JobId;

use super::BuiltinRegistry;

pub fn register_coreutils(registry: &mut BuiltinRegistry) {
    registry.register(Echo);
    registry.register(Cat);
    registry.register(Pwd);
    registry.register(Tee);
    registry.register(Yes);
    registry.register(True);
    registry.register(False);
    registry.register(Tty);
    registry.register(Uname);
}

pub fn register_session(registry: &mut BuiltinRegistry) {
    registry.register(Cd);
    registry.register(Export);
    registry.register(Unset);
}

pub fn register_jobs(registry: &mut BuiltinRegistry) {
    registry.register(Jobs);
    registry.register(Fg);
    registry.register(Bg);
    registry.register(Wait);
    registry.register(Kill);
}

/// Parse `%N` or `N` into a job id.
pub(crate) fn parse_job_ref(s: &str) -> Option<JobId> {
    s.strip_prefix('%').unwrap_or(s).parse::<u64>().ok().map(JobId)
}

/// Exit code for a failed write: a closed reader is a normal way for a
/// producer to finish.
pub(crate) fn write_failure_code(err: &std::io::Error) -> i32 {
    if err.kind() == ErrorKind::BrokenPipe { 0 } else { 1 }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_refs() {
        assert_eq!(parse_job_ref("%3"), Some(JobId(3)));
        assert_eq!(parse_job_ref("7"), Some(JobId(7)));
        assert_eq!(parse_job_ref("%x"), None);
    }
}
