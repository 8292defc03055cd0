//! kill — Send signals to jobs or processes.

use async_trait::async_trait;
use pipesh_types::{ParamSchema, ToolSchema};

use crate::job_control::JobSignal;
use crate::tools::{Builtin, ExecContext, StageIo};

/// Kill tool: send signals to processes or jobs.
pub struct Kill;

#[async_trait]
impl Builtin for Kill {
    fn name(&self) -> &str {
        "kill"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("kill", "Send a signal to a process or job")
            .param(ParamSchema::optional(
                "signal",
                "signal",
                "-SIG, -s SIG, or -N: TERM, KILL, INT, STOP, CONT, HUP, QUIT, USR1, USR2",
            ))
            .param(ParamSchema::required("target", "job", "Process ID or %N for a job"))
            .example("Terminate a job", "kill %1")
            .example("Kill a process by PID", "kill -s KILL 1234")
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        let mut signal = JobSignal::Terminate;
        let mut rest = args;
        match rest.first().map(String::as_str) {
            Some("-s") => {
                let Some(name) = rest.get(1) else {
                    io.diagnostic(self.schema().usage());
                    return 2;
                };
                match JobSignal::parse(name) {
                    Some(s) => signal = s,
                    None => {
                        io.diagnostic(format!("kill: unknown signal: {name}"));
                        return 1;
                    }
                }
                rest = &rest[2..];
            }
            Some(flag) if flag.starts_with('-') && flag.len() > 1 => {
                match JobSignal::parse(flag) {
                    Some(s) => signal = s,
                    None => {
                        io.diagnostic(format!("kill: unknown signal: {flag}"));
                        return 1;
                    }
                }
                rest = &rest[1..];
            }
            _ => {}
        }

        if rest.is_empty() {
            io.diagnostic(self.schema().usage());
            return 2;
        }

        let mut code = 0;
        for target in rest {
            if let Some(job) = target.strip_prefix('%') {
                let Some(manager) = ctx.jobs.clone() else {
                    io.diagnostic("kill: no job manager");
                    return 1;
                };
                let Some(id) = super::parse_job_ref(job) else {
                    io.diagnostic(format!("kill: invalid job id: {target}"));
                    code = 1;
                    continue;
                };
                if let Err(e) = manager.signal(id, signal).await {
                    io.diagnostic(format!("kill: {e}"));
                    code = 1;
                }
            } else {
                match target.parse::<u32>() {
                    Ok(pid) => {
                        if let Err(e) = signal_pid(pid, signal) {
                            io.diagnostic(format!("kill: ({pid}): {e}"));
                            code = 1;
                        }
                    }
                    Err(_) => {
                        io.diagnostic(format!("kill: invalid target: {target}"));
                        code = 1;
                    }
                }
            }
        }
        code
    }
}

#[cfg(unix)]
fn signal_pid(pid: u32, signal: JobSignal) -> Result<(), String> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let sig = match signal {
        JobSignal::Interrupt => Signal::SIGINT,
        JobSignal::Terminate => Signal::SIGTERM,
        JobSignal::Kill => Signal::SIGKILL,
        JobSignal::Stop => Signal::SIGTSTP,
        JobSignal::Continue => Signal::SIGCONT,
        JobSignal::Hangup => Signal::SIGHUP,
        JobSignal::Other(n) => Signal::try_from(n).map_err(|e| e.to_string())?,
    };
    kill(Pid::from_raw(pid as i32), sig).map_err(|e| e.to_string())
}

#[cfg(not(unix))]
fn signal_pid(_pid: u32, _signal: JobSignal) -> Result<(), String> {
    Err("signalling processes by pid is not supported on this platform".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::*;

    #[tokio::test]
    async fn test_kill_requires_target() {
        let dir = tempfile::tempdir().unwrap();
        let (mut io, _, err) = io_with_input("");
        let code = Kill.invoke(&args(&["-9"]), &mut io, &mut ctx_in(dir.path())).await;
        assert_eq!(code, 2);
        assert!(err.text().contains("usage: kill"));
    }

    #[tokio::test]
    async fn test_kill_unknown_signal() {
        let dir = tempfile::tempdir().unwrap();
        let (mut io, _, err) = io_with_input("");
        let code = Kill.invoke(&args(&["-s", "NOPE", "1"]), &mut io, &mut ctx_in(dir.path())).await;
        assert_eq!(code, 1);
        assert!(err.text().contains("unknown signal"));
    }
}
