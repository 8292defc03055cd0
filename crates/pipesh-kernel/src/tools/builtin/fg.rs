//! fg / bg — Resume a stopped job in the foreground or background.

use std::io::Write;

use async_trait::async_trait;
use pipesh_types::{GroupState, JobId, ParamSchema, PipelineMode, ToolSchema};

use super::parse_job_ref;
use crate::scheduler::JobManager;
use crate::tools::{Builtin, ExecContext, StageIo};

/// Pick the job named by `args[0]`, or the current job.
async fn target_job(
    name: &str,
    args: &[String],
    io: &mut StageIo,
    manager: &JobManager,
    own: Option<JobId>,
) -> Option<JobId> {
    match args.first() {
        Some(arg) => match parse_job_ref(arg) {
            Some(id) => Some(id),
            None => {
                io.diagnostic(format!("{name}: invalid job id: {arg}"));
                None
            }
        },
        None => match manager.current(own).await {
            Some(id) => Some(id),
            None => {
                io.diagnostic(format!("{name}: no current job"));
                None
            }
        },
    }
}

/// Fg tool: resume a job in the foreground.
pub struct Fg;

#[async_trait]
impl Builtin for Fg {
    fn name(&self) -> &str {
        "fg"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("fg", "Resume a stopped job in the foreground")
            .param(ParamSchema::optional(
                "job",
                "job",
                "Job to resume (defaults to the most recently stopped job)",
            ))
            .example("Resume last stopped job", "fg")
            .example("Resume specific job", "fg %2")
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        let Some(manager) = ctx.jobs.clone() else {
            io.diagnostic("fg: no job manager");
            return 1;
        };
        let Some(id) = target_job("fg", args, io, &manager, ctx.job).await else {
            return 1;
        };

        let command = manager.command(id).await.unwrap_or_default();
        let _ = writeln!(io.stdout, "{command}");
        let _ = io.stdout.flush();

        match manager.resume(id, PipelineMode::Foreground).await {
            Ok(GroupState::Stopped) => 148,
            Ok(_) => match manager.wait(id).await {
                Ok(result) => {
                    manager.remove(id).await;
                    result.returncode().unwrap_or(0)
                }
                Err(e) => {
                    io.diagnostic(format!("fg: {e}"));
                    1
                }
            },
            Err(e) => {
                io.diagnostic(format!("fg: {e}"));
                1
            }
        }
    }
}

/// Bg tool: continue a stopped job without waiting for it.
pub struct Bg;

#[async_trait]
impl Builtin for Bg {
    fn name(&self) -> &str {
        "bg"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("bg", "Continue a stopped job in the background")
            .param(ParamSchema::optional("job", "job", "Job to continue (defaults to the current job)"))
            .example("Continue last stopped job", "bg")
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        let Some(manager) = ctx.jobs.clone() else {
            io.diagnostic("bg: no job manager");
            return 1;
        };
        let Some(id) = target_job("bg", args, io, &manager, ctx.job).await else {
            return 1;
        };

        match manager.resume(id, PipelineMode::Background).await {
            Ok(_) => {
                let command = manager.command(id).await.unwrap_or_default();
                let _ = writeln!(io.stdout, "[{id}]+ {command} &");
                0
            }
            Err(e) => {
                io.diagnostic(format!("bg: {e}"));
                1
            }
        }
    }
}
