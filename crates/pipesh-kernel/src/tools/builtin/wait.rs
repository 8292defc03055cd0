//! wait — Wait for background jobs.

use async_trait::async_trait;
use pipesh_types::{ParamSchema, ToolSchema};

use super::parse_job_ref;
use crate::tools::{Builtin, ExecContext, StageIo};

pub struct Wait;

#[async_trait]
impl Builtin for Wait {
    fn name(&self) -> &str {
        "wait"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("wait", "Wait for jobs to finish")
            .param(ParamSchema::optional("jobs", "job", "Jobs to wait for (default: all)"))
            .example("Wait for everything", "wait")
            .example("Wait for one job", "wait %1")
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        let Some(manager) = ctx.jobs.clone() else {
            io.diagnostic("wait: no job manager");
            return 1;
        };

        if args.is_empty() {
            manager.wait_all_except(ctx.job).await;
            return 0;
        }

        let mut code = 0;
        for arg in args {
            let Some(id) = parse_job_ref(arg) else {
                io.diagnostic(format!("wait: invalid job id: {arg}"));
                code = 2;
                continue;
            };
            match manager.wait(id).await {
                Ok(result) => code = result.returncode().unwrap_or(0),
                Err(e) => {
                    io.diagnostic(format!("wait: {e}"));
                    code = 127;
                }
            }
        }
        code
    }
}
