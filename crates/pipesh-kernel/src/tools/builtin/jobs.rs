//! jobs — List background and stopped jobs.

use std::io::Write;

use async_trait::async_trait;
use pipesh_types::{ParamSchema, ToolSchema};

use crate::tools::{Builtin, ExecContext, StageIo};

pub struct Jobs;

#[async_trait]
impl Builtin for Jobs {
    fn name(&self) -> &str {
        "jobs"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("jobs", "List and manage background jobs")
            .param(ParamSchema::optional("--json", "bool", "Print the job table as JSON"))
            .param(ParamSchema::optional("--cleanup", "bool", "Forget finished jobs"))
            .example("List jobs", "jobs")
            .example("Machine-readable", "jobs --json")
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        let Some(manager) = ctx.jobs.clone() else {
            io.diagnostic("jobs: no job manager");
            return 1;
        };

        if args.iter().any(|a| a == "--cleanup") {
            let removed = manager.cleanup().await;
            let _ = writeln!(io.stdout, "Cleaned up {removed} finished job(s)");
            return 0;
        }

        let jobs = manager.list().await;

        if args.iter().any(|a| a == "--json") {
            return match serde_json::to_string_pretty(&jobs) {
                Ok(json) => match writeln!(io.stdout, "{json}") {
                    Ok(()) => 0,
                    Err(_) => 1,
                },
                Err(e) => {
                    io.diagnostic(format!("jobs: {e}"));
                    1
                }
            };
        }

        let current = manager.current(ctx.job).await;
        let mut text = String::new();
        for job in jobs {
            let marker = if Some(job.id) == current { '+' } else { ' ' };
            text.push_str(&format!("[{}]{} {:<8} {}\n", job.id, marker, job.status.to_string(), job.command));
        }
        match io.stdout.write_all(text.as_bytes()) {
            Ok(()) => 0,
            Err(_) => 1,
        }
    }
}
