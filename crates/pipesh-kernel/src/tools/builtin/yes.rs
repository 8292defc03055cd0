//! yes — Repeat a line until the reader goes away.

use std::io::Write;

use async_trait::async_trait;
use pipesh_types::{ParamSchema, ToolSchema};

use super::write_failure_code;
use crate::tools::{Builtin, ExecContext, StageIo};

pub struct Yes;

#[async_trait]
impl Builtin for Yes {
    fn name(&self) -> &str {
        "yes"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("yes", "Print a line repeatedly")
            .param(ParamSchema::optional("words", "string", "Line to repeat (default: y)"))
            .example("Answer every prompt", "yes | head -n 3")
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, _ctx: &mut ExecContext) -> i32 {
        let mut line = if args.is_empty() { "y".to_string() } else { args.join(" ") };
        line.push('\n');
        // Batch lines so each write is close to a pipe buffer.
        let batch = line.repeat((8192 / line.len()).max(1));
        loop {
            if let Err(e) = io.stdout.write_all(batch.as_bytes()) {
                return write_failure_code(&e);
            }
        }
    }
}
