//! pwd — Print the session's working directory.

use std::io::Write;

use async_trait::async_trait;
use pipesh_types::ToolSchema;

use super::write_failure_code;
use crate::tools::{Builtin, ExecContext, StageIo};

pub struct Pwd;

#[async_trait]
impl Builtin for Pwd {
    fn name(&self) -> &str {
        "pwd"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("pwd", "Print the working directory")
    }

    async fn invoke(&self, _args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        match writeln!(io.stdout, "{}", ctx.cwd().display()) {
            Ok(()) => 0,
            Err(e) => write_failure_code(&e),
        }
    }
}
