//! echo — Print arguments.

use std::io::Write;

use async_trait::async_trait;
use pipesh_types::{ParamSchema, ToolSchema};

use super::write_failure_code;
use crate::tools::{Builtin, ExecContext, StageIo};

pub struct Echo;

#[async_trait]
impl Builtin for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("echo", "Print arguments separated by spaces")
            .param(ParamSchema::optional("-n", "bool", "Do not print the trailing newline"))
            .param(ParamSchema::optional("words", "string", "Words to print"))
            .example("Simple echo", "echo hello world")
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, _ctx: &mut ExecContext) -> i32 {
        let (newline, words) = match args.first().map(String::as_str) {
            Some("-n") => (false, &args[1..]),
            _ => (true, args),
        };
        let mut line = words.join(" ");
        if newline {
            line.push('\n');
        }
        match io.stdout.write_all(line.as_bytes()).and_then(|()| io.stdout.flush()) {
            Ok(()) => 0,
            Err(e) => write_failure_code(&e),
        }
    }
}
