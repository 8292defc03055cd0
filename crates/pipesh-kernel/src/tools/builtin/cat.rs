//! cat — Concatenate files or stdin to stdout.

use std::fs::File;
use std::io::{ErrorKind, Read, Result as IoResult, Write};

use async_trait::async_trait;
use pipesh_types::{ParamSchema, ToolSchema};

use super::write_failure_code;
use crate::tools::{Builtin, ExecContext, StageIo};

pub struct Cat;

#[async_trait]
impl Builtin for Cat {
    fn name(&self) -> &str {
        "cat"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("cat", "Concatenate files to stdout")
            .param(ParamSchema::optional("files", "string", "Files to read; `-` or none reads stdin"))
            .example("Show a file", "cat notes.txt")
            .example("Pass stdin through", "echo hi | cat")
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        let stdin_only = [String::from("-")];
        let files = if args.is_empty() { &stdin_only[..] } else { args };

        let mut code = 0;
        for name in files {
            let copied = if name == "-" {
                std::io::copy(&mut io.stdin, &mut io.stdout)
            } else {
                match File::open(ctx.resolve_path(name)) {
                    Ok(mut file) => copy_file(&mut file, &mut io.stdout),
                    Err(e) => {
                        io.diagnostic(format!("cat: {name}: {e}"));
                        code = 1;
                        continue;
                    }
                }
            };
            if let Err(e) = copied {
                if e.kind() == ErrorKind::BrokenPipe {
                    return write_failure_code(&e);
                }
                io.diagnostic(format!("cat: {name}: {e}"));
                code = 1;
            }
        }
        let _ = io.stdout.flush();
        code
    }
}

fn copy_file(file: &mut File, out: &mut Box<dyn Write + Send>) -> IoResult<u64> {
    let mut buf = [0u8; 8192];
    let mut total = 0;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        out.write_all(&buf[..n])?;
        total += n as u64;
    }
}
