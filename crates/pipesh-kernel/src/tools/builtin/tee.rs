//! tee — Copy stdin to stdout and files.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

use async_trait::async_trait;
use pipesh_types::{ParamSchema, ToolSchema};

use super::write_failure_code;
use crate::tools::{Builtin, ExecContext, StageIo};

pub struct Tee;

#[async_trait]
impl Builtin for Tee {
    fn name(&self) -> &str {
        "tee"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("tee", "Copy stdin to stdout and to each file")
            .param(ParamSchema::optional("-a", "bool", "Append instead of truncating"))
            .param(ParamSchema::optional("files", "string", "Files to write"))
            .example("Save and show", "make | tee build.log")
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        let (append, names) = match args.first().map(String::as_str) {
            Some("-a") => (true, &args[1..]),
            _ => (false, args),
        };

        let mut code = 0;
        let mut files: Vec<(String, File)> = Vec::new();
        for name in names {
            let opened = OpenOptions::new()
                .write(true)
                .create(true)
                .append(append)
                .truncate(!append)
                .open(ctx.resolve_path(name));
            match opened {
                Ok(f) => files.push((name.clone(), f)),
                Err(e) => {
                    io.diagnostic(format!("tee: {name}: {e}"));
                    code = 1;
                }
            }
        }

        let mut buf = [0u8; 8192];
        loop {
            let n = match io.stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    io.diagnostic(format!("tee: read error: {e}"));
                    return 1;
                }
            };
            if let Err(e) = io.stdout.write_all(&buf[..n]) {
                return write_failure_code(&e).max(code);
            }
            files.retain_mut(|(name, f)| match f.write_all(&buf[..n]) {
                Ok(()) => true,
                Err(e) => {
                    let _ = writeln!(io.stderr, "tee: {name}: {e}");
                    code = 1;
                    false
                }
            });
        }
        let _ = io.stdout.flush();
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::*;

    #[tokio::test]
    async fn test_tee_writes_stdout_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut io, out, _) = io_with_input("data\n");
        let code = Tee.invoke(&args(&["copy.txt"]), &mut io, &mut ctx_in(dir.path())).await;
        assert_eq!(code, 0);
        assert_eq!(out.text(), "data\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("copy.txt")).unwrap(), "data\n");
    }

    #[tokio::test]
    async fn test_tee_append() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("log"), "old\n").unwrap();
        let (mut io, _, _) = io_with_input("new\n");
        Tee.invoke(&args(&["-a", "log"]), &mut io, &mut ctx_in(dir.path())).await;
        assert_eq!(std::fs::read_to_string(dir.path().join("log")).unwrap(), "old\nnew\n");
    }
}
