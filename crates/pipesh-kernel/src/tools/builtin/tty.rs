//! tty — Print the terminal connected to stdin.

use std::io::Write;

use async_trait::async_trait;
use pipesh_types::{ParamSchema, ToolSchema};

use super::write_failure_code;
use crate::tools::{Builtin, ExecContext, StageIo};

pub struct Tty;

#[async_trait]
impl Builtin for Tty {
    fn name(&self) -> &str {
        "tty"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("tty", "Print the file name of the terminal connected to stdin")
            .param(ParamSchema::optional("-s", "bool", "Print nothing, only set the exit code"))
            .example("Check for an interactive stdin", "tty -s")
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, _ctx: &mut ExecContext) -> i32 {
        let mut silent = false;
        for arg in args {
            match arg.as_str() {
                "-s" | "--silent" | "--quiet" => silent = true,
                other => {
                    io.diagnostic(format_args!("tty: extra operand '{other}'"));
                    return 2;
                }
            }
        }

        let (line, code) = match &io.stdin_tty {
            Some(path) => (path.display().to_string(), 0),
            None => ("not a tty".to_string(), 1),
        };
        if silent {
            return code;
        }
        match writeln!(io.stdout, "{line}") {
            Ok(()) => code,
            Err(e) => write_failure_code(&e).max(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::*;

    #[tokio::test]
    async fn test_tty_without_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let (mut io, out, _) = io_with_input("");
        let code = Tty.invoke(&[], &mut io, &mut ctx_in(dir.path())).await;
        assert_eq!(code, 1);
        assert_eq!(out.text(), "not a tty\n");
    }

    #[tokio::test]
    async fn test_tty_names_the_device() {
        let dir = tempfile::tempdir().unwrap();
        let (io, out, _) = io_with_input("");
        let mut io = io.with_stdin_tty("/dev/pts/4");
        let code = Tty.invoke(&[], &mut io, &mut ctx_in(dir.path())).await;
        assert_eq!(code, 0);
        assert_eq!(out.text(), "/dev/pts/4\n");
    }

    #[tokio::test]
    async fn test_tty_silent_and_bad_operand() {
        let dir = tempfile::tempdir().unwrap();
        let (mut io, out, err) = io_with_input("");
        assert_eq!(Tty.invoke(&args(&["-s"]), &mut io, &mut ctx_in(dir.path())).await, 1);
        assert_eq!(out.text(), "");
        assert_eq!(Tty.invoke(&args(&["extra"]), &mut io, &mut ctx_in(dir.path())).await, 2);
        assert!(err.text().contains("extra operand"));
    }
}
