//! cd — Change the session's working directory.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use pipesh_types::{ParamSchema, ToolSchema};

use crate::tools::{Builtin, ExecContext, StageIo};

pub struct Cd;

#[async_trait]
impl Builtin for Cd {
    fn name(&self) -> &str {
        "cd"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("cd", "Change the working directory")
            .param(ParamSchema::optional("dir", "string", "Target directory; `-` for the previous one (default: $HOME)"))
            .example("Go home", "cd")
            .example("Go back", "cd -")
    }

    fn mutates_session(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        let (target, announce) = match args.first().map(String::as_str) {
            None => match ctx.var("HOME") {
                Some(home) => (PathBuf::from(home), false),
                None => {
                    io.diagnostic("cd: HOME not set");
                    return 1;
                }
            },
            Some("-") => match ctx.session.prev_cwd() {
                Some(prev) => (prev, true),
                None => {
                    io.diagnostic("cd: no previous directory");
                    return 1;
                }
            },
            Some(dir) => (PathBuf::from(dir), false),
        };

        match ctx.session.set_cwd(&target) {
            Ok(now) => {
                ctx.env.insert("PWD".to_string(), now.display().to_string());
                if announce {
                    let _ = writeln!(io.stdout, "{}", now.display());
                }
                0
            }
            Err(e) => {
                io.diagnostic(format!("cd: {}: {}", target.display(), e));
                1
            }
        }
    }
}
