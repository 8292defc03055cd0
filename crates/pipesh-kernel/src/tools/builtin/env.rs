//! export / unset — Edit the session environment.

use std::io::Write;

use async_trait::async_trait;
use pipesh_types::{ParamSchema, ToolSchema};

use crate::tools::{Builtin, ExecContext, StageIo};

pub struct Export;

#[async_trait]
impl Builtin for Export {
    fn name(&self) -> &str {
        "export"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("export", "Set environment variables for later commands")
            .param(ParamSchema::optional("assignments", "string", "NAME=VALUE pairs; none lists the environment"))
            .example("Set a variable", "export EDITOR=vi")
    }

    fn mutates_session(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        if args.is_empty() {
            for (key, value) in ctx.session.env() {
                if writeln!(io.stdout, "{key}={value}").is_err() {
                    return 1;
                }
            }
            return 0;
        }

        let mut code = 0;
        for assignment in args {
            match assignment.split_once('=') {
                Some((name, value)) if valid_name(name) => {
                    ctx.session.set_var(name, value);
                    ctx.env.insert(name.to_string(), value.to_string());
                }
                _ => {
                    io.diagnostic(format!("export: not a valid assignment: {assignment}"));
                    code = 1;
                }
            }
        }
        code
    }
}

pub struct Unset;

#[async_trait]
impl Builtin for Unset {
    fn name(&self) -> &str {
        "unset"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("unset", "Remove environment variables")
            .param(ParamSchema::required("names", "string", "Variables to remove"))
    }

    fn mutates_session(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        if args.is_empty() {
            io.diagnostic(self.schema().usage());
            return 2;
        }
        for name in args {
            ctx.session.remove_var(name);
            ctx.env.remove(name);
        }
        0
    }
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
