//! Core builtin trait.

use std::sync::Arc;

use async_trait::async_trait;
use pipesh_types::ToolSchema;

use super::context::{ExecContext, StageIo};

/// An in-process command.
///
/// Builtins read and write through [`StageIo`], which is wired to pipes,
/// redirect files, capture buffers, or the shell's own descriptors exactly
/// like an external stage would be. The return value is the exit code.
#[async_trait]
pub trait Builtin: Send + Sync {
    /// Name the builtin is registered under.
    fn name(&self) -> &str;

    /// Parameter schema, used for usage text.
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), "")
    }

    /// Whether this builtin edits the session (cwd, environment).
    ///
    /// Pipelines running such builtins are serialized per session.
    fn mutates_session(&self) -> bool {
        false
    }

    /// Run with `args` (not including the name).
    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32;
}

type BuiltinCallback = dyn Fn(&[String], &mut StageIo, &mut ExecContext) -> i32 + Send + Sync;

/// A builtin made from a plain closure.
pub struct FnBuiltin {
    name: String,
    callback: Box<BuiltinCallback>,
    mutates_session: bool,
}

impl FnBuiltin {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&[String], &mut StageIo, &mut ExecContext) -> i32 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Box::new(callback),
            mutates_session: false,
        }
    }

    pub fn mutating(mut self) -> Self {
        self.mutates_session = true;
        self
    }
}

#[async_trait]
impl Builtin for FnBuiltin {
    fn name(&self) -> &str {
        &self.name
    }

    fn mutates_session(&self) -> bool {
        self.mutates_session
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, ctx: &mut ExecContext) -> i32 {
        (self.callback)(args, io, ctx)
    }
}

/// Wrap a closure as a shareable builtin.
pub fn builtin_fn<F>(name: impl Into<String>, callback: F) -> Arc<dyn Builtin>
where
    F: Fn(&[String], &mut StageIo, &mut ExecContext) -> i32 + Send + Sync + 'static,
{
    Arc::new(FnBuiltin::new(name, callback))
}
