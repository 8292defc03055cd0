//! Parsed pipeline descriptions handed over by the parser.

use std::collections::BTreeMap;
use std::sync::Arc;

use pipesh_types::{CaptureMode, ExecutableKind, FdSource, FileMode, InvalidSpecError, PipelineMode};

use crate::tools::Builtin;

/// Immutable description of one stage to launch.
#[derive(Clone, Default)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    /// Pins resolution to one layer. `None` runs the full chain.
    pub kind: Option<ExecutableKind>,
    /// A callable passed in place of a command name. `argv` then holds
    /// only its arguments.
    pub callable: Option<Arc<dyn Builtin>>,
    pub stdin: Option<FdSource>,
    pub stdout: Option<FdSource>,
    pub stderr: Option<FdSource>,
    /// Extra environment for this stage only.
    pub env: BTreeMap<String, String>,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("argv", &self.argv)
            .field("kind", &self.kind)
            .field("callable", &self.callable.as_ref().map(|c| c.name().to_string()))
            .field("stdin", &self.stdin)
            .field("stdout", &self.stdout)
            .field("stderr", &self.stderr)
            .field("env", &self.env)
            .finish()
    }
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A stage that runs `callable` in-process with `args`.
    pub fn callable<I, S>(callable: Arc<dyn Builtin>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: args.into_iter().map(Into::into).collect(),
            kind: Some(ExecutableKind::Builtin),
            callable: Some(callable),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: ExecutableKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn stdin_from(mut self, source: FdSource) -> Self {
        self.stdin = Some(source);
        self
    }

    pub fn stdout_to(mut self, target: FdSource) -> Self {
        self.stdout = Some(target);
        self
    }

    pub fn stderr_to(mut self, target: FdSource) -> Self {
        self.stderr = Some(target);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Name used for resolution and diagnostics.
    pub fn name(&self) -> &str {
        match &self.callable {
            Some(c) => c.name(),
            None => self.argv.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// Check the spec can be executed. `stage` is only used for messages.
    pub fn validate(&self, stage: usize) -> Result<(), InvalidSpecError> {
        if self.callable.is_none() {
            match self.argv.first() {
                None => return Err(InvalidSpecError::EmptyArgv { stage }),
                Some(name) if name.is_empty() => {
                    return Err(InvalidSpecError::EmptyName { stage });
                }
                Some(_) => {}
            }
        }

        for (stream, redirect, input) in [
            ("stdin", &self.stdin, true),
            ("stdout", &self.stdout, false),
            ("stderr", &self.stderr, false),
        ] {
            match redirect {
                Some(FdSource::File { path, mode }) => {
                    if path.as_os_str().is_empty() {
                        return Err(InvalidSpecError::EmptyRedirectPath { stage, stream });
                    }
                    match (input, mode) {
                        (true, FileMode::Write | FileMode::Append) => {
                            return Err(InvalidSpecError::WrongFileMode { stage, stream, mode: "write" });
                        }
                        (false, FileMode::Read) => {
                            return Err(InvalidSpecError::WrongFileMode { stage, stream, mode: "read" });
                        }
                        _ => {}
                    }
                }
                Some(FdSource::Descriptor(fd)) if *fd < 0 => {
                    return Err(InvalidSpecError::NegativeDescriptor { stage, stream, fd: *fd });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Shell-quoted rendering, e.g. `grep 'a b' > out.txt`.
    pub fn command_line(&self) -> String {
        let mut words: Vec<&str> = Vec::with_capacity(self.argv.len() + 1);
        if let Some(c) = &self.callable {
            words.push(c.name());
        }
        words.extend(self.argv.iter().map(String::as_str));
        let mut line = shlex::try_join(words.iter().copied()).unwrap_or_else(|_| words.join(" "));
        for (op, redirect) in [("<", &self.stdin), (">", &self.stdout), ("2>", &self.stderr)] {
            if let Some(r) = redirect {
                line.push(' ');
                line.push_str(&r.render(op));
            }
        }
        line
    }
}

/// A sequence of stages connected by pipes.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub stages: Vec<CommandSpec>,
    pub mode: PipelineMode,
    pub capture: CaptureMode,
    /// Point every stage's stderr at its stdout destination.
    pub merge_stderr: bool,
    /// `None` uses the session default.
    pub pipefail: Option<bool>,
}

impl Pipeline {
    pub fn new(stages: Vec<CommandSpec>) -> Self {
        Self {
            stages,
            ..Self::default()
        }
    }

    /// Single-stage pipeline from an argv.
    pub fn command<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(vec![CommandSpec::new(argv)])
    }

    pub fn pipe(mut self, stage: CommandSpec) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn background(mut self) -> Self {
        self.mode = PipelineMode::Background;
        self
    }

    pub fn capture(mut self, capture: CaptureMode) -> Self {
        self.capture = capture;
        self
    }

    pub fn merge_stderr(mut self) -> Self {
        self.merge_stderr = true;
        self
    }

    pub fn pipefail(mut self, pipefail: bool) -> Self {
        self.pipefail = Some(pipefail);
        self
    }

    pub fn validate(&self) -> Result<(), InvalidSpecError> {
        if self.stages.is_empty() {
            return Err(InvalidSpecError::EmptyPipeline);
        }
        for (i, stage) in self.stages.iter().enumerate() {
            stage.validate(i)?;
        }
        Ok(())
    }

    pub fn command_line(&self) -> String {
        let mut line = self
            .stages
            .iter()
            .map(CommandSpec::command_line)
            .collect::<Vec<_>>()
            .join(" | ");
        if self.merge_stderr {
            line.push_str(" 2>&1");
        }
        if self.mode == PipelineMode::Background {
            line.push_str(" &");
        }
        line
    }
}
