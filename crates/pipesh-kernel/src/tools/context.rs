//! Execution context and stream ends for in-process stages.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pipesh_types::JobId;

use crate::scheduler::JobManager;
use crate::session::Session;

/// A builtin's three standard streams.
pub struct StageIo {
    pub stdin: Box<dyn Read + Send>,
    pub stdout: Box<dyn Write + Send>,
    pub stderr: Box<dyn Write + Send>,
    /// Terminal device behind stdin, when the stage reads the shell's tty.
    pub stdin_tty: Option<PathBuf>,
}

impl StageIo {
    pub fn new(
        stdin: impl Read + Send + 'static,
        stdout: impl Write + Send + 'static,
        stderr: impl Write + Send + 'static,
    ) -> Self {
        Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            stdin_tty: None,
        }
    }

    pub fn with_stdin_tty(mut self, tty: impl Into<PathBuf>) -> Self {
        self.stdin_tty = Some(tty.into());
        self
    }

    /// Write one diagnostic line to stderr, ignoring failures.
    pub fn diagnostic(&mut self, message: impl std::fmt::Display) {
        let _ = writeln!(self.stderr, "{message}");
        let _ = self.stderr.flush();
    }
}

impl std::fmt::Debug for StageIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageIo").finish_non_exhaustive()
    }
}

/// What a builtin can see of the shell.
#[derive(Clone)]
pub struct ExecContext {
    pub session: Arc<Session>,
    /// Session environment merged with the stage's overrides.
    pub env: BTreeMap<String, String>,
    pub jobs: Option<Arc<JobManager>>,
    /// The pipeline this stage belongs to.
    pub job: Option<JobId>,
    /// Index of this stage within its pipeline.
    pub stage: usize,
}

impl ExecContext {
    pub fn new(session: Arc<Session>) -> Self {
        let env = session.env();
        Self {
            session,
            env,
            jobs: None,
            job: None,
            stage: 0,
        }
    }

    pub fn with_jobs(mut self, jobs: Arc<JobManager>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn with_job(mut self, id: JobId) -> Self {
        self.job = Some(id);
        self
    }

    pub fn with_env_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        self.env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn cwd(&self) -> PathBuf {
        self.session.cwd()
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// Resolve `path` against the session's working directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.cwd().join(path)
    }
}

impl std::fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecContext")
            .field("cwd", &self.cwd())
            .field("stage", &self.stage)
            .field("has_jobs", &self.jobs.is_some())
            .finish()
    }
}
