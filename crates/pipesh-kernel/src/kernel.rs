//! The Kernel: one shell session's pipeline engine.
//!
//! The Kernel owns everything a pipeline runs against:
//! - Session state (working directory, environment)
//! - Launcher (aliases, builtins, search path)
//! - Job manager and the job-control backend
//! - Event bus for lifecycle notifications
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                          Kernel                          │
//! │  ┌────────────┐  ┌────────────────┐  ┌────────────────┐  │
//! │  │  Session   │  │    Launcher    │  │   JobControl   │  │
//! │  │ (cwd, env) │  │ (alias,builtin,│  │ (native groups │  │
//! │  │            │  │  search path)  │  │  or tasks)     │  │
//! │  └────────────┘  └────────────────┘  └────────────────┘  │
//! │  ┌──────────────────────────────┐  ┌──────────────────┐  │
//! │  │  PipelineRunner → JobManager │  │     EventBus     │  │
//! │  └──────────────────────────────┘  └──────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use pipesh_types::{PipelineEvent, ToolSchema};
use tokio::sync::broadcast;

use crate::config::ShellConfig;
use crate::decode::TextDecoder;
use crate::dispatch::{Launcher, ResolvedStage};
use crate::error::PipelineError;
use crate::events::EventBus;
use crate::job_control::{self, Capability, JobControl};
use crate::result::PipelineResult;
use crate::scheduler::{JobManager, PipelineRunner, RunnerOptions};
use crate::session::Session;
use crate::spec::{CommandSpec, Pipeline};
use crate::tools::{Alias, Builtin, BuiltinRegistry};

/// Executes pipelines for one session.
pub struct Kernel {
    config: ShellConfig,
    session: Arc<Session>,
    launcher: Arc<Launcher>,
    jobs: Arc<JobManager>,
    control: Arc<dyn JobControl>,
    events: EventBus,
    runner: PipelineRunner,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl Kernel {
    /// Create a kernel whose session starts from the process's own
    /// working directory and environment.
    pub fn new(config: ShellConfig) -> Result<Self> {
        let session = Session::from_process().context("Failed to read the process environment")?;
        Self::with_session(config, session)
    }

    /// Create a kernel around an existing session.
    pub fn with_session(config: ShellConfig, session: Session) -> Result<Self> {
        let decoder = TextDecoder::new(&config.encoding, config.encoding_errors)
            .with_context(|| format!("Invalid encoding in config: {}", config.encoding))?;
        let control = job_control::probe(&config);
        let events = EventBus::new();
        let jobs = Arc::new(JobManager::new(Arc::clone(&control), events.clone()));
        let launcher = Arc::new(Launcher::new(
            BuiltinRegistry::with_defaults(config.coreutils),
            config.search_path.clone(),
        ));
        let session = Arc::new(session);

        let runner = PipelineRunner::new(
            Arc::clone(&launcher),
            Arc::clone(&jobs),
            Arc::clone(&session),
            Arc::clone(&control),
            events.clone(),
            RunnerOptions {
                decoder,
                pipefail: config.pipefail,
                drain: config.capture_drain(),
                interactive: config.interactive,
            },
        );

        tracing::debug!(capability = ?control.capability(), "kernel ready");
        Ok(Self {
            config,
            session,
            launcher,
            jobs,
            control,
            events,
            runner,
        })
    }

    /// Run a pipeline. Foreground pipelines return once they exit or stop;
    /// background ones return as soon as every stage has started.
    #[tracing::instrument(level = "info", skip_all, fields(command = %pipeline.command_line()))]
    pub async fn run(&self, pipeline: Pipeline) -> Result<PipelineResult, PipelineError> {
        self.runner.run(pipeline).await
    }

    /// Add or replace a builtin under `name`.
    pub fn register_builtin(&self, name: impl Into<String>, builtin: Arc<dyn Builtin>) {
        self.launcher.register_builtin(name, builtin);
    }

    pub fn register_alias(&self, name: impl Into<String>, alias: Alias) {
        self.launcher.register_alias(name, alias);
    }

    pub fn unregister_alias(&self, name: &str) -> Option<Alias> {
        self.launcher.remove_alias(name)
    }

    /// Lifecycle events for every pipeline this kernel runs.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn jobs(&self) -> Arc<JobManager> {
        Arc::clone(&self.jobs)
    }

    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn capability(&self) -> Capability {
        self.control.capability()
    }

    /// Schema of a registered builtin, for help text.
    pub fn builtin_schema(&self, name: &str) -> Option<ToolSchema> {
        self.launcher.builtin_schema(name)
    }

    pub fn builtin_names(&self) -> Vec<String> {
        self.launcher.builtin_names()
    }

    /// Resolve a command name the way a stage would.
    pub fn resolve(&self, name: &str) -> ResolvedStage {
        self.launcher.resolve(&CommandSpec::new([name]), &self.session)
    }
}
