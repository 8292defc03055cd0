//! The pipeline coordinator.
//!
//! `run` owns the whole launch sequence: validate, allocate every pipe,
//! resolve and start the stages left to right, hand the pipeline to its
//! reaper, then either return at once (background) or wait until the
//! process group stops or exits (foreground).

use std::sync::Arc;
use std::time::Duration;

use pipesh_types::{GroupState, PipelineEvent, PipelineMode, StageState};
use tokio::sync::mpsc;

use super::job::{JobManager, JobShared};
use super::plumbing::Plumbing;
use super::reaper::{Reaper, StageEvent};
use crate::decode::TextDecoder;
use crate::dispatch::{EXIT_NOT_EXECUTABLE, LaunchRequest, Launched, Launcher, ResolvedStage};
use crate::error::PipelineError;
use crate::events::EventBus;
use crate::job_control::{self, ForegroundGuard, JobControl, JobSignal, Member, SignalTarget};
use crate::result::PipelineResult;
use crate::session::Session;
use crate::spec::Pipeline;
use crate::tools::ExecContext;

/// Runs pipelines against one session.
pub struct PipelineRunner {
    launcher: Arc<Launcher>,
    jobs: Arc<JobManager>,
    session: Arc<Session>,
    control: Arc<dyn JobControl>,
    events: EventBus,
    decoder: TextDecoder,
    default_pipefail: bool,
    drain: Duration,
    interactive: bool,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("control", &self.control)
            .field("default_pipefail", &self.default_pipefail)
            .field("drain", &self.drain)
            .field("interactive", &self.interactive)
            .finish_non_exhaustive()
    }
}

/// Settings the runner takes from the shell configuration.
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub decoder: TextDecoder,
    pub pipefail: bool,
    pub drain: Duration,
    pub interactive: bool,
}

impl PipelineRunner {
    pub fn new(
        launcher: Arc<Launcher>,
        jobs: Arc<JobManager>,
        session: Arc<Session>,
        control: Arc<dyn JobControl>,
        events: EventBus,
        options: RunnerOptions,
    ) -> Self {
        Self {
            launcher,
            jobs,
            session,
            control,
            events,
            decoder: options.decoder,
            default_pipefail: options.pipefail,
            drain: options.drain,
            interactive: options.interactive,
        }
    }

    /// Launch a pipeline.
    ///
    /// Only invalid pipelines and descriptor exhaustion fail here; a
    /// stage that cannot start shows up as 126 or 127 in the result.
    #[tracing::instrument(level = "debug", skip_all, fields(job = tracing::field::Empty, stages = pipeline.stages.len()))]
    pub async fn run(&self, pipeline: Pipeline) -> Result<PipelineResult, PipelineError> {
        pipeline.validate()?;

        let id = self.jobs.next_id();
        tracing::Span::current().record("job", tracing::field::display(id));
        let command = pipeline.command_line();
        let foreground = pipeline.mode == PipelineMode::Foreground;
        let count = pipeline.stages.len();

        let mut plumbing = Plumbing::allocate(count, pipeline.capture, pipeline.merge_stderr)
            .map_err(PipelineError::ResourceExhaustion)?;
        let stdout_buffer = plumbing.stdout.as_ref().map(|c| Arc::clone(&c.buffer));
        let stderr_buffer = plumbing.stderr.as_ref().map(|c| Arc::clone(&c.buffer));
        let tee = pipeline.capture.tees();
        let mut readers = Vec::with_capacity(2);
        let mut buffers = Vec::with_capacity(2);
        for stream in [plumbing.stdout.take(), plumbing.stderr.take()].into_iter().flatten() {
            buffers.push(Arc::clone(&stream.buffer));
            readers.push(stream.spawn_reader(tee).map_err(PipelineError::ResourceExhaustion)?);
        }

        let pipefail = pipeline.pipefail.unwrap_or(self.default_pipefail);
        let result = PipelineResult::pending(
            id,
            command.clone(),
            pipeline.capture,
            pipefail,
            self.decoder,
            stdout_buffer,
            stderr_buffer,
        );

        let resolved: Vec<ResolvedStage> = pipeline
            .stages
            .iter()
            .map(|spec| self.launcher.resolve(spec, &self.session))
            .collect();
        // Session-mutating builtins are serialized against each other.
        let gate = if resolved.iter().any(ResolvedStage::mutates_session) {
            Some(self.session.lock_gate().await)
        } else {
            None
        };

        let job = Arc::new(JobShared::new(id, command.clone(), result.clone(), &resolved, foreground));
        let (tx, rx) = mpsc::unbounded_channel();
        let inline = foreground && count == 1;
        let own_group = self.control.job_control_enabled();
        let base_ctx = ExecContext::new(Arc::clone(&self.session))
            .with_jobs(Arc::clone(&self.jobs))
            .with_job(id);

        let mut leader: Option<u32> = None;
        let mut guard: Option<ForegroundGuard> = None;
        let mut members: Vec<(usize, Member)> = Vec::new();

        let stages = pipeline.stages.iter().zip(resolved).zip(plumbing.stages);
        for (index, ((spec, stage), ends)) in stages.enumerate() {
            let ctx = base_ctx.clone().with_env_overrides(&spec.env);
            let request = LaunchRequest {
                index,
                spec,
                stage,
                ends,
                leader,
                inline,
                foreground,
            };
            match self.launcher.launch(request, ctx, self.control.as_ref(), &tx).await {
                Launched::Process(member) => {
                    let pid = member.pid;
                    let pgid = if own_group { Some(*leader.get_or_insert(pid)) } else { None };
                    job.attach(index, member.clone(), pgid);
                    if foreground && guard.is_none() && pgid == Some(pid) {
                        match job_control::take_terminal(self.control.as_ref(), pid) {
                            Ok(taken) => guard = taken,
                            Err(e) => tracing::warn!(job = %id, "cannot hand the terminal to the pipeline: {}", e),
                        }
                    }
                    members.push((index, member));
                }
                Launched::Task => job.mark_running(index),
                Launched::Finished(code) => {
                    let _ = tx.send(StageEvent {
                        index,
                        state: StageState::Exited(code),
                    });
                }
            }
        }

        // Reaping starts only after every stage exists, so an early-exiting
        // leader stays a zombie and keeps its group id valid for joiners.
        for (index, member) in members {
            if let Err(e) = self.control.watch(&member, index, tx.clone()) {
                tracing::error!(job = %id, pid = member.pid, "cannot watch stage: {}", e);
                self.abandon(member);
                let _ = tx.send(StageEvent {
                    index,
                    state: StageState::Exited(EXIT_NOT_EXECUTABLE),
                });
            }
        }
        drop(tx);

        job.launched();
        result.set_pids(job.pids());
        if let Some(pgid) = guard.as_ref().map(ForegroundGuard::pgid) {
            result.set_terminal_pgid(pgid);
            job.set_terminal_owner(true);
        }
        self.jobs.register(Arc::clone(&job)).await;
        self.events.emit(PipelineEvent::Started {
            pipeline_id: id,
            command: command.clone(),
        });

        let reaper = Reaper {
            job: Arc::clone(&job),
            events: rx,
            readers,
            buffers,
            drain: self.drain,
            bus: self.events.clone(),
            gate,
        };
        tokio::spawn(reaper.run());

        if !foreground {
            tracing::debug!(job = %id, "started in background");
            return Ok(result);
        }

        let state = job.settled().await;
        drop(guard);
        job.set_terminal_owner(false);
        if state == GroupState::Stopped {
            job.set_foreground(false);
            self.events.emit(PipelineEvent::Stopped { pipeline_id: id });
            if self.interactive {
                eprintln!("\n[{id}]+ Stopped\t{command}");
            }
        } else {
            self.jobs.remove(id).await;
        }
        Ok(result)
    }

    /// Kill and reap a stage nobody can watch.
    fn abandon(&self, member: Member) {
        let target = SignalTarget {
            pgid: None,
            members: vec![member.clone()],
        };
        if let Err(e) = self.control.signal(&target, JobSignal::Kill) {
            tracing::warn!(pid = member.pid, "cannot kill unwatched stage: {}", e);
        }
        let mut child = member.child.lock().unwrap_or_else(|e| e.into_inner());
        let _ = child.wait();
    }
}
