//! Job table and per-pipeline process-group bookkeeping.
//!
//! Every pipeline gets a [`JobShared`] keyed by its id. Stage states change
//! only through [`StageEvent`]s applied by the pipeline's reaper; the
//! group state is derived from them and published on a watch channel that
//! foreground waiters and `fg` block on.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use pipesh_types::{
    ExecutableKind, GroupState, JobId, JobInfo, JobStatus, PipelineEvent, PipelineMode, StageState,
    StageStatus,
};
use tokio::sync::{Mutex, watch};

use super::reaper::StageEvent;
use crate::dispatch::ResolvedStage;
use crate::error::JobControlError;
use crate::events::EventBus;
use crate::job_control::{self, Capability, JobControl, JobSignal, Member, SignalTarget};
use crate::result::PipelineResult;

/// One stage as tracked for its whole lifetime.
#[derive(Debug, Clone)]
pub struct RunningStage {
    pub index: usize,
    pub argv: Vec<String>,
    /// `None` when the command could not be resolved.
    pub kind: Option<ExecutableKind>,
    pub pid: Option<u32>,
    pub state: StageState,
    member: Option<Member>,
}

/// Process-group view of a pipeline's external stages.
#[derive(Debug, Clone)]
pub struct ProcessGroup {
    /// Set when the pipeline leads its own group.
    pub pgid: Option<u32>,
    pub members: BTreeSet<u32>,
    pub terminal_owner: bool,
    pub foreground: bool,
    pub state: GroupState,
}

#[derive(Debug)]
struct JobState {
    stages: Vec<RunningStage>,
    group: ProcessGroup,
}

/// Shared state for one pipeline.
#[derive(Debug)]
pub(crate) struct JobShared {
    pub id: JobId,
    pub command: String,
    pub result: PipelineResult,
    state: StdMutex<JobState>,
    group_tx: watch::Sender<GroupState>,
}

impl JobShared {
    pub fn new(id: JobId, command: String, result: PipelineResult, stages: &[ResolvedStage], foreground: bool) -> Self {
        let stages = stages
            .iter()
            .enumerate()
            .map(|(index, stage)| RunningStage {
                index,
                argv: stage.argv.clone(),
                kind: stage.kind(),
                pid: None,
                state: StageState::Starting,
                member: None,
            })
            .collect();
        let (group_tx, _) = watch::channel(GroupState::Starting);
        Self {
            id,
            command,
            result,
            state: StdMutex::new(JobState {
                stages,
                group: ProcessGroup {
                    pgid: None,
                    members: BTreeSet::new(),
                    terminal_owner: false,
                    foreground,
                    state: GroupState::Starting,
                },
            }),
            group_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a spawned external stage.
    pub fn attach(&self, index: usize, member: Member, pgid: Option<u32>) {
        let mut state = self.lock();
        state.group.members.insert(member.pid);
        if state.group.pgid.is_none() {
            state.group.pgid = pgid;
        }
        if let Some(stage) = state.stages.get_mut(index) {
            stage.pid = Some(member.pid);
            stage.state = StageState::Running;
            stage.member = Some(member);
        }
    }

    /// Record a builtin running on a worker thread.
    pub fn mark_running(&self, index: usize) {
        if let Some(stage) = self.lock().stages.get_mut(index) {
            stage.state = StageState::Running;
        }
    }

    /// All stages launched; the group runs if anything is live.
    pub fn launched(&self) {
        let mut state = self.lock();
        if state.stages.iter().any(|s| s.state == StageState::Running) {
            self.transition(&mut state, GroupState::Running);
        }
    }

    /// Apply one wait notification. Reporting a stage that was already
    /// reaped is an invariant violation.
    pub fn apply(&self, event: StageEvent) {
        let mut state = self.lock();
        let Some(stage) = state.stages.get_mut(event.index) else {
            tracing::error!(job = %self.id, index = event.index, "event for unknown stage");
            debug_assert!(false, "event for unknown stage {}", event.index);
            return;
        };
        if stage.state.is_terminal() {
            tracing::error!(job = %self.id, index = event.index, "stage reported after it was reaped");
            debug_assert!(false, "stage {} reaped twice", event.index);
            return;
        }
        stage.state = event.state;

        if state.stages.iter().all(|s| s.state.is_terminal()) {
            // The reaper moves the group to Exited once the result is frozen.
            return;
        }
        let live: Vec<StageState> = state
            .stages
            .iter()
            .filter(|s| s.member.is_some() && !s.state.is_terminal())
            .map(|s| s.state)
            .collect();
        let next = if !live.is_empty() && live.iter().all(|s| matches!(s, StageState::Stopped(_))) {
            GroupState::Stopped
        } else {
            GroupState::Running
        };
        self.transition(&mut state, next);
    }

    pub fn all_terminal(&self) -> bool {
        self.lock().stages.iter().all(|s| s.state.is_terminal())
    }

    pub fn builtins_running(&self) -> bool {
        self.lock()
            .stages
            .iter()
            .any(|s| s.kind == Some(ExecutableKind::Builtin) && !s.state.is_terminal())
    }

    /// Final statuses in stage order.
    pub fn statuses(&self) -> Vec<StageStatus> {
        self.lock()
            .stages
            .iter()
            .map(|s| {
                s.state.status().unwrap_or_else(|| {
                    tracing::error!(job = %self.id, index = s.index, "stage never reported an exit");
                    StageStatus::Exited(255)
                })
            })
            .collect()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.lock().stages.iter().filter_map(|s| s.pid).collect()
    }

    pub fn pgid(&self) -> Option<u32> {
        self.lock().group.pgid
    }

    pub fn group(&self) -> ProcessGroup {
        self.lock().group.clone()
    }

    pub fn stages(&self) -> Vec<RunningStage> {
        self.lock().stages.clone()
    }

    pub fn group_state(&self) -> GroupState {
        self.lock().group.state
    }

    pub fn set_group(&self, next: GroupState) {
        let mut state = self.lock();
        self.transition(&mut state, next);
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.lock().group.foreground = foreground;
    }

    pub fn set_terminal_owner(&self, owner: bool) {
        self.lock().group.terminal_owner = owner;
    }

    /// Members still alive, for signalling.
    pub fn signal_target(&self) -> SignalTarget {
        let state = self.lock();
        SignalTarget {
            pgid: state.group.pgid,
            members: state
                .stages
                .iter()
                .filter(|s| !s.state.is_terminal())
                .filter_map(|s| s.member.clone())
                .collect(),
        }
    }

    /// Optimistically mark stopped stages running before SIGCONT, so a
    /// stage exiting before the continue notifications arrive doesn't make
    /// the group look stopped again.
    pub fn mark_resumed(&self) {
        let mut state = self.lock();
        for stage in state.stages.iter_mut() {
            if matches!(stage.state, StageState::Stopped(_)) {
                stage.state = StageState::Running;
            }
        }
        self.transition(&mut state, GroupState::Running);
    }

    /// Wait until the group stops or exits.
    pub async fn settled(&self) -> GroupState {
        let mut rx = self.group_tx.subscribe();
        match rx
            .wait_for(|s| matches!(s, GroupState::Stopped | GroupState::Exited))
            .await
        {
            Ok(state) => *state,
            Err(_) => self.group_state(),
        }
    }

    pub fn info(&self) -> JobInfo {
        let state = self.lock();
        let code = self.result.returncode();
        let status = match (state.group.state, code) {
            (GroupState::Stopped, _) => JobStatus::Stopped,
            (_, Some(0)) => JobStatus::Done,
            (_, Some(_)) => JobStatus::Failed,
            (_, None) => JobStatus::Running,
        };
        JobInfo {
            id: self.id,
            command: self.command.clone(),
            status,
            pgid: state.group.pgid,
            pids: state.stages.iter().filter_map(|s| s.pid).collect(),
            code,
        }
    }

    fn transition(&self, state: &mut JobState, next: GroupState) {
        let current = state.group.state;
        if current == next {
            return;
        }
        if !current.can_become(next) {
            tracing::error!(job = %self.id, %current, %next, "invalid process group transition");
            debug_assert!(false, "invalid group transition {current} -> {next}");
            return;
        }
        tracing::debug!(job = %self.id, %current, %next, "process group state");
        state.group.state = next;
        self.group_tx.send_replace(next);
    }
}

/// Table of pipelines that are running, stopped, or finished but not yet
/// cleaned up.
pub struct JobManager {
    next_id: AtomicU64,
    jobs: Mutex<BTreeMap<JobId, Arc<JobShared>>>,
    control: Arc<dyn JobControl>,
    events: EventBus,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("next_id", &self.next_id)
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl JobManager {
    pub fn new(control: Arc<dyn JobControl>, events: EventBus) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            jobs: Mutex::new(BTreeMap::new()),
            control,
            events,
        }
    }

    pub fn capability(&self) -> Capability {
        self.control.capability()
    }

    pub(crate) fn next_id(&self) -> JobId {
        JobId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) async fn register(&self, job: Arc<JobShared>) {
        self.jobs.lock().await.insert(job.id, job);
    }

    async fn lookup(&self, id: JobId) -> Result<Arc<JobShared>, JobControlError> {
        self.jobs
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(JobControlError::NoSuchJob(id))
    }

    async fn live(&self, id: JobId) -> Result<Arc<JobShared>, JobControlError> {
        let job = self.lookup(id).await?;
        if job.result.is_done() {
            return Err(JobControlError::Finished(id));
        }
        Ok(job)
    }

    /// All tracked jobs, oldest first.
    pub async fn list(&self) -> Vec<JobInfo> {
        let jobs: Vec<Arc<JobShared>> = self.jobs.lock().await.values().cloned().collect();
        jobs.iter().map(|j| j.info()).collect()
    }

    pub async fn get(&self, id: JobId) -> Option<PipelineResult> {
        self.jobs.lock().await.get(&id).map(|j| j.result.clone())
    }

    pub async fn info(&self, id: JobId) -> Option<JobInfo> {
        let job = self.jobs.lock().await.get(&id).cloned()?;
        Some(job.info())
    }

    pub async fn command(&self, id: JobId) -> Option<String> {
        self.jobs.lock().await.get(&id).map(|j| j.command.clone())
    }

    /// Process-group view of a job.
    pub async fn group(&self, id: JobId) -> Option<ProcessGroup> {
        let job = self.jobs.lock().await.get(&id).cloned()?;
        Some(job.group())
    }

    /// Per-stage view of a job.
    pub async fn stages(&self, id: JobId) -> Option<Vec<RunningStage>> {
        let job = self.jobs.lock().await.get(&id).cloned()?;
        Some(job.stages())
    }

    pub async fn exists(&self, id: JobId) -> bool {
        self.jobs.lock().await.contains_key(&id)
    }

    pub async fn running_count(&self) -> usize {
        let jobs: Vec<Arc<JobShared>> = self.jobs.lock().await.values().cloned().collect();
        jobs.iter().filter(|j| !j.result.is_done()).count()
    }

    /// Most recently stopped job.
    pub async fn last_stopped(&self) -> Option<JobId> {
        let jobs = self.jobs.lock().await;
        jobs.values()
            .rev()
            .find(|j| j.group_state() == GroupState::Stopped)
            .map(|j| j.id)
    }

    /// The job `fg`/`bg` act on by default: the last stopped one, else the
    /// newest unfinished one other than `exclude` (the asking pipeline).
    pub async fn current(&self, exclude: Option<JobId>) -> Option<JobId> {
        if let Some(id) = self.last_stopped().await {
            return Some(id);
        }
        let jobs = self.jobs.lock().await;
        jobs.values()
            .rev()
            .find(|j| Some(j.id) != exclude && !j.result.is_done())
            .map(|j| j.id)
    }

    /// Stop every member of the job (SIGTSTP).
    pub async fn suspend(&self, id: JobId) -> Result<(), JobControlError> {
        if self.capability() == Capability::TaskHandles {
            return Err(JobControlError::Unsupported("suspend"));
        }
        let job = self.live(id).await?;
        self.control.signal(&job.signal_target(), JobSignal::Stop)
    }

    /// Continue a stopped job.
    ///
    /// In the foreground this takes the terminal for the job's group and
    /// waits until the job stops again or exits; the terminal returns to
    /// the shell either way.
    pub async fn resume(&self, id: JobId, mode: PipelineMode) -> Result<GroupState, JobControlError> {
        if self.capability() == Capability::TaskHandles {
            return Err(JobControlError::Unsupported("resume"));
        }
        let job = self.live(id).await?;

        match mode {
            PipelineMode::Background => {
                job.set_foreground(false);
                job.mark_resumed();
                self.control.signal(&job.signal_target(), JobSignal::Continue)?;
                Ok(GroupState::Running)
            }
            PipelineMode::Foreground => {
                let guard = match job.pgid() {
                    Some(pgid) => job_control::take_terminal(self.control.as_ref(), pgid)?,
                    None => None,
                };
                job.set_terminal_owner(guard.is_some());
                job.set_foreground(true);
                job.mark_resumed();
                self.control.signal(&job.signal_target(), JobSignal::Continue)?;

                let state = job.settled().await;
                drop(guard);
                job.set_terminal_owner(false);
                if state == GroupState::Stopped {
                    job.set_foreground(false);
                    self.events.emit(PipelineEvent::Stopped { pipeline_id: id });
                }
                Ok(state)
            }
        }
    }

    /// Deliver SIGINT to every member, continuing stopped ones.
    pub async fn interrupt(&self, id: JobId) -> Result<(), JobControlError> {
        let job = self.live(id).await?;
        let target = job.signal_target();
        self.control.signal(&target, JobSignal::Interrupt)?;
        if job.group_state() == GroupState::Stopped {
            self.control.signal(&target, JobSignal::Continue)?;
        }
        Ok(())
    }

    /// SIGKILL every member. Stopped members are continued so they die now.
    pub async fn force_terminate(&self, id: JobId) -> Result<(), JobControlError> {
        let job = self.live(id).await?;
        let target = job.signal_target();
        tracing::debug!(job = %id, members = target.members.len(), "force terminate");
        self.control.signal(&target, JobSignal::Kill)?;
        if self.capability() == Capability::NativeProcessGroups {
            self.control.signal(&target, JobSignal::Continue)?;
        }
        Ok(())
    }

    /// Send an arbitrary signal, as `kill %N` does.
    pub async fn signal(&self, id: JobId, signal: JobSignal) -> Result<(), JobControlError> {
        let job = self.live(id).await?;
        self.control.signal(&job.signal_target(), signal)
    }

    /// Wait for a job to finish and return its result.
    pub async fn wait(&self, id: JobId) -> Result<PipelineResult, JobControlError> {
        let job = self.lookup(id).await?;
        job.result.wait().await;
        Ok(job.result.clone())
    }

    /// Wait for every job that is not stopped.
    pub async fn wait_all(&self) -> Vec<PipelineResult> {
        self.wait_all_except(None).await
    }

    /// As [`wait_all`](Self::wait_all), skipping `exclude` (the caller's
    /// own pipeline when `wait` runs inside one).
    pub async fn wait_all_except(&self, exclude: Option<JobId>) -> Vec<PipelineResult> {
        let jobs: Vec<Arc<JobShared>> = self.jobs.lock().await.values().cloned().collect();
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            if Some(job.id) == exclude || job.group_state() == GroupState::Stopped {
                continue;
            }
            job.result.wait().await;
            results.push(job.result.clone());
        }
        results
    }

    /// Forget finished jobs; returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, j| !j.result.is_done());
        before - jobs.len()
    }

    pub async fn remove(&self, id: JobId) -> Option<PipelineResult> {
        self.jobs.lock().await.remove(&id).map(|j| j.result.clone())
    }
}
