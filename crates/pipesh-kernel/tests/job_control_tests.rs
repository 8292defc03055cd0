//! Job control: process groups, suspend/resume, termination, and the
//! portable backend's limits.

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use pipesh_kernel::{
    Capability, CaptureMode, CommandSpec, FdSource, GroupState, JobControlError, JobId, JobSignal, JobStatus, Kernel,
    Pipeline, PipelineMode, Session, ShellConfig, StageState, StageStatus,
};

fn kernel_in(dir: &Path, config: ShellConfig) -> Kernel {
    let session = Session::new(dir, std::env::vars().collect());
    Kernel::with_session(config, session).expect("kernel")
}

/// Poll until the job's group reaches `state`.
async fn wait_for_group(k: &Kernel, id: JobId, state: GroupState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let group = k.jobs().group(id).await.expect("job vanished");
        if group.state == state {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "group stuck in {:?}", group.state);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn force_terminate_reports_137() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default());
    let r = k.run(Pipeline::command(["sleep", "30"]).background()).await.unwrap();
    k.jobs().force_terminate(r.id()).await.unwrap();
    assert_eq!(r.wait().await, 137);
    assert_eq!(r.statuses(), Some(vec![StageStatus::Signaled(9)]));
}

#[tokio::test]
async fn terminate_a_whole_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default().with_job_control(true));
    let p = Pipeline::new(vec![
        pipesh_kernel::CommandSpec::new(["sleep", "30"]),
        pipesh_kernel::CommandSpec::new(["sleep", "30"]),
    ])
    .background();
    let r = k.run(p).await.unwrap();
    assert_eq!(r.pids().len(), 2);
    k.jobs().signal(r.id(), JobSignal::Terminate).await.unwrap();
    assert_eq!(r.wait().await, 143);
    assert_eq!(r.exit_codes(), Some(vec![143, 143]));
}

#[tokio::test]
async fn pipeline_leads_its_own_group() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default().with_job_control(true));
    let p = Pipeline::new(vec![
        pipesh_kernel::CommandSpec::new(["sleep", "30"]),
        pipesh_kernel::CommandSpec::new(["cat"]),
    ])
    .background();
    let r = k.run(p).await.unwrap();
    let pids = r.pids();
    let group = k.jobs().group(r.id()).await.unwrap();
    assert_eq!(group.pgid, Some(pids[0]));
    assert_eq!(group.members.len(), 2);
    assert!(!group.foreground);
    assert_eq!(group.state, GroupState::Running);

    for pid in &pids {
        let pgid = nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(*pid as i32))).unwrap();
        assert_eq!(pgid.as_raw() as u32, pids[0]);
    }

    k.jobs().force_terminate(r.id()).await.unwrap();
    r.wait().await;
}

#[tokio::test]
async fn foreground_stdin_reader_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default().with_job_control(true));
    let reader = CommandSpec::new(["sh", "-c", "read line; echo done"]).stdin_from(FdSource::Null);
    let p = Pipeline::new(vec![reader]).capture(CaptureMode::StdoutOnly);
    let r = k.run(p).await.unwrap();
    assert_eq!(r.statuses(), Some(vec![StageStatus::Exited(0)]));
    assert_eq!(r.text(), "done");
}

#[tokio::test]
async fn suspend_and_resume_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default().with_job_control(true));
    let r = k.run(Pipeline::command(["sleep", "30"]).background()).await.unwrap();
    let id = r.id();

    k.jobs().suspend(id).await.unwrap();
    wait_for_group(&k, id, GroupState::Stopped).await;
    let info = k.jobs().info(id).await.unwrap();
    assert_eq!(info.status, JobStatus::Stopped);
    let stages = k.jobs().stages(id).await.unwrap();
    assert!(matches!(stages[0].state, StageState::Stopped(_)));
    assert_eq!(k.jobs().last_stopped().await, Some(id));

    let state = k.jobs().resume(id, PipelineMode::Background).await.unwrap();
    assert_eq!(state, GroupState::Running);
    wait_for_group(&k, id, GroupState::Running).await;
    assert!(!r.is_done());

    k.jobs().force_terminate(id).await.unwrap();
    assert_eq!(r.wait().await, 137);
}

#[tokio::test]
async fn force_terminate_kills_stopped_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default().with_job_control(true));
    let r = k.run(Pipeline::command(["sleep", "30"]).background()).await.unwrap();
    k.jobs().suspend(r.id()).await.unwrap();
    wait_for_group(&k, r.id(), GroupState::Stopped).await;

    k.jobs().force_terminate(r.id()).await.unwrap();
    let code = tokio::time::timeout(Duration::from_secs(10), r.wait()).await.expect("stopped job survived");
    assert_eq!(code, 137);
}

#[tokio::test]
async fn wait_all_skips_stopped_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default().with_job_control(true));
    let stopped = k.run(Pipeline::command(["sleep", "30"]).background()).await.unwrap();
    k.jobs().suspend(stopped.id()).await.unwrap();
    wait_for_group(&k, stopped.id(), GroupState::Stopped).await;

    let quick = k.run(Pipeline::command(["true"]).background()).await.unwrap();
    let results = tokio::time::timeout(Duration::from_secs(10), k.jobs().wait_all())
        .await
        .expect("wait_all blocked on a stopped job");
    assert!(results.iter().any(|r| r.id() == quick.id()));
    assert!(!stopped.is_done());

    k.jobs().force_terminate(stopped.id()).await.unwrap();
    stopped.wait().await;
}

#[tokio::test]
async fn finished_and_unknown_jobs_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default());
    let r = k.run(Pipeline::command(["true"]).background()).await.unwrap();
    r.wait().await;
    assert!(matches!(
        k.jobs().force_terminate(r.id()).await,
        Err(JobControlError::Finished(_))
    ));
    assert!(matches!(
        k.jobs().interrupt(JobId(9999)).await,
        Err(JobControlError::NoSuchJob(JobId(9999)))
    ));
}

#[tokio::test]
async fn jobs_builtins_drive_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default());
    let r = k.run(Pipeline::command(["sleep", "30"]).background()).await.unwrap();

    let listing = k
        .run(Pipeline::command(["jobs"]).capture(pipesh_kernel::CaptureMode::StdoutOnly))
        .await
        .unwrap();
    let text = listing.text();
    assert!(text.contains(&format!("[{}]", r.id())), "{text}");
    assert!(text.contains("sleep 30"), "{text}");

    let target = format!("%{}", r.id());
    let kill = k.run(Pipeline::command(["kill", "-KILL", target.as_str()])).await.unwrap();
    assert_eq!(kill.returncode(), Some(0));
    assert_eq!(r.wait().await, 137);

    let waited = k.run(Pipeline::command(["wait", target.as_str()])).await.unwrap();
    assert_eq!(waited.returncode(), Some(137));
}

#[tokio::test]
async fn portable_backend_reports_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default().with_portable_jobs(true));
    assert_eq!(k.capability(), Capability::TaskHandles);

    let r = k.run(Pipeline::command(["sleep", "30"]).background()).await.unwrap();
    assert!(matches!(
        k.jobs().suspend(r.id()).await,
        Err(JobControlError::Unsupported(_))
    ));
    assert!(matches!(
        k.jobs().resume(r.id(), PipelineMode::Foreground).await,
        Err(JobControlError::Unsupported(_))
    ));
    assert_eq!(k.jobs().group(r.id()).await.unwrap().pgid, None);

    k.jobs().force_terminate(r.id()).await.unwrap();
    assert_eq!(r.wait().await, 137);
}

#[tokio::test]
async fn portable_backend_runs_pipelines() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default().with_portable_jobs(true));
    let p = Pipeline::new(vec![
        pipesh_kernel::CommandSpec::new(["printf", "x\\ny\\n"]),
        pipesh_kernel::CommandSpec::new(["wc", "-l"]),
    ])
    .capture(pipesh_kernel::CaptureMode::StdoutOnly);
    let r = k.run(p).await.unwrap();
    assert_eq!(r.text().trim(), "2");
}
