//! End-to-end pipeline tests: plumbing, capture, exit codes, redirects.

#![cfg(unix)]

use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use pipesh_kernel::{
    Alias, CaptureMode, CommandSpec, ExecutableKind, FdSource, InvalidSpecError, Kernel, Pipeline,
    PipelineError, PipelineEvent, Session, ShellConfig, StageStatus, builtin_fn,
};

fn kernel_in(dir: &Path, config: ShellConfig) -> Kernel {
    let session = Session::new(dir, std::env::vars().collect());
    Kernel::with_session(config, session).expect("kernel")
}

fn kernel(dir: &Path) -> Kernel {
    kernel_in(dir, ShellConfig::default())
}

fn stage<const N: usize>(argv: [&str; N]) -> CommandSpec {
    CommandSpec::new(argv)
}

#[tokio::test]
async fn builtin_into_external_grep() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["echo", "hello"]), stage(["grep", "h"])]).capture(CaptureMode::StdoutOnly);
    let r = k.run(p).await.unwrap();
    assert_eq!(r.returncode(), Some(0));
    assert_eq!(r.out().unwrap(), "hello\n");
    assert_eq!(r, "hello");
}

#[tokio::test]
async fn grep_without_match_fails() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["echo", "hello"]), stage(["grep", "x"])]).capture(CaptureMode::StdoutOnly);
    let r = k.run(p).await.unwrap();
    assert_eq!(r.exit_codes(), Some(vec![0, 1]));
    assert!(!r.as_bool());
    assert!(r.out_is_empty());
}

#[tokio::test]
async fn missing_command_is_127_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["pipesh_no_such_command"])]).capture(CaptureMode::Object);
    let r = k.run(p).await.unwrap();
    assert_eq!(r.returncode(), Some(127));
    assert!(r.err().unwrap().contains("command not found: pipesh_no_such_command"));
    assert!(r.pids().is_empty());
}

#[tokio::test]
async fn missing_command_does_not_hang_downstream() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![
        stage(["pipesh_no_such_command"]),
        stage(["cat"]).with_kind(ExecutableKind::External),
    ])
    .capture(CaptureMode::Object);
    let r = tokio::time::timeout(Duration::from_secs(10), k.run(p))
        .await
        .expect("pipeline hung")
        .unwrap();
    assert_eq!(r.exit_codes(), Some(vec![127, 0]));
    assert!(r.out_is_empty());
}

#[tokio::test]
async fn stderr_only_stage() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["sh", "-c", "echo oops >&2"])]).capture(CaptureMode::Object);
    let r = k.run(p).await.unwrap();
    assert_eq!(r.returncode(), Some(0));
    assert_eq!(r.err().unwrap(), "oops\n");
    assert!(r.out_is_empty());
}

#[tokio::test]
async fn merged_stderr_lands_in_stdout_capture() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["sh", "-c", "echo out; echo err >&2"])])
        .capture(CaptureMode::StdoutOnly)
        .merge_stderr();
    let r = k.run(p).await.unwrap();
    let out = r.out().unwrap();
    assert!(out.contains("out\n") && out.contains("err\n"), "got {out:?}");
}

#[tokio::test]
async fn pipefail_picks_failing_stage() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let plain = k
        .run(Pipeline::new(vec![stage(["false"]), stage(["true"])]))
        .await
        .unwrap();
    assert_eq!(plain.returncode(), Some(0));

    let strict = k
        .run(Pipeline::new(vec![stage(["false"]), stage(["true"])]).pipefail(true))
        .await
        .unwrap();
    assert_eq!(strict.returncode(), Some(1));
}

#[tokio::test]
async fn session_default_pipefail() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel_in(dir.path(), ShellConfig::default().with_pipefail(true));
    let r = k
        .run(Pipeline::new(vec![stage(["false"]), stage(["true"])]))
        .await
        .unwrap();
    assert_eq!(r.returncode(), Some(1));
}

#[tokio::test]
async fn background_returns_before_exit() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let started = Instant::now();
    let r = k.run(Pipeline::command(["sleep", "1"]).background()).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(800));
    assert!(!r.is_done());
    assert_eq!(r.returncode(), None);
    assert_eq!(r.as_int(), -1);
    assert_eq!(r.pids().len(), 1);

    assert_eq!(r.wait().await, 0);
    assert!(r.is_done());
    assert!(r.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn builtin_only_pipeline_spawns_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["echo", "a"]), stage(["cat"]), stage(["tee", "copy.txt"])])
        .capture(CaptureMode::StdoutOnly);
    let r = k.run(p).await.unwrap();
    assert!(r.pids().is_empty());
    assert_eq!(r.out().unwrap(), "a\n");
    assert_eq!(std::fs::read_to_string(dir.path().join("copy.txt")).unwrap(), "a\n");
}

#[tokio::test]
async fn early_exit_downstream_stops_yes() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["yes"]), stage(["head", "-n", "3"])]).capture(CaptureMode::StdoutOnly);
    let r = tokio::time::timeout(Duration::from_secs(10), k.run(p))
        .await
        .expect("yes never saw the closed pipe")
        .unwrap();
    assert_eq!(r.out().unwrap(), "y\ny\ny\n");
    assert_eq!(r.returncode(), Some(0));
}

#[tokio::test]
async fn large_output_is_captured_whole() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["seq", "1", "200000"])]).capture(CaptureMode::StdoutOnly);
    let r = k.run(p).await.unwrap();
    let out = r.out().unwrap();
    assert_eq!(out.lines().count(), 200_000);
    assert_eq!(out.lines().last(), Some("200000"));
}

#[tokio::test]
async fn signal_exit_is_128_plus_signal() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let r = k.run(Pipeline::command(["sh", "-c", "kill -TERM $$"])).await.unwrap();
    assert_eq!(r.statuses(), Some(vec![StageStatus::Signaled(15)]));
    assert_eq!(r.returncode(), Some(143));
}

#[tokio::test]
async fn file_redirects() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("in.txt"), "b\na\n").unwrap();
    let k = kernel(dir.path());

    let p = Pipeline::new(vec![
        stage(["sort"])
            .stdin_from(FdSource::read("in.txt"))
            .stdout_to(FdSource::write("out.txt")),
    ]);
    assert_eq!(k.run(p).await.unwrap().returncode(), Some(0));
    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "a\nb\n");

    let p = Pipeline::new(vec![stage(["echo", "c"]).stdout_to(FdSource::append("out.txt"))]);
    k.run(p).await.unwrap();
    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "a\nb\nc\n");
}

#[tokio::test]
async fn stderr_to_stdout_per_stage() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![
        stage(["sh", "-c", "echo warn >&2"]).stderr_to(FdSource::Descriptor(1)),
        stage(["cat"]).with_kind(ExecutableKind::External),
    ])
    .capture(CaptureMode::Object);
    let r = k.run(p).await.unwrap();
    assert_eq!(r.out().unwrap(), "warn\n");
    assert!(r.err().unwrap().is_empty());
}

#[tokio::test]
async fn unopenable_redirect_fails_only_that_stage() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["cat"]).stdin_from(FdSource::read("missing.txt"))]).capture(CaptureMode::Object);
    let r = k.run(p).await.unwrap();
    assert_eq!(r.returncode(), Some(1));
    assert!(r.err().unwrap().contains("missing.txt"));
}

#[tokio::test]
async fn non_executable_file_is_126() {
    let dir = tempfile::tempdir().unwrap();
    let mut f = std::fs::File::create(dir.path().join("script.sh")).unwrap();
    writeln!(f, "#!/bin/sh\necho hi").unwrap();
    drop(f);
    let k = kernel(dir.path());
    let r = k.run(Pipeline::command(["./script.sh"])).await.unwrap();
    assert_eq!(r.returncode(), Some(126));
}

#[tokio::test]
async fn env_overrides_reach_externals() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["sh", "-c", "echo $PIPESH_TEST_VAR"]).env("PIPESH_TEST_VAR", "bar")])
        .capture(CaptureMode::StdoutOnly);
    assert_eq!(k.run(p).await.unwrap(), "bar");
}

#[tokio::test]
async fn env_overrides_stay_on_their_stage() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![
        stage(["sh", "-c", "echo $PIPESH_STAGE_VAR"]).env("PIPESH_STAGE_VAR", "one"),
        stage(["sh", "-c", "cat; echo \"[$PIPESH_STAGE_VAR]\""]),
    ])
    .capture(CaptureMode::StdoutOnly);
    let r = k.run(p).await.unwrap();
    assert_eq!(r.text(), "one\n[]");
    assert_eq!(k.session().var("PIPESH_STAGE_VAR"), None);
}

#[tokio::test]
async fn external_echo_keeps_carriage_return() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["echo", "a\r"]).with_kind(ExecutableKind::External)])
        .capture(CaptureMode::Object);
    let r = k.run(p).await.unwrap();
    assert_eq!(r.raw_out(), Some(b"a\r\n".to_vec()));
    assert_eq!(r.text(), "a\r");
}

#[tokio::test]
async fn rerunning_a_pipeline_gives_independent_equal_results() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("words.txt"), "pear\napple\nfig\n").unwrap();
    let k = kernel(dir.path());
    let p = Pipeline::new(vec![stage(["cat", "words.txt"]).with_kind(ExecutableKind::External), stage(["sort"])])
        .capture(CaptureMode::Object);

    let a = k.run(p.clone()).await.unwrap();
    let b = k.run(p).await.unwrap();
    assert_eq!(a.returncode(), Some(0));
    assert_eq!(b.returncode(), Some(0));
    assert_eq!(a.out().unwrap(), "apple\nfig\npear\n");
    assert_eq!(a.out().unwrap(), b.out().unwrap());
    assert_ne!(a.pids(), b.pids());
}

#[tokio::test]
async fn cd_changes_where_externals_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let k = kernel(dir.path());
    assert_eq!(k.run(Pipeline::command(["cd", "sub"])).await.unwrap().returncode(), Some(0));

    let r = k
        .run(Pipeline::new(vec![stage(["pwd"]).with_kind(ExecutableKind::External)]).capture(CaptureMode::StdoutOnly))
        .await
        .unwrap();
    let expected = dir.path().join("sub").canonicalize().unwrap();
    assert_eq!(r.text(), expected.display().to_string());
}

#[tokio::test]
async fn aliases_expand_and_callables_run() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    k.register_alias("greet", Alias::expansion(["echo", "hello"]));
    k.register_alias(
        "shout",
        Alias::Callable(builtin_fn("shout", |args, io, _ctx| {
            let _ = writeln!(io.stdout, "{}!", args.join(" ").to_uppercase());
            0
        })),
    );

    let r = k
        .run(Pipeline::new(vec![stage(["greet", "world"])]).capture(CaptureMode::StdoutOnly))
        .await
        .unwrap();
    assert_eq!(r, "hello world");

    let r = k
        .run(Pipeline::new(vec![stage(["greet"]), stage(["shout"])]).capture(CaptureMode::StdoutOnly))
        .await
        .unwrap();
    assert_eq!(r, "!");
}

#[tokio::test]
async fn callable_stage_reads_upstream() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let count = builtin_fn("count", |_args, io, _ctx| {
        let mut input = String::new();
        if io.stdin.read_to_string(&mut input).is_err() {
            return 1;
        }
        let _ = writeln!(io.stdout, "{}", input.lines().count());
        0
    });
    let p = Pipeline::new(vec![
        stage(["printf", "a\\nb\\nc\\n"]).with_kind(ExecutableKind::External),
        CommandSpec::callable(count, Vec::<String>::new()),
    ])
    .capture(CaptureMode::StdoutOnly);
    assert_eq!(k.run(p).await.unwrap(), "3");
}

#[tokio::test]
async fn invalid_specs_are_rejected_before_launch() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let err = k.run(Pipeline::new(vec![])).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidSpec(InvalidSpecError::EmptyPipeline)));

    let err = k
        .run(Pipeline::new(vec![stage(["echo"]), CommandSpec::new(Vec::<String>::new())]))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidSpec(InvalidSpecError::EmptyArgv { stage: 1 })));
}

#[tokio::test]
async fn lifecycle_events_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let mut events = k.subscribe();
    let r = k.run(Pipeline::command(["sh", "-c", "exit 3"])).await.unwrap();

    match events.recv().await.unwrap() {
        PipelineEvent::Started { pipeline_id, command } => {
            assert_eq!(pipeline_id, r.id());
            assert_eq!(shlex::split(&command), Some(vec!["sh".to_string(), "-c".into(), "exit 3".into()]));
        }
        other => panic!("expected Started, got {other:?}"),
    }
    match events.recv().await.unwrap() {
        PipelineEvent::Exited {
            pipeline_id,
            stage_exit_codes,
            ..
        } => {
            assert_eq!(pipeline_id, r.id());
            assert_eq!(stage_exit_codes, vec![3]);
        }
        other => panic!("expected Exited, got {other:?}"),
    }
}

#[tokio::test]
async fn foreground_jobs_leave_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let r = k.run(Pipeline::command(["true"])).await.unwrap();
    assert!(!k.jobs().exists(r.id()).await);

    let bg = k.run(Pipeline::command(["true"]).background()).await.unwrap();
    bg.wait().await;
    assert!(k.jobs().exists(bg.id()).await);
    assert_eq!(k.jobs().cleanup().await, 1);
}

#[tokio::test]
async fn result_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let r = k
        .run(Pipeline::new(vec![stage(["echo", "x"]), stage(["wc", "-c"])]).capture(CaptureMode::Object))
        .await
        .unwrap();
    assert_eq!(r.command(), "echo x | wc -c");
    assert_eq!(r.capture(), CaptureMode::Object);
    // Non-interactive sessions never hand out the terminal.
    assert_eq!(r.terminal_pgid(), None);
    let ended = r.ended().expect("finished result has an end time");
    assert!(ended >= r.started());
    assert_eq!(r.pids().len(), 1);
}

#[tokio::test]
async fn registered_builtin_shadows_path() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    k.register_builtin(
        "date",
        builtin_fn("fixed-date", |_args, io, _ctx| {
            let _ = writeln!(io.stdout, "1970-01-01");
            0
        }),
    );
    assert_eq!(k.resolve("date").kind(), Some(ExecutableKind::Builtin));
    let r = k
        .run(Pipeline::command(["date"]).capture(CaptureMode::StdoutOnly))
        .await
        .unwrap();
    assert_eq!(r, "1970-01-01");
    assert!(r.pids().is_empty());
}

#[tokio::test]
async fn builtin_help_includes_examples() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path());
    let help = k.builtin_schema("uname").expect("uname is a coreutil").help();
    assert!(help.starts_with("uname — "));
    assert!(help.contains("uname -sr"));
    assert!(k.builtin_schema("pipesh_no_such_builtin").is_none());
}
