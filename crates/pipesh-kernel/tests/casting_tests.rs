//! Result coercions observed through real pipelines.

#![cfg(unix)]

use pipesh_kernel::{CaptureMode, EncodingErrors, Kernel, Pipeline, Session, ShellConfig};
use rstest::rstest;

fn kernel(dir: &std::path::Path, config: ShellConfig) -> Kernel {
    Kernel::with_session(config, Session::new(dir, std::env::vars().collect())).expect("kernel")
}

#[rstest]
#[case(&["true"], true, 0)]
#[case(&["false"], false, 1)]
#[case(&["sh", "-c", "exit 3"], false, 3)]
#[case(&["pipesh_no_such_command"], false, 127)]
#[tokio::test]
async fn bool_and_int(#[case] argv: &[&str], #[case] truthy: bool, #[case] code: i64) {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path(), ShellConfig::default());
    let r = k
        .run(Pipeline::command(argv.iter().copied()).capture(CaptureMode::Object))
        .await
        .unwrap();
    assert_eq!(r.as_bool(), truthy);
    assert_eq!(bool::from(&r), truthy);
    assert_eq!(r.as_int(), code);
    assert_eq!(i64::from(&r), code);
    assert!(r == code);
}

#[rstest]
#[case(CaptureMode::StdoutOnly, "two lines\nhere")]
#[case(CaptureMode::Object, "two lines\nhere")]
#[case(CaptureMode::Hidden, "two lines\nhere")]
#[case(CaptureMode::None, "")]
#[tokio::test]
async fn string_form_per_capture_mode(#[case] capture: CaptureMode, #[case] expected: &str) {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path(), ShellConfig::default());
    let r = k
        .run(Pipeline::command(["printf", "two lines\\nhere\\n\\n"]).capture(capture))
        .await
        .unwrap();
    // Only one trailing newline is dropped.
    if capture == CaptureMode::None {
        assert_eq!(r.text(), expected);
    } else {
        assert_eq!(r.text(), format!("{expected}\n"));
    }
}

#[tokio::test]
async fn display_matches_text() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path(), ShellConfig::default());
    let r = k
        .run(Pipeline::command(["echo", "shown"]).capture(CaptureMode::StdoutOnly))
        .await
        .unwrap();
    assert_eq!(r.to_string(), "shown");
    assert_eq!(r, String::from("shown"));
}

#[rstest]
#[case(EncodingErrors::Replace, Some("ok\u{FFFD}done"))]
#[case(EncodingErrors::Ignore, Some("okdone"))]
#[case(EncodingErrors::Strict, None)]
#[tokio::test]
async fn decoding_policies(#[case] errors: EncodingErrors, #[case] expected: Option<&str>) {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path(), ShellConfig::default().with_encoding("utf-8", errors));
    let r = k
        .run(Pipeline::command(["printf", "ok\\377done"]).capture(CaptureMode::StdoutOnly))
        .await
        .unwrap();
    assert_eq!(r.raw_out().unwrap(), b"ok\xffdone");
    match expected {
        Some(text) => assert_eq!(r.out().unwrap(), text),
        None => {
            let err = r.out().unwrap_err();
            assert_eq!(err.offset, 2);
        }
    }
}

#[tokio::test]
async fn latin1_session_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let k = kernel(dir.path(), ShellConfig::default().with_encoding("latin1", EncodingErrors::Strict));
    let r = k
        .run(Pipeline::command(["printf", "caf\\351"]).capture(CaptureMode::StdoutOnly))
        .await
        .unwrap();
    assert_eq!(r.out().unwrap(), "café");
}

#[test]
fn unknown_encoding_fails_kernel_creation() {
    let dir = tempfile::tempdir().unwrap();
    let config = ShellConfig::default().with_encoding("klingon-8", EncodingErrors::Strict);
    assert!(Kernel::with_session(config, Session::new(dir.path(), Default::default())).is_err());
}
