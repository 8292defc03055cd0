//! The queryable outcome of a pipeline.
//!
//! A [`PipelineResult`] exists from the moment a pipeline starts. Output
//! accumulates while it runs; exit codes and timings appear once every
//! stage has been reaped, after which the result never changes.
//!
//! Coercions:
//!
//! - bool: the logical return code is 0
//! - int: the logical return code
//! - string: decoded stdout, minus one trailing newline when captured

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime};

use pipesh_types::{CaptureMode, JobId, StageStatus};
use tokio::sync::watch;

use crate::decode::TextDecoder;
use crate::error::DecodeError;
use crate::scheduler::CaptureBuffer;

#[derive(Debug)]
struct Completion {
    statuses: Vec<StageStatus>,
    ended: SystemTime,
    elapsed: Duration,
}

#[derive(Debug)]
struct ResultInner {
    id: JobId,
    command: String,
    capture: CaptureMode,
    pipefail: bool,
    decoder: TextDecoder,
    stdout: Option<Arc<CaptureBuffer>>,
    stderr: Option<Arc<CaptureBuffer>>,
    started: SystemTime,
    started_at: Instant,
    pids: OnceLock<Vec<u32>>,
    terminal_pgid: OnceLock<u32>,
    done: watch::Sender<Option<Arc<Completion>>>,
}

/// Handle to a pipeline's outcome. Clones share the same state.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    inner: Arc<ResultInner>,
}

impl PipelineResult {
    pub(crate) fn pending(
        id: JobId,
        command: String,
        capture: CaptureMode,
        pipefail: bool,
        decoder: TextDecoder,
        stdout: Option<Arc<CaptureBuffer>>,
        stderr: Option<Arc<CaptureBuffer>>,
    ) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            inner: Arc::new(ResultInner {
                id,
                command,
                capture,
                pipefail,
                decoder,
                stdout,
                stderr,
                started: SystemTime::now(),
                started_at: Instant::now(),
                pids: OnceLock::new(),
                terminal_pgid: OnceLock::new(),
                done,
            }),
        }
    }

    pub(crate) fn set_pids(&self, pids: Vec<u32>) {
        let _ = self.inner.pids.set(pids);
    }

    pub(crate) fn set_terminal_pgid(&self, pgid: u32) {
        let _ = self.inner.terminal_pgid.set(pgid);
    }

    /// Freeze the result. Returns the elapsed time.
    pub(crate) fn complete(&self, statuses: Vec<StageStatus>) -> Duration {
        let elapsed = self.inner.started_at.elapsed();
        let completion = Completion {
            statuses,
            ended: SystemTime::now(),
            elapsed,
        };
        let previous = self.inner.done.send_replace(Some(Arc::new(completion)));
        debug_assert!(previous.is_none(), "pipeline result completed twice");
        elapsed
    }

    fn completion(&self) -> Option<Arc<Completion>> {
        self.inner.done.borrow().clone()
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    pub fn command(&self) -> &str {
        &self.inner.command
    }

    pub fn capture(&self) -> CaptureMode {
        self.inner.capture
    }

    /// Whether every stage has been reaped.
    pub fn is_done(&self) -> bool {
        self.inner.done.borrow().is_some()
    }

    /// Wait for completion and return the logical return code.
    pub async fn wait(&self) -> i32 {
        let mut rx = self.inner.done.subscribe();
        // The sender lives as long as `self`, so this cannot see a close.
        let _ = rx.wait_for(Option::is_some).await;
        self.returncode().unwrap_or(-1)
    }

    /// Logical return code: the last stage's, or with pipefail the
    /// right-most non-zero one.
    pub fn returncode(&self) -> Option<i32> {
        let done = self.completion()?;
        let codes = done.statuses.iter().map(|s| s.exit_code());
        Some(if self.inner.pipefail {
            codes.rev().find(|c| *c != 0).unwrap_or(0)
        } else {
            codes.last().unwrap_or(0)
        })
    }

    /// One code per stage, `128 + sig` for signalled stages.
    pub fn exit_codes(&self) -> Option<Vec<i32>> {
        self.completion()
            .map(|c| c.statuses.iter().map(|s| s.exit_code()).collect())
    }

    pub fn statuses(&self) -> Option<Vec<StageStatus>> {
        self.completion().map(|c| c.statuses.clone())
    }

    /// Process IDs of the external stages, in stage order.
    pub fn pids(&self) -> Vec<u32> {
        self.inner.pids.get().cloned().unwrap_or_default()
    }

    /// Process group that held the terminal while this ran in the foreground.
    pub fn terminal_pgid(&self) -> Option<u32> {
        self.inner.terminal_pgid.get().copied()
    }

    pub fn started(&self) -> SystemTime {
        self.inner.started
    }

    pub fn ended(&self) -> Option<SystemTime> {
        self.completion().map(|c| c.ended)
    }

    /// Total run time once done; time so far while running.
    pub fn elapsed(&self) -> Duration {
        match self.completion() {
            Some(c) => c.elapsed,
            None => self.inner.started_at.elapsed(),
        }
    }

    /// Captured stdout bytes, `None` when stdout was not captured.
    pub fn raw_out(&self) -> Option<Vec<u8>> {
        self.inner.stdout.as_ref().map(|b| b.snapshot())
    }

    /// Captured stderr bytes, `None` when stderr was not captured.
    pub fn raw_err(&self) -> Option<Vec<u8>> {
        self.inner.stderr.as_ref().map(|b| b.snapshot())
    }

    /// Decoded stdout; empty when not captured.
    ///
    /// This is the raw text, trailing newline included. Use [`text`] or the
    /// `Display` impl for the stripped form.
    ///
    /// [`text`]: PipelineResult::text
    pub fn out(&self) -> Result<String, DecodeError> {
        match &self.inner.stdout {
            Some(buf) => self.inner.decoder.decode(&buf.snapshot()),
            None => Ok(String::new()),
        }
    }

    /// Decoded stderr; empty when not captured.
    pub fn err(&self) -> Result<String, DecodeError> {
        match &self.inner.stderr {
            Some(buf) => self.inner.decoder.decode(&buf.snapshot()),
            None => Ok(String::new()),
        }
    }

    /// Whether the captured stdout is empty (or nothing was captured).
    pub fn out_is_empty(&self) -> bool {
        self.inner.stdout.as_ref().is_none_or(|b| b.is_empty())
    }

    /// Boolean coercion: the logical return code is 0.
    ///
    /// `false` while the pipeline is still running.
    pub fn as_bool(&self) -> bool {
        self.returncode() == Some(0)
    }

    /// Integer coercion: the logical return code, or -1 while running.
    pub fn as_int(&self) -> i64 {
        self.returncode().map(i64::from).unwrap_or(-1)
    }

    /// String coercion: decoded stdout with one trailing newline removed.
    ///
    /// Undecodable output under the strict policy falls back to lossy
    /// decoding rather than failing.
    pub fn text(&self) -> String {
        let Some(buf) = &self.inner.stdout else {
            return String::new();
        };
        let bytes = buf.snapshot();
        let mut text = self
            .inner
            .decoder
            .decode(&bytes)
            .unwrap_or_else(|_| self.inner.decoder.decode_lossy(&bytes));
        if text.ends_with('\n') {
            text.pop();
            #[cfg(windows)]
            if text.ends_with('\r') {
                text.pop();
            }
        }
        text
    }
}

impl std::fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

impl From<&PipelineResult> for bool {
    fn from(result: &PipelineResult) -> bool {
        result.as_bool()
    }
}

impl From<&PipelineResult> for i64 {
    fn from(result: &PipelineResult) -> i64 {
        result.as_int()
    }
}

impl PartialEq<i64> for PipelineResult {
    fn eq(&self, other: &i64) -> bool {
        self.as_int() == *other
    }
}

impl PartialEq<i32> for PipelineResult {
    fn eq(&self, other: &i32) -> bool {
        self.as_int() == i64::from(*other)
    }
}

impl PartialEq<str> for PipelineResult {
    fn eq(&self, other: &str) -> bool {
        self.text() == other
    }
}

impl PartialEq<&str> for PipelineResult {
    fn eq(&self, other: &&str) -> bool {
        self.text() == *other
    }
}

impl PartialEq<String> for PipelineResult {
    fn eq(&self, other: &String) -> bool {
        self.text() == *other
    }
}
