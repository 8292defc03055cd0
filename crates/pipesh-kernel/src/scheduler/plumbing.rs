//! Descriptor wiring between stages.
//!
//! Every pipe a pipeline needs is allocated before the first stage starts.
//! Each stage then receives owned ends; launching consumes them, so once
//! a stage is spawned the parent holds no copy of its write ends and
//! readers see end of stream when the writers exit.

use std::fs::{File, OpenOptions};
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use os_pipe::{PipeReader, PipeWriter};
use pipesh_types::{CaptureMode, FdSource, FileMode};

use super::capture::{CaptureBuffer, CaptureStream};
use crate::spec::CommandSpec;

/// One of the shell's own output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StdStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StdStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StdStream::Stdout => write!(f, "stdout"),
            StdStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Where a stage reads from.
#[derive(Debug)]
pub(crate) enum InputEnd {
    Inherit,
    Null,
    Pipe(PipeReader),
    File(File),
}

impl InputEnd {
    pub fn into_stdio(self) -> Stdio {
        match self {
            InputEnd::Inherit => Stdio::inherit(),
            InputEnd::Null => Stdio::null(),
            InputEnd::Pipe(r) => Stdio::from(r),
            InputEnd::File(f) => Stdio::from(f),
        }
    }

    /// Device path of the shell's stdin, when this end inherits a terminal.
    pub fn terminal_name(&self) -> Option<PathBuf> {
        if !matches!(self, InputEnd::Inherit) || !std::io::stdin().is_terminal() {
            return None;
        }
        #[cfg(unix)]
        {
            nix::unistd::ttyname(std::io::stdin()).ok()
        }
        #[cfg(not(unix))]
        {
            Some(PathBuf::from("CON"))
        }
    }

    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            InputEnd::Inherit => Box::new(std::io::stdin()),
            InputEnd::Null => Box::new(std::io::empty()),
            InputEnd::Pipe(r) => Box::new(r),
            InputEnd::File(f) => Box::new(f),
        }
    }
}

/// Where a stage writes to.
#[derive(Debug)]
pub(crate) enum OutputEnd {
    /// One of the shell's own descriptors.
    Inherit(StdStream),
    Null,
    Pipe(PipeWriter),
    File(File),
}

impl OutputEnd {
    pub fn try_clone(&self) -> std::io::Result<Self> {
        Ok(match self {
            OutputEnd::Inherit(s) => OutputEnd::Inherit(*s),
            OutputEnd::Null => OutputEnd::Null,
            OutputEnd::Pipe(w) => OutputEnd::Pipe(w.try_clone()?),
            OutputEnd::File(f) => OutputEnd::File(f.try_clone()?),
        })
    }

    /// Convert for the child's `slot` (its stdout or stderr).
    pub fn into_stdio(self, slot: StdStream) -> Stdio {
        match self {
            OutputEnd::Inherit(s) if s == slot => Stdio::inherit(),
            OutputEnd::Inherit(StdStream::Stdout) => Stdio::from(std::io::stdout()),
            OutputEnd::Inherit(StdStream::Stderr) => Stdio::from(std::io::stderr()),
            OutputEnd::Null => Stdio::null(),
            OutputEnd::Pipe(w) => Stdio::from(w),
            OutputEnd::File(f) => Stdio::from(f),
        }
    }

    pub fn into_writer(self) -> Box<dyn Write + Send> {
        match self {
            OutputEnd::Inherit(StdStream::Stdout) => Box::new(std::io::stdout()),
            OutputEnd::Inherit(StdStream::Stderr) => Box::new(std::io::stderr()),
            OutputEnd::Null => Box::new(std::io::sink()),
            OutputEnd::Pipe(w) => Box::new(w),
            OutputEnd::File(f) => Box::new(f),
        }
    }
}

/// The three ends handed to one stage.
#[derive(Debug)]
pub(crate) struct StageEnds {
    pub stdin: InputEnd,
    pub stdout: OutputEnd,
    pub stderr: OutputEnd,
}

/// A redirect that could not be opened. Carries the stage's stderr end so
/// the failure can be reported where the stage's errors would go.
#[derive(Debug)]
pub(crate) struct RedirectError {
    pub stderr: OutputEnd,
    pub message: String,
}

impl StageEnds {
    /// Replace pipe ends with the stage's redirects, in stdin, stdout,
    /// stderr order. Relative paths resolve against `cwd`.
    pub fn redirect(self, spec: &CommandSpec, cwd: &Path) -> Result<StageEnds, RedirectError> {
        let StageEnds {
            mut stdin,
            mut stdout,
            mut stderr,
        } = self;

        if let Some(source) = &spec.stdin {
            match open_input(source, cwd) {
                Ok(Some(end)) => stdin = end,
                Ok(None) => {}
                Err(message) => return Err(RedirectError { stderr, message }),
            }
        }

        if let Some(target) = &spec.stdout {
            let replaced = match target {
                FdSource::Descriptor(1) => Ok(None),
                FdSource::Descriptor(2) => stderr.try_clone().map(Some).map_err(|e| format!("2: {e}")),
                other => open_output(other, cwd),
            };
            match replaced {
                Ok(Some(end)) => stdout = end,
                Ok(None) => {}
                Err(message) => return Err(RedirectError { stderr, message }),
            }
        }

        if let Some(target) = &spec.stderr {
            let replaced = match target {
                FdSource::Descriptor(2) => Ok(None),
                FdSource::Descriptor(1) => stdout.try_clone().map(Some).map_err(|e| format!("1: {e}")),
                other => open_output(other, cwd),
            };
            match replaced {
                Ok(Some(end)) => stderr = end,
                Ok(None) => {}
                Err(message) => return Err(RedirectError { stderr, message }),
            }
        }

        Ok(StageEnds { stdin, stdout, stderr })
    }
}

fn open_input(source: &FdSource, cwd: &Path) -> Result<Option<InputEnd>, String> {
    match source {
        FdSource::Null => Ok(Some(InputEnd::Null)),
        FdSource::Descriptor(0) => Ok(Some(InputEnd::Inherit)),
        FdSource::Descriptor(fd) => dup_descriptor(*fd).map(|f| Some(InputEnd::File(f))),
        FdSource::File { path, .. } => File::open(cwd.join(path))
            .map(|f| Some(InputEnd::File(f)))
            .map_err(|e| format!("{}: {e}", path.display())),
    }
}

fn open_output(target: &FdSource, cwd: &Path) -> Result<Option<OutputEnd>, String> {
    match target {
        FdSource::Null => Ok(Some(OutputEnd::Null)),
        FdSource::Descriptor(fd) => dup_descriptor(*fd).map(|f| Some(OutputEnd::File(f))),
        FdSource::File { path, mode } => {
            let mut options = OpenOptions::new();
            options.write(true).create(true);
            match mode {
                FileMode::Append => options.append(true),
                FileMode::Write | FileMode::Read => options.truncate(true),
            };
            options
                .open(cwd.join(path))
                .map(|f| Some(OutputEnd::File(f)))
                .map_err(|e| format!("{}: {e}", path.display()))
        }
    }
}

#[cfg(unix)]
fn dup_descriptor(fd: i32) -> Result<File, String> {
    use std::os::fd::BorrowedFd;

    // SAFETY: the borrow only lives for the duplicating fcntl; a closed
    // descriptor makes that call fail with EBADF.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    borrowed
        .try_clone_to_owned()
        .map(File::from)
        .map_err(|e| format!("{fd}: {e}"))
}

#[cfg(not(unix))]
fn dup_descriptor(fd: i32) -> Result<File, String> {
    Err(format!("{fd}: descriptor redirects are not supported on this platform"))
}

/// All descriptors for one pipeline, allocated up front.
pub(crate) struct Plumbing {
    pub stages: Vec<StageEnds>,
    pub stdout: Option<CaptureStream>,
    pub stderr: Option<CaptureStream>,
}

impl Plumbing {
    /// `n - 1` inter-stage pipes, plus one capture pipe per captured stream.
    pub fn allocate(n: usize, capture: CaptureMode, merge_stderr: bool) -> std::io::Result<Self> {
        let out_pipe = if capture.captures_stdout() { Some(os_pipe::pipe()?) } else { None };
        let err_pipe = if capture.captures_stderr() { Some(os_pipe::pipe()?) } else { None };

        let mut stages = Vec::with_capacity(n);
        let mut upstream: Option<PipeReader> = None;
        for index in 0..n {
            let stdin = match upstream.take() {
                Some(r) => InputEnd::Pipe(r),
                None => InputEnd::Inherit,
            };
            let stdout = if index + 1 < n {
                let (r, w) = os_pipe::pipe()?;
                upstream = Some(r);
                OutputEnd::Pipe(w)
            } else {
                match &out_pipe {
                    Some((_, w)) => OutputEnd::Pipe(w.try_clone()?),
                    None => OutputEnd::Inherit(StdStream::Stdout),
                }
            };
            let stderr = if merge_stderr {
                stdout.try_clone()?
            } else {
                match &err_pipe {
                    Some((_, w)) => OutputEnd::Pipe(w.try_clone()?),
                    None => OutputEnd::Inherit(StdStream::Stderr),
                }
            };
            stages.push(StageEnds { stdin, stdout, stderr });
        }

        // The originals go away here; only the per-stage clones keep the
        // capture pipes open.
        let stdout = out_pipe.map(|(reader, _)| CaptureStream {
            reader,
            buffer: Arc::new(CaptureBuffer::new()),
            stream: StdStream::Stdout,
        });
        let stderr = err_pipe.map(|(reader, _)| CaptureStream {
            reader,
            buffer: Arc::new(CaptureBuffer::new()),
            stream: StdStream::Stderr,
        });

        Ok(Self { stages, stdout, stderr })
    }
}
