//! Pipeline scheduling: plumbing, capture, reaping, and job tracking.
//!
//! # Architecture
//!
//! ```text
//!   Pipeline ──► PipelineRunner::run
//!                  │ validate, allocate pipes + capture readers
//!                  │ resolve every stage (alias → builtin → search path)
//!                  │ launch left to right
//!                  ▼
//!   ┌────────┐ pipe ┌────────┐ pipe ┌────────┐ capture ┌──────────────┐
//!   │stage 0 │─────►│stage 1 │─────►│stage 2 │────────►│CaptureBuffer │
//!   └───┬────┘      └───┬────┘      └───┬────┘         └──────────────┘
//!       │ waitpid / builtin thread      │
//!       └──────────── StageEvent ───────┘
//!                       ▼
//!                    Reaper ──► JobShared (stage + group state)
//!                       │
//!                       └──► PipelineResult (frozen) + Exited event
//! ```

mod capture;
mod job;
mod pipeline;
mod plumbing;
mod reaper;

pub use job::{JobManager, ProcessGroup, RunningStage};
pub use pipeline::{PipelineRunner, RunnerOptions};
pub use reaper::{StageEvent, StageSender};

pub(crate) use capture::CaptureBuffer;
pub(crate) use plumbing::{InputEnd, OutputEnd, StageEnds, StdStream};
