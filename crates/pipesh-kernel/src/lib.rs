//! pipesh-kernel: the subprocess pipeline engine of pipesh.
//!
//! This crate provides:
//!
//! - **Spec**: `CommandSpec` and `Pipeline`, the parsed input
//! - **Dispatch**: resolution (alias → builtin → search path) and stage launch
//! - **Scheduler**: stream plumbing, capture readers, reaping, the coordinator
//! - **Job control**: process groups, terminal ownership, signal delivery
//! - **Result**: `PipelineResult` with its bool/int/string coercions
//! - **Tools**: the `Builtin` trait, registry, aliases, and builtin commands

pub mod config;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod job_control;
pub mod kernel;
pub mod result;
pub mod scheduler;
pub mod session;
pub mod spec;
pub mod tools;

pub use config::ShellConfig;
pub use dispatch::{Resolution, ResolvedStage};
pub use error::{JobControlError, PipelineError};
pub use job_control::{Capability, JobSignal};
pub use kernel::Kernel;
pub use result::PipelineResult;
pub use scheduler::JobManager;
pub use session::Session;
pub use spec::{CommandSpec, Pipeline};
pub use tools::{Alias, Builtin, ExecContext, StageIo, builtin_fn};

pub use pipesh_types::{
    CaptureMode, EncodingErrors, ExecutableKind, FdSource, FileMode, GroupState, InvalidSpecError,
    JobId, JobInfo, JobStatus, ParamSchema, PipelineEvent, PipelineMode, StageState, StageStatus,
    ToolSchema,
};
