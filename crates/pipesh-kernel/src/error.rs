//! Error types for pipeline construction and job control.

use pipesh_types::{InvalidSpecError, JobId};
use thiserror::Error;

/// Failures that abort a pipeline before any stage starts.
///
/// Launch failures of individual stages are not errors: they surface as
/// exit codes 126/127 on the result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidSpec(#[from] InvalidSpecError),
    #[error("cannot allocate pipeline descriptors: {0}")]
    ResourceExhaustion(#[source] std::io::Error),
}

/// Failures of job-control operations.
#[derive(Debug, Error)]
pub enum JobControlError {
    /// The active backend cannot perform this operation.
    #[error("{0} is not supported without native process groups")]
    Unsupported(&'static str),
    #[error("no such job: %{0}")]
    NoSuchJob(JobId),
    #[error("job %{0} has already finished")]
    Finished(JobId),
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl JobControlError {
    pub(crate) fn os(op: &'static str, source: impl Into<std::io::Error>) -> Self {
        JobControlError::Os {
            op,
            source: source.into(),
        }
    }
}

/// Text that cannot be decoded under the strict error policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {encoding} byte sequence at offset {offset}")]
pub struct DecodeError {
    pub encoding: &'static str,
    pub offset: usize,
}

/// Unusable configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),
}
