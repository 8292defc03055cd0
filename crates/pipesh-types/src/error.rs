//! Validation errors for pipeline descriptions.

use thiserror::Error;

/// A command or pipeline description that cannot be executed.
///
/// Raised before any process starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSpecError {
    #[error("pipeline has no stages")]
    EmptyPipeline,
    #[error("stage {stage}: empty command")]
    EmptyArgv { stage: usize },
    #[error("stage {stage}: command name is an empty string")]
    EmptyName { stage: usize },
    #[error("stage {stage}: {stream} redirect has an empty path")]
    EmptyRedirectPath { stage: usize, stream: &'static str },
    #[error("stage {stage}: {stream} redirect names negative descriptor {fd}")]
    NegativeDescriptor {
        stage: usize,
        stream: &'static str,
        fd: i32,
    },
    #[error("stage {stage}: {stream} redirect cannot {mode}")]
    WrongFileMode {
        stage: usize,
        stream: &'static str,
        mode: &'static str,
    },
}
