//! Capture, mode, and decoding policies for a pipeline.

use serde::{Deserialize, Serialize};

/// What happens to the final stage's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Inherit the shell's descriptors; nothing is captured.
    #[default]
    None,
    /// Capture stdout and stderr into the result object.
    Object,
    /// Capture stdout only; stderr still reaches the terminal.
    StdoutOnly,
    /// Capture stdout and stderr while teeing both to the terminal.
    Hidden,
}

impl CaptureMode {
    pub fn captures_stdout(self) -> bool {
        !matches!(self, CaptureMode::None)
    }

    pub fn captures_stderr(self) -> bool {
        matches!(self, CaptureMode::Object | CaptureMode::Hidden)
    }

    pub fn tees(self) -> bool {
        matches!(self, CaptureMode::Hidden)
    }
}

/// Whether the caller blocks on the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    #[default]
    Foreground,
    Background,
}

/// What to do with bytes that are invalid in the configured encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingErrors {
    /// Reading the text fails.
    Strict,
    /// Invalid sequences become U+FFFD.
    #[default]
    Replace,
    /// Invalid sequences are dropped.
    Ignore,
}

impl std::str::FromStr for EncodingErrors {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(EncodingErrors::Strict),
            "replace" => Ok(EncodingErrors::Replace),
            "ignore" | "surrogateescape" => Ok(EncodingErrors::Ignore),
            other => Err(format!("unknown encoding error policy: {other}")),
        }
    }
}
