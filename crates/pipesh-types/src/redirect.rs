//! Redirect targets for a stage's standard streams.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a redirect file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    Read,
    Write,
    Append,
}

/// Where a redirected stream comes from or goes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FdSource {
    /// A file opened with the given mode.
    File { path: PathBuf, mode: FileMode },
    /// An existing descriptor number. `1` and `2` refer to the stage's
    /// own stdout/stderr destinations (`2>&1`, `>&2`).
    Descriptor(i32),
    /// The null device.
    Null,
}

impl FdSource {
    pub fn read(path: impl Into<PathBuf>) -> Self {
        FdSource::File {
            path: path.into(),
            mode: FileMode::Read,
        }
    }

    pub fn write(path: impl Into<PathBuf>) -> Self {
        FdSource::File {
            path: path.into(),
            mode: FileMode::Write,
        }
    }

    pub fn append(path: impl Into<PathBuf>) -> Self {
        FdSource::File {
            path: path.into(),
            mode: FileMode::Append,
        }
    }

    /// Shell notation for the redirect, given the operator prefix (`<`, `>`, `2>`).
    pub fn render(&self, op: &str) -> String {
        match self {
            FdSource::File { path, mode } => {
                let op = match (mode, op) {
                    (FileMode::Append, ">") => ">>".to_string(),
                    (FileMode::Append, "2>") => "2>>".to_string(),
                    _ => op.to_string(),
                };
                format!("{op} {}", path.display())
            }
            FdSource::Descriptor(fd) => format!("{op}&{fd}"),
            FdSource::Null => format!("{op} /dev/null"),
        }
    }
}
