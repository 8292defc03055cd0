//! Shell configuration.
//!
//! Loaded from `~/.config/pipesh/config.toml`; every key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use pipesh_types::EncodingErrors;
use serde::{Deserialize, Serialize};

/// Configuration for a pipesh kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Interactive sessions own the terminal and hand it to foreground jobs.
    #[serde(default)]
    pub interactive: bool,

    /// Force job control on or off. Unset means "on when interactive on a tty".
    #[serde(default)]
    pub job_control: Option<bool>,

    /// Use task handles instead of native process groups even where the
    /// platform has them.
    #[serde(default)]
    pub portable_jobs: bool,

    /// Default pipefail for pipelines that don't set it.
    #[serde(default)]
    pub pipefail: bool,

    /// Encoding label for decoding captured output.
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Policy for undecodable bytes.
    #[serde(default)]
    pub encoding_errors: EncodingErrors,

    /// Search path for external commands. Falls back to the session's `PATH`.
    #[serde(default)]
    pub search_path: Option<String>,

    /// How long capture readers may keep draining after every stage exited.
    #[serde(default = "default_drain_ms")]
    pub capture_drain_ms: u64,

    /// Register the in-process coreutils (echo, cat, pwd, tee, yes, ...).
    #[serde(default = "default_true")]
    pub coreutils: bool,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_drain_ms() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            interactive: false,
            job_control: None,
            portable_jobs: false,
            pipefail: false,
            encoding: default_encoding(),
            encoding_errors: EncodingErrors::default(),
            search_path: None,
            capture_drain_ms: default_drain_ms(),
            coreutils: default_true(),
        }
    }
}

impl ShellConfig {
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_job_control(mut self, enabled: bool) -> Self {
        self.job_control = Some(enabled);
        self
    }

    pub fn with_portable_jobs(mut self, portable: bool) -> Self {
        self.portable_jobs = portable;
        self
    }

    pub fn with_pipefail(mut self, pipefail: bool) -> Self {
        self.pipefail = pipefail;
        self
    }

    pub fn with_encoding(mut self, label: impl Into<String>, errors: EncodingErrors) -> Self {
        self.encoding = label.into();
        self.encoding_errors = errors;
        self
    }

    pub fn with_search_path(mut self, path: impl Into<String>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn with_capture_drain(mut self, drain: Duration) -> Self {
        self.capture_drain_ms = drain.as_millis() as u64;
        self
    }

    pub fn with_coreutils(mut self, enabled: bool) -> Self {
        self.coreutils = enabled;
        self
    }

    pub fn capture_drain(&self) -> Duration {
        Duration::from_millis(self.capture_drain_ms)
    }

    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get the default config file path.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "pipesh")
            .context("Could not determine config directory")?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ShellConfig::default();
        assert!(!config.interactive);
        assert_eq!(config.job_control, None);
        assert_eq!(config.encoding, "utf-8");
        assert_eq!(config.encoding_errors, EncodingErrors::Replace);
        assert_eq!(config.capture_drain(), Duration::from_millis(250));
        assert!(config.coreutils);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
interactive = true
job_control = false
pipefail = true
encoding = "latin1"
encoding_errors = "strict"
search_path = "/usr/bin:/bin"
capture_drain_ms = 50
coreutils = false
"#;

        let config: ShellConfig = toml::from_str(toml).expect("parse failed");
        assert!(config.interactive);
        assert_eq!(config.job_control, Some(false));
        assert!(config.pipefail);
        assert_eq!(config.encoding, "latin1");
        assert_eq!(config.encoding_errors, EncodingErrors::Strict);
        assert_eq!(config.search_path.as_deref(), Some("/usr/bin:/bin"));
        assert_eq!(config.capture_drain_ms, 50);
        assert!(!config.coreutils);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: ShellConfig = toml::from_str("").expect("parse failed");
        assert_eq!(config.encoding, "utf-8");
        assert!(config.coreutils);
    }

    #[test]
    fn test_builders() {
        let config = ShellConfig::default()
            .with_interactive(true)
            .with_search_path("/opt/bin")
            .with_capture_drain(Duration::from_millis(40))
            .with_coreutils(false);
        assert!(config.interactive);
        assert_eq!(config.search_path.as_deref(), Some("/opt/bin"));
        assert_eq!(config.capture_drain_ms, 40);
        assert!(!config.coreutils);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "pipefail = true\n").expect("write");
        let config = ShellConfig::load_from(&path).expect("load");
        assert!(config.pipefail);
    }

    #[test]
    fn test_load_from_reports_bad_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "pipefail = \"maybe\"\n").expect("write");
        let err = ShellConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }
}
