//! Per-shell state threaded through every builtin: working directory and
//! environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone)]
struct SessionState {
    cwd: PathBuf,
    prev_cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

/// Working directory and environment of one shell session.
///
/// Pipelines containing a session-mutating builtin (`cd`, `export`, ...)
/// hold the session gate for as long as those builtins run, so two such
/// pipelines never interleave their mutations.
#[derive(Debug)]
pub struct Session {
    state: RwLock<SessionState>,
    gate: Arc<Mutex<()>>,
}

impl Session {
    pub fn new(cwd: impl Into<PathBuf>, env: BTreeMap<String, String>) -> Self {
        Self {
            state: RwLock::new(SessionState {
                cwd: cwd.into(),
                prev_cwd: None,
                env,
            }),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Snapshot the current process's directory and environment.
    pub fn from_process() -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::new(cwd, std::env::vars().collect()))
    }

    pub fn cwd(&self) -> PathBuf {
        self.read().cwd.clone()
    }

    pub fn prev_cwd(&self) -> Option<PathBuf> {
        self.read().prev_cwd.clone()
    }

    /// Change directory. Relative paths resolve against the current one.
    pub fn set_cwd(&self, path: &Path) -> std::io::Result<PathBuf> {
        let mut state = self.write();
        let target = state.cwd.join(path).canonicalize()?;
        if !target.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("not a directory: {}", path.display()),
            ));
        }
        let old = std::mem::replace(&mut state.cwd, target.clone());
        state.prev_cwd = Some(old);
        state.env.insert("PWD".to_string(), target.display().to_string());
        Ok(target)
    }

    pub fn var(&self, name: &str) -> Option<String> {
        self.read().env.get(name).cloned()
    }

    pub fn set_var(&self, name: impl Into<String>, value: impl Into<String>) {
        self.write().env.insert(name.into(), value.into());
    }

    pub fn remove_var(&self, name: &str) -> Option<String> {
        self.write().env.remove(name)
    }

    pub fn env(&self) -> BTreeMap<String, String> {
        self.read().env.clone()
    }

    pub(crate) async fn lock_gate(&self) -> OwnedMutexGuard<()> {
        self.gate.clone().lock_owned().await
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
