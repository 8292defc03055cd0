//! Builtin registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::builtin;
use super::traits::Builtin;

/// Builtins by name.
#[derive(Default, Clone)]
pub struct BuiltinRegistry {
    builtins: HashMap<String, Arc<dyn Builtin>>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the job and session builtins, plus coreutils if asked.
    pub fn with_defaults(coreutils: bool) -> Self {
        let mut registry = Self::new();
        builtin::register_session(&mut registry);
        builtin::register_jobs(&mut registry);
        if coreutils {
            builtin::register_coreutils(&mut registry);
        }
        registry
    }

    /// Register under the builtin's own name.
    pub fn register(&mut self, tool: impl Builtin + 'static) {
        let tool: Arc<dyn Builtin> = Arc::new(tool);
        self.insert(tool.name().to_string(), tool);
    }

    /// Register under an explicit name, replacing any previous entry.
    pub fn insert(&mut self, name: impl Into<String>, tool: Arc<dyn Builtin>) -> Option<Arc<dyn Builtin>> {
        self.builtins.insert(name.into(), tool)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Builtin>> {
        self.builtins.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Builtin>> {
        self.builtins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builtins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_job_builtins() {
        let registry = BuiltinRegistry::with_defaults(false);
        for name in ["cd", "export", "unset", "jobs", "fg", "bg", "wait", "kill"] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert!(!registry.contains("echo"));
    }

    #[test]
    fn coreutils_are_optional() {
        let registry = BuiltinRegistry::with_defaults(true);
        for name in ["echo", "cat", "pwd", "tee", "tty", "uname", "yes", "true", "false"] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn insert_replaces() {
        let mut registry = BuiltinRegistry::new();
        registry.insert("x", crate::tools::builtin_fn("x", |_, _, _| 0));
        let old = registry.insert("x", crate::tools::builtin_fn("x", |_, _, _| 1));
        assert!(old.is_some());
        assert_eq!(registry.names(), vec!["x"]);
    }
}
