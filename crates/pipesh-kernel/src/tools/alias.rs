//! Alias table.

use std::collections::HashMap;
use std::sync::Arc;

use super::traits::Builtin;

/// An alias either rewrites the command line or runs a callable.
#[derive(Clone)]
pub enum Alias {
    /// `ll` → `ls -l`: the words replace the alias name, remaining
    /// arguments are appended.
    Expansion(Vec<String>),
    /// Runs in-process like a builtin.
    Callable(Arc<dyn Builtin>),
}

impl Alias {
    pub fn expansion<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Alias::Expansion(words.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Debug for Alias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alias::Expansion(words) => f.debug_tuple("Expansion").field(words).finish(),
            Alias::Callable(c) => f.debug_tuple("Callable").field(&c.name()).finish(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct AliasTable {
    aliases: HashMap<String, Alias>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, alias: Alias) -> Option<Alias> {
        self.aliases.insert(name.into(), alias)
    }

    pub fn remove(&mut self, name: &str) -> Option<Alias> {
        self.aliases.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Alias> {
        self.aliases.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.aliases.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
