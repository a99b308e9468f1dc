//! Sources for partial templates.
//!
//! The parser only needs to turn a partial name into template text; where
//! that text comes from is up to the [`Loader`] handed to it.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::LoadError;

pub trait Loader {
    fn load(&self, name: &str) -> Result<String, LoadError>;
}

/// Refuses every partial.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLoader;

impl Loader for NoLoader {
    fn load(&self, name: &str) -> Result<String, LoadError> {
        Err(LoadError::NotFound(name.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    templates: HashMap<String, String>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> &mut Self {
        self.templates.insert(name.into(), source.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.add(name, source);
        self
    }
}

impl Loader for InMemoryLoader {
    fn load(&self, name: &str) -> Result<String, LoadError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(name.to_string()))
    }
}

/// Reads partials from files relative to a root directory.
///
/// Names that are absolute or climb out of the root with `..` are not
/// found.
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Loader for FileLoader {
    fn load(&self, name: &str) -> Result<String, LoadError> {
        let relative = Path::new(name);
        let inside_root = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !inside_root {
            return Err(LoadError::NotFound(name.to_string()));
        }
        let path = self.root.join(relative);
        if !path.is_file() {
            return Err(LoadError::NotFound(name.to_string()));
        }
        fs::read_to_string(&path).map_err(|source| LoadError::Io { path, source })
    }
}
