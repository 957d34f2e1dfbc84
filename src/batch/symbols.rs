use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;

use super::error::{BatchError, Result};

/// File aliases declared by `<filename>` elements, keyed by id.
#[derive(Debug, Default)]
pub struct SymbolTable {
    aliases: HashMap<String, PathBuf>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    /// Last registration of an id wins.
    pub fn register(&mut self, id: impl Into<String>, path: impl Into<PathBuf>) {
        let id = id.into();
        let path = path.into();
        if let Some(previous) = self.aliases.insert(id.clone(), path.clone()) {
            debug!(
                "别名 {} 被重新定义: {} -> {}",
                id,
                previous.display(),
                path.display()
            );
        }
    }

    pub fn resolve(&self, id: &str) -> Result<&Path> {
        self.aliases
            .get(id)
            .map(PathBuf::as_path)
            .ok_or_else(|| BatchError::UnknownAlias(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.aliases.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }
}
