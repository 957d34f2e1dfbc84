use std::fmt;
use std::path::PathBuf;

use roxmltree::Node;

use super::CommandKind;
use crate::batch::document::attribute;
use crate::batch::error::{BatchError, Result};
use crate::batch::process::ProcessHandle;
use crate::batch::symbols::SymbolTable;
use crate::utils::path::expand;

/// `<filename id=".." path=".."/>`: names a file for later `in`/`out` references.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAlias {
    pub id: String,
    pub path: PathBuf,
}

fn required<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    attribute(node, name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            BatchError::malformed(FileAlias::TAG, format!("missing `{}` attribute", name))
        })
}

impl CommandKind for FileAlias {
    const TAG: &'static str = "filename";

    fn parse(node: Node, symbols: &mut SymbolTable) -> Result<Self> {
        let id = required(node, "id")?.to_string();
        let path = expand(required(node, "path")?)
            .map_err(|e| BatchError::malformed(Self::TAG, e))?;
        symbols.register(id.clone(), path.clone());
        Ok(Self { id, path })
    }

    fn execute(&self) -> Result<Option<ProcessHandle>> {
        Ok(None)
    }
}

impl fmt::Display for FileAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} = {}", Self::TAG, self.id, self.path.display())
    }
}
