mod alias;
mod exec;
mod pipe;

use std::collections::HashMap;
use std::fmt;

use log::debug;
use once_cell::sync::Lazy;
use roxmltree::Node;

pub use alias::FileAlias;
pub use exec::Exec;
#[cfg(test)]
pub use exec::{Argv, Redirect};
pub use pipe::Pipe;

use super::error::{BatchError, Result};
use super::process::ProcessHandle;
use super::symbols::SymbolTable;

/// One kind of batch element.
///
/// `parse` may read and extend the symbol table but must not keep it.
/// `describe` has no side effects and is valid before `execute`.
pub trait CommandKind: Sized + fmt::Display {
    const TAG: &'static str;

    fn parse(node: Node, symbols: &mut SymbolTable) -> Result<Self>;

    fn describe(&self) -> String {
        self.to_string()
    }

    /// `None` means nothing was spawned and there is nothing to wait for.
    fn execute(&self) -> Result<Option<ProcessHandle>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    FileAlias(FileAlias),
    Exec(Exec),
    Pipe(Pipe),
}

impl From<FileAlias> for Command {
    fn from(cmd: FileAlias) -> Self {
        Command::FileAlias(cmd)
    }
}

impl From<Exec> for Command {
    fn from(cmd: Exec) -> Self {
        Command::Exec(cmd)
    }
}

impl From<Pipe> for Command {
    fn from(cmd: Pipe) -> Self {
        Command::Pipe(cmd)
    }
}

type Constructor = fn(Node, &mut SymbolTable) -> Result<Command>;

fn construct<K: CommandKind + Into<Command>>(node: Node, symbols: &mut SymbolTable) -> Result<Command> {
    debug!("Parsing {}...", K::TAG);
    K::parse(node, symbols).map(Into::into)
}

// 标签名（小写）-> 构造函数
static COMMAND_KINDS: Lazy<HashMap<&'static str, Constructor>> = Lazy::new(|| {
    let mut kinds: HashMap<&'static str, Constructor> = HashMap::new();
    kinds.insert(FileAlias::TAG, construct::<FileAlias>);
    kinds.insert(Exec::TAG, construct::<Exec>);
    kinds.insert(Pipe::TAG, construct::<Pipe>);
    kinds
});

impl Command {
    /// Dispatches on the element's tag name, case-insensitively.
    pub fn parse(node: Node, symbols: &mut SymbolTable) -> Result<Command> {
        let tag = node.tag_name().name();
        match COMMAND_KINDS.get(tag.to_ascii_lowercase().as_str()) {
            Some(constructor) => constructor(node, symbols),
            None => Err(BatchError::UnknownCommandKind(tag.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::FileAlias(_) => FileAlias::TAG,
            Command::Exec(_) => Exec::TAG,
            Command::Pipe(_) => Pipe::TAG,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Command::FileAlias(cmd) => cmd.describe(),
            Command::Exec(cmd) => cmd.describe(),
            Command::Pipe(cmd) => cmd.describe(),
        }
    }

    pub fn execute(&self) -> Result<Option<ProcessHandle>> {
        match self {
            Command::FileAlias(cmd) => cmd.execute(),
            Command::Exec(cmd) => cmd.execute(),
            Command::Pipe(cmd) => cmd.execute(),
        }
    }
}
