use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::process::{self, Stdio};

use log::{debug, warn};
use roxmltree::Node;

use super::CommandKind;
use crate::batch::document::{attribute, tag_is};
use crate::batch::error::{BatchError, Result};
use crate::batch::process::ProcessHandle;
use crate::batch::symbols::SymbolTable;
use crate::utils::path::{expand, find_program_in_path, looks_like_path};

/// Program plus arguments for one process.
#[derive(Debug, Clone, PartialEq)]
pub struct Argv {
    pub program: String,
    pub args: Vec<String>,
}

impl Argv {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Reads `path`, the shell-split `args` attribute and any `<arg>` children.
    pub fn parse(node: Node, tag: &str) -> Result<Self> {
        let program = attribute(node, "path")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| BatchError::malformed(tag, "missing program `path` attribute"))?;

        let mut args = match attribute(node, "args") {
            Some(raw) => shell_words::split(raw)
                .map_err(|e| BatchError::malformed(tag, format!("bad `args` attribute: {}", e)))?,
            None => Vec::new(),
        };

        for child in node.children().filter(|n| n.is_element()) {
            if !tag_is(child, "arg") {
                return Err(BatchError::malformed(
                    tag,
                    format!("unexpected <{}> element", child.tag_name().name()),
                ));
            }
            // 注释会把文本拆成多个节点
            let text: String = child
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect();
            args.push(text);
        }

        if find_program_in_path(program).is_none() {
            warn!("在 PATH 中找不到程序: {}", program);
        }

        Ok(Self::new(program, args))
    }

    pub fn command(&self) -> process::Command {
        let mut command = process::Command::new(&self.program);
        command.args(&self.args).stderr(Stdio::inherit());
        command
    }

    pub fn spawn_error(&self, source: std::io::Error) -> BatchError {
        BatchError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl fmt::Display for Argv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(&self.program).chain(self.args.iter());
        write!(f, "{}", shell_words::join(words))
    }
}

/// Input and output files for a process, resolved when the batch is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Redirect {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl Redirect {
    pub fn parse(node: Node, tag: &str, symbols: &SymbolTable) -> Result<Self> {
        Ok(Self {
            input: attribute(node, "in")
                .map(|v| resolve_target(tag, v, symbols))
                .transpose()?,
            output: attribute(node, "out")
                .map(|v| resolve_target(tag, v, symbols))
                .transpose()?,
        })
    }

    pub fn stdin(&self) -> Result<Stdio> {
        match &self.input {
            Some(path) => File::open(path)
                .map(Stdio::from)
                .map_err(|source| BatchError::Redirect {
                    path: path.clone(),
                    source,
                }),
            None => Ok(Stdio::inherit()),
        }
    }

    pub fn stdout(&self) -> Result<Stdio> {
        match &self.output {
            Some(path) => File::create(path)
                .map(Stdio::from)
                .map_err(|source| BatchError::Redirect {
                    path: path.clone(),
                    source,
                }),
            None => Ok(Stdio::inherit()),
        }
    }
}

/// A registered alias wins; otherwise the value must look like a path.
pub fn resolve_target(tag: &str, value: &str, symbols: &SymbolTable) -> Result<PathBuf> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BatchError::malformed(tag, "empty `in`/`out` attribute"));
    }
    match symbols.resolve(value) {
        Ok(path) => Ok(path.to_path_buf()),
        Err(_) if looks_like_path(value) => {
            expand(value).map_err(|e| BatchError::malformed(tag, e))
        }
        Err(e) => Err(e),
    }
}

/// A single process with optional file redirection.
#[derive(Debug, Clone, PartialEq)]
pub struct Exec {
    pub id: Option<String>,
    pub argv: Argv,
    pub redirect: Redirect,
}

impl CommandKind for Exec {
    const TAG: &'static str = "exec";

    fn parse(node: Node, symbols: &mut SymbolTable) -> Result<Self> {
        let argv = Argv::parse(node, Self::TAG)?;
        let redirect = Redirect::parse(node, Self::TAG, symbols)?;
        Ok(Self {
            id: attribute(node, "id").map(str::to_string),
            argv,
            redirect,
        })
    }

    fn execute(&self) -> Result<Option<ProcessHandle>> {
        let mut command = self.argv.command();
        command
            .stdin(self.redirect.stdin()?)
            .stdout(self.redirect.stdout()?);
        let child = command.spawn().map_err(|e| self.argv.spawn_error(e))?;
        debug!("已启动 {} (pid {})", self.argv.program, child.id());
        Ok(Some(ProcessHandle::single(self.argv.to_string(), child)))
    }
}

impl fmt::Display for Exec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::TAG)?;
        if let Some(id) = &self.id {
            write!(f, " {}", id)?;
        }
        write!(f, ": {}", self.argv)?;
        if let Some(input) = &self.redirect.input {
            write!(f, " < {}", input.display())?;
        }
        if let Some(output) = &self.redirect.output {
            write!(f, " > {}", output.display())?;
        }
        Ok(())
    }
}
