use std::fmt;
use std::os::fd::OwnedFd;
use std::process::{Child, Stdio};

use log::debug;
use nix::unistd;
use roxmltree::Node;

use super::exec::{resolve_target, Argv, Redirect};
use super::CommandKind;
use crate::batch::document::{attribute, tag_is};
use crate::batch::error::{BatchError, Result};
use crate::batch::process::ProcessHandle;
use crate::batch::symbols::SymbolTable;

/// Two or more processes, each stage's stdout feeding the next stage's stdin.
///
/// `redirect.input` applies to the first stage and `redirect.output` to the last.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    pub id: Option<String>,
    pub stages: Vec<Argv>,
    pub redirect: Redirect,
}

impl Pipe {
    fn set_target(
        slot: &mut Option<std::path::PathBuf>,
        name: &str,
        value: &str,
        symbols: &SymbolTable,
    ) -> Result<()> {
        if slot.is_some() {
            return Err(BatchError::malformed(
                Self::TAG,
                format!("`{}` given more than once", name),
            ));
        }
        *slot = Some(resolve_target(Self::TAG, value, symbols)?);
        Ok(())
    }

    fn spawn_stage(
        &self,
        index: usize,
        stage: &Argv,
        upstream: &mut Option<OwnedFd>,
    ) -> Result<Child> {
        let stdin = match upstream.take() {
            Some(read) => Stdio::from(read),
            None => self.redirect.stdin()?,
        };
        let (stdout, next) = if index + 1 < self.stages.len() {
            let (read, write) = open_pipe()?;
            (Stdio::from(write), Some(read))
        } else {
            (self.redirect.stdout()?, None)
        };

        // command 在函数结束时释放，父进程随即关闭自己持有的写端
        let mut command = stage.command();
        command.stdin(stdin).stdout(stdout);
        let child = command.spawn().map_err(|e| stage.spawn_error(e))?;
        debug!("管道第 {} 段已启动: {} (pid {})", index, stage, child.id());

        *upstream = next;
        Ok(child)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn open_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn open_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use std::os::fd::AsRawFd;

    let (read, write) = unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

impl CommandKind for Pipe {
    const TAG: &'static str = "pipecmd";

    fn parse(node: Node, symbols: &mut SymbolTable) -> Result<Self> {
        let mut redirect = Redirect::default();
        if let Some(value) = attribute(node, "in") {
            Self::set_target(&mut redirect.input, "in", value, symbols)?;
        }
        if let Some(value) = attribute(node, "out") {
            Self::set_target(&mut redirect.output, "out", value, symbols)?;
        }

        let children: Vec<Node> = node.children().filter(|n| n.is_element()).collect();
        let last = children.len().saturating_sub(1);
        let mut stages = Vec::with_capacity(children.len());
        for (index, child) in children.into_iter().enumerate() {
            if !(tag_is(child, "exec") || tag_is(child, "cmd")) {
                return Err(BatchError::malformed(
                    Self::TAG,
                    format!("unexpected <{}> element", child.tag_name().name()),
                ));
            }
            stages.push(Argv::parse(child, Self::TAG)?);

            if let Some(value) = attribute(child, "in") {
                if index != 0 {
                    return Err(BatchError::malformed(
                        Self::TAG,
                        "`in` is only allowed on the first stage",
                    ));
                }
                Self::set_target(&mut redirect.input, "in", value, symbols)?;
            }
            if let Some(value) = attribute(child, "out") {
                if index != last {
                    return Err(BatchError::malformed(
                        Self::TAG,
                        "`out` is only allowed on the last stage",
                    ));
                }
                Self::set_target(&mut redirect.output, "out", value, symbols)?;
            }
        }

        if stages.len() < 2 {
            return Err(BatchError::malformed(
                Self::TAG,
                format!("needs at least two stages, found {}", stages.len()),
            ));
        }

        Ok(Self {
            id: attribute(node, "id").map(str::to_string),
            stages,
            redirect,
        })
    }

    fn execute(&self) -> Result<Option<ProcessHandle>> {
        let mut children = Vec::with_capacity(self.stages.len());
        let mut upstream: Option<OwnedFd> = None;
        for (index, stage) in self.stages.iter().enumerate() {
            match self.spawn_stage(index, stage, &mut upstream) {
                Ok(child) => children.push(child),
                Err(e) => {
                    ProcessHandle::kill_stages(children);
                    return Err(e);
                }
            }
        }
        ProcessHandle::pipeline(self.to_string(), children).map(Some)
    }
}

impl fmt::Display for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::TAG)?;
        if let Some(id) = &self.id {
            write!(f, " {}", id)?;
        }
        write!(f, ":")?;
        let last = self.stages.len().saturating_sub(1);
        for (index, stage) in self.stages.iter().enumerate() {
            if index > 0 {
                write!(f, " |")?;
            }
            write!(f, " {}", stage)?;
            if index == 0 {
                if let Some(input) = &self.redirect.input {
                    write!(f, " < {}", input.display())?;
                }
            }
            if index == last {
                if let Some(output) = &self.redirect.output {
                    write!(f, " > {}", output.display())?;
                }
            }
        }
        Ok(())
    }
}
