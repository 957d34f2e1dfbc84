use std::io::Write;
use std::process::ExitStatus;

use log::{debug, info, warn};

use super::command::Command;
use super::error::{BatchError, Result};
use super::process::{DetachedStage, ExitReport, StageExit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Empty,
    Built,
    Executing,
    Done,
}

/// What to do when a command's process exits unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log it and run the next command.
    #[default]
    Continue,
    /// Stop with `BatchError::CommandFailed`.
    Abort,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub index: usize,
    pub description: String,
    pub status: Option<ExitStatus>,
}

impl Outcome {
    pub fn failed(&self) -> bool {
        self.status.is_some_and(|status| !status.success())
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<Outcome>,
    /// Exits of non-final pipeline stages. They never decide a command's outcome.
    pub upstream: Vec<StageExit>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|outcome| outcome.failed())
    }

    pub fn upstream_failures(&self) -> impl Iterator<Item = &StageExit> {
        self.upstream.iter().filter(|exit| !exit.status.success())
    }
}

/// Commands run strictly in insertion order, each waited on before the next starts.
#[derive(Debug)]
pub struct Batch {
    commands: Vec<Command>,
    state: BatchState,
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

impl Batch {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            state: BatchState::Empty,
        }
    }

    pub fn add(&mut self, cmd: Option<Command>) -> Result<()> {
        let cmd = cmd.ok_or_else(|| {
            BatchError::InvalidArgument("batch does not accept an undefined command".to_string())
        })?;
        if !matches!(self.state, BatchState::Empty | BatchState::Built) {
            return Err(BatchError::InvalidArgument(format!(
                "cannot add a command to a batch in state {:?}",
                self.state
            )));
        }
        self.commands.push(cmd);
        Ok(())
    }

    pub(crate) fn mark_built(&mut self) {
        if self.state == BatchState::Empty {
            self.state = BatchState::Built;
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Runs the batch, writing each command's description to `trace` right before it starts.
    pub fn execute(&mut self, policy: FailurePolicy, trace: &mut dyn Write) -> Result<BatchReport> {
        if !matches!(self.state, BatchState::Empty | BatchState::Built) {
            return Err(BatchError::InvalidArgument(format!(
                "batch cannot be executed in state {:?}",
                self.state
            )));
        }
        self.state = BatchState::Executing;
        info!("Executing Batch...");

        let mut report = BatchReport::default();
        let mut detached = Vec::new();
        let result = self.run(policy, trace, &mut report, &mut detached);

        // 批处理结束前回收仍在运行的管道上游进程
        if !detached.is_empty() {
            debug!("回收 {} 个仍在运行的管道进程", detached.len());
        }
        report
            .upstream
            .extend(detached.into_iter().filter_map(DetachedStage::finish));
        self.state = BatchState::Done;
        result.map(|()| report)
    }

    fn run(
        &self,
        policy: FailurePolicy,
        trace: &mut dyn Write,
        report: &mut BatchReport,
        detached: &mut Vec<DetachedStage>,
    ) -> Result<()> {
        for (index, cmd) in self.commands.iter().enumerate() {
            detached.retain_mut(|stage| match stage.poll() {
                Some(exit) => {
                    report.upstream.push(exit);
                    false
                }
                None => true,
            });

            let description = cmd.describe();
            writeln!(trace, "{}", description)?;
            trace.flush()?;
            info!("[{}] <{}> {}", index, cmd.kind(), description);

            let status = match cmd.execute()? {
                Some(handle) => {
                    debug!("[{}] 等待 pid {} ({} 个进程)", index, handle.id(), handle.stage_count());
                    let waited = handle.wait()?;
                    report.upstream.extend(waited.upstream);
                    detached.extend(waited.detached);
                    Some(waited.status)
                }
                None => None,
            };

            let outcome = Outcome {
                index,
                description,
                status,
            };
            match outcome.status {
                Some(status) if !status.success() => {
                    warn!("[{}] {} 失败: {}", index, outcome.description, ExitReport(status));
                    if policy == FailurePolicy::Abort {
                        return Err(BatchError::CommandFailed {
                            index,
                            description: outcome.description,
                            status: ExitReport(status).to_string(),
                        });
                    }
                }
                _ => {}
            }
            report.outcomes.push(outcome);
        }
        Ok(())
    }
}
