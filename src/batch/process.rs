use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ExitStatus};

use log::{debug, warn};
use nix::sys::signal::Signal;

use super::error::{BatchError, Result};

/// A spawned process, or the stages of a pipeline.
///
/// Waiting on a pipeline waits for its last stage only.
pub struct ProcessHandle {
    label: String,
    upstream: Vec<Child>,
    last: Child,
}

impl ProcessHandle {
    pub fn single(label: impl Into<String>, child: Child) -> Self {
        Self {
            label: label.into(),
            upstream: Vec::new(),
            last: child,
        }
    }

    pub fn pipeline(label: impl Into<String>, mut stages: Vec<Child>) -> Result<Self> {
        let last = stages
            .pop()
            .ok_or_else(|| BatchError::InvalidArgument("pipeline without stages".to_string()))?;
        Ok(Self {
            label: label.into(),
            upstream: stages,
            last,
        })
    }

    pub fn id(&self) -> u32 {
        self.last.id()
    }

    pub fn stage_count(&self) -> usize {
        self.upstream.len() + 1
    }

    /// Blocks on the last stage. Upstream stages that already exited are
    /// reported; the ones still running are handed back as detached.
    pub fn wait(mut self) -> Result<Waited> {
        debug!("等待进程 {} ({})", self.last.id(), self.label);
        let status = self.last.wait().map_err(|source| BatchError::Wait {
            program: self.label.clone(),
            source,
        })?;

        let mut waited = Waited {
            status,
            upstream: Vec::new(),
            detached: Vec::new(),
        };
        for (stage, child) in self.upstream.into_iter().enumerate() {
            let mut detached = DetachedStage {
                label: self.label.clone(),
                stage,
                child,
            };
            match detached.poll() {
                Some(exit) => waited.upstream.push(exit),
                None => {
                    debug!(
                        "{}: 管道第 {} 段 (pid {}) 仍在运行，稍后回收",
                        detached.label,
                        stage,
                        detached.id()
                    );
                    waited.detached.push(detached);
                }
            }
        }
        Ok(waited)
    }

    /// Kill and reap every stage. Used when a pipeline cannot be fully started.
    pub fn kill_stages(stages: Vec<Child>) {
        for mut child in stages {
            if let Err(e) = child.kill() {
                debug!("kill {} 失败: {}", child.id(), e);
            }
            let _ = child.wait();
        }
    }
}

#[derive(Debug)]
pub struct Waited {
    pub status: ExitStatus,
    pub upstream: Vec<StageExit>,
    pub detached: Vec<DetachedStage>,
}

/// Exit of a pipeline stage other than the last one.
#[derive(Debug, Clone)]
pub struct StageExit {
    pub label: String,
    pub stage: usize,
    pub status: ExitStatus,
}

impl StageExit {
    fn new(label: &str, stage: usize, status: ExitStatus) -> Self {
        if !status.success() {
            warn!("{}: 管道第 {} 段 {}", label, stage, ExitReport(status));
        }
        Self {
            label: label.to_string(),
            stage,
            status,
        }
    }
}

/// An upstream stage that outlived the last stage of its pipeline.
#[derive(Debug)]
pub struct DetachedStage {
    label: String,
    stage: usize,
    child: Child,
}

impl DetachedStage {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Non-blocking; `None` while the stage is still running.
    pub fn poll(&mut self) -> Option<StageExit> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(StageExit::new(&self.label, self.stage, status)),
            Ok(None) => None,
            Err(e) => {
                warn!("{}: 无法获取管道第 {} 段状态: {}", self.label, self.stage, e);
                None
            }
        }
    }

    pub fn finish(mut self) -> Option<StageExit> {
        match self.child.wait() {
            Ok(status) => Some(StageExit::new(&self.label, self.stage, status)),
            Err(e) => {
                warn!("{}: 回收管道第 {} 段失败: {}", self.label, self.stage, e);
                None
            }
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("label", &self.label)
            .field("pid", &self.last.id())
            .field("stages", &self.stage_count())
            .finish()
    }
}

/// Renders an exit status as `exit code N` or `killed by SIGNAME`.
pub struct ExitReport(pub ExitStatus);

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.0.code() {
            return write!(f, "exit code {}", code);
        }
        match self.0.signal() {
            Some(sig) => match Signal::try_from(sig) {
                Ok(signal) => write!(f, "killed by {}", signal.as_str()),
                Err(_) => write!(f, "killed by signal {}", sig),
            },
            None => write!(f, "unknown status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_single_wait() {
        let child = Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
        let handle = ProcessHandle::single("sh", child);
        assert_eq!(handle.stage_count(), 1);
        let status = handle.wait().unwrap().status;
        assert_eq!(status.code(), Some(3));
        assert_eq!(ExitReport(status).to_string(), "exit code 3");
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_pipeline_reports_last_stage() {
        let first = Command::new("false").stdout(Stdio::null()).spawn().unwrap();
        let last = Command::new("true").spawn().unwrap();
        let handle = ProcessHandle::pipeline("false | true", vec![first, last]).unwrap();
        assert_eq!(handle.stage_count(), 2);
        let waited = handle.wait().unwrap();
        assert!(waited.status.success());
        assert!(waited.detached.is_empty());
        assert_eq!(waited.upstream.len(), 1);
        assert!(!waited.upstream[0].status.success());
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_slow_upstream_is_detached_then_reaped() {
        let first = Command::new("sleep")
            .arg("0.3")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let last = Command::new("true").spawn().unwrap();
        let handle = ProcessHandle::pipeline("sleep 0.3 | true", vec![first, last]).unwrap();

        let mut waited = handle.wait().unwrap();
        assert!(waited.status.success());
        assert_eq!(waited.detached.len(), 1);

        let stage = waited.detached.pop().unwrap();
        let pid = stage.id();
        let exit = stage.finish().unwrap();
        assert_eq!(exit.stage, 0);
        assert!(exit.status.success());
        // 已回收的进程不会留下僵尸
        if cfg!(target_os = "linux") {
            assert!(!std::path::Path::new(&format!("/proc/{}", pid)).exists());
        }
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        assert!(matches!(
            ProcessHandle::pipeline("empty", Vec::new()),
            Err(BatchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_exit_report_signal() {
        let status = ExitStatus::from_raw(9);
        assert_eq!(ExitReport(status).to_string(), "killed by SIGKILL");
    }
}
