use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("document root is <{0}>, expected <batch>")]
    Validation(String),

    #[error("unknown command kind <{0}>")]
    UnknownCommandKind(String),

    #[error("malformed <{tag}> command: {reason}")]
    MalformedCommand { tag: String, reason: String },

    #[error("unknown file alias '{0}'")]
    UnknownAlias(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("usage: {0} <batch-file>")]
    Usage(String),

    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: roxmltree::Error,
    },

    #[error("failed to open {}: {source}", .path.display())]
    Redirect { path: PathBuf, source: io::Error },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("failed to create pipe: {0}")]
    Pipe(#[from] nix::Error),

    #[error("failed to wait for `{program}`: {source}")]
    Wait { program: String, source: io::Error },

    #[error("command {index} ({description}) failed with {status}")]
    CommandFailed {
        index: usize,
        description: String,
        status: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BatchError {
    pub fn malformed(tag: &str, reason: impl Into<String>) -> Self {
        BatchError::MalformedCommand {
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BatchError::Validation(_) => "validation",
            BatchError::UnknownCommandKind(_) => "unknown-command-kind",
            BatchError::MalformedCommand { .. } => "malformed-command",
            BatchError::UnknownAlias(_) => "unknown-alias",
            BatchError::InvalidArgument(_) => "invalid-argument",
            BatchError::Usage(_) => "usage",
            BatchError::Read { .. } => "read",
            BatchError::Parse { .. } => "parse",
            BatchError::Redirect { .. } => "redirect",
            BatchError::Spawn { .. } => "spawn",
            BatchError::Pipe(_) => "pipe",
            BatchError::Wait { .. } => "wait",
            BatchError::CommandFailed { .. } => "command-failed",
            BatchError::Io(_) => "io",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            BatchError::Usage(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_exit_code() {
        let err = BatchError::Usage("batchproc".to_string());
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.kind(), "usage");
        assert_eq!(err.to_string(), "usage: batchproc <batch-file>");
    }

    #[test]
    fn test_malformed_message() {
        let err = BatchError::malformed("pipecmd", "needs at least two stages");
        assert_eq!(err.exit_code(), 1);
        assert_eq!(
            err.to_string(),
            "malformed <pipecmd> command: needs at least two stages"
        );
    }
}
