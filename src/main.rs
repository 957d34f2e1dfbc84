use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use log::{debug, info, warn};

use crate::batch::{parse_document, read_document, BatchBuilder, BatchError};
use crate::utils::config::Config;
use crate::utils::log::init_logger;

mod batch;
mod utils;

fn main() -> ExitCode {
    let config = Config::new();
    if let Err(e) = init_logger(&config) {
        eprintln!("{}", format!("无法初始化日志: {}", e).yellow());
    }
    debug!("配置加载成功, 失败策略: {:?}", config.on_failure);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!("错误类型: {}", e.kind());
            eprintln!("{} {}", "error:".red().bold(), e.to_string().red());
            ExitCode::from(e.exit_code())
        }
    }
}

/// 只使用第一个参数，其余参数忽略
fn document_path(args: impl IntoIterator<Item = String>, fallback: &str) -> Result<PathBuf, BatchError> {
    let mut args = args.into_iter();
    let program = args.next().unwrap_or_else(|| fallback.to_string());
    let path = args
        .next()
        .map(PathBuf::from)
        .ok_or(BatchError::Usage(program))?;
    if args.next().is_some() {
        debug!("忽略多余的参数");
    }
    Ok(path)
}

fn run(config: &Config) -> Result<(), BatchError> {
    let path = document_path(env::args(), &config.name)?;

    let text = read_document(&path)?;
    let doc = parse_document(&path, &text)?;
    let mut batch = BatchBuilder::new().build(&doc)?;
    if batch.is_empty() {
        warn!("{} 中没有任何命令", path.display());
    }
    for cmd in batch.commands() {
        debug!("<{}> {}", cmd.kind(), cmd.describe());
    }

    let report = batch.execute(config.on_failure, &mut io::stdout())?;
    debug!("批处理状态: {:?}", batch.state());
    let failed: Vec<usize> = report.failures().map(|outcome| outcome.index).collect();
    if !failed.is_empty() {
        warn!(
            "{} / {} 条命令执行失败: {:?}",
            failed.len(),
            report.outcomes.len(),
            failed
        );
    } else {
        info!("全部 {} 条命令执行完成", report.outcomes.len());
    }
    let upstream: Vec<String> = report
        .upstream_failures()
        .map(|exit| format!("{}#{}", exit.label, exit.stage))
        .collect();
    if !upstream.is_empty() {
        warn!("{} 个管道上游进程以非零状态退出: {:?}", upstream.len(), upstream);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_missing_document_is_usage_error() {
        let result = document_path(args(&["batchproc"]), "fallback");
        match result {
            Err(e) => {
                assert!(matches!(&e, BatchError::Usage(program) if program == "batchproc"));
                assert_eq!(e.exit_code(), 2);
            }
            Ok(path) => panic!("unexpected path {}", path.display()),
        }
    }

    #[test]
    fn test_no_arguments_uses_fallback_name() {
        let result = document_path(Vec::new(), "batchproc");
        assert!(matches!(result, Err(BatchError::Usage(program)) if program == "batchproc"));
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_extra_arguments_ignored() {
        let path = document_path(args(&["batchproc", "a.xml", "b.xml", "-v"]), "batchproc").unwrap();
        assert_eq!(path, PathBuf::from("a.xml"));
    }
}
