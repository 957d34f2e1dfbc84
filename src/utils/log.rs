use crate::utils::config::Config;
use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{self, File};
use std::io::{self, Write};
use std::process;

pub fn parse_level(level: &str) -> LevelFilter {
    match level {
        level if level.eq_ignore_ascii_case("error") => LevelFilter::Error,
        level if level.eq_ignore_ascii_case("warn") => LevelFilter::Warn,
        level if level.eq_ignore_ascii_case("info") => LevelFilter::Info,
        level if level.eq_ignore_ascii_case("debug") => LevelFilter::Debug,
        level if level.eq_ignore_ascii_case("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// stdout 只留给 trace 行和子进程输出，日志写 stderr
pub fn init_logger(config: &Config) -> io::Result<()> {
    let level = parse_level(&config.logger_level);

    let mut writers: Vec<Box<dyn Write + Send + Sync>> = vec![Box::new(io::stderr())];
    if let Some(dir) = &config.logger_dir {
        fs::create_dir_all(dir)?;
        let date = Local::now().format("%Y-%m-%d");
        let log_file = dir.join(format!("{}_{}.log", config.name, date));
        writers.push(Box::new(File::create(log_file)?));
    }

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[PID:{}][{}] {} - {}",
                process::id(),
                record.level(),
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(MultiWriter { writers })))
        .filter(Some(&config.name), level)
        .filter(None, LevelFilter::Warn)
        .init();

    log::debug!("日志级别设置为: {}", level);
    Ok(())
}

struct MultiWriter {
    writers: Vec<Box<dyn Write + Send + Sync>>,
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for writer in &mut self.writers {
            writer.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for writer in &mut self.writers {
            writer.flush()?;
        }
        Ok(())
    }
}
