use dotenv::dotenv;
use std::env;
use std::path::PathBuf;

use crate::batch::FailurePolicy;

pub struct Config {
    pub name: String,
    pub logger_level: String,
    pub logger_dir: Option<PathBuf>,
    pub on_failure: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            name: String::from(env!("CARGO_PKG_NAME")),
            logger_level: String::from("info"),
            logger_dir: None,
            on_failure: FailurePolicy::Continue,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        // 优先加载环境变量
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }

        let mut config = Config::default();
        config.apply(|key| env::var(key).ok());
        config
    }

    fn apply(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("BATCHPROC_LOG_LEVEL") {
            self.logger_level = level;
        }

        if let Some(dir) = lookup("BATCHPROC_LOG_DIR") {
            if !dir.trim().is_empty() {
                self.logger_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(policy) = lookup("BATCHPROC_ON_FAILURE") {
            self.on_failure = match policy.to_lowercase().as_str() {
                "abort" => FailurePolicy::Abort,
                _ => FailurePolicy::Continue,
            };
        }
    }
}
