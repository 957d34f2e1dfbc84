use std::env;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use log::{debug, error};

/// 展开 `~` 与 `$VAR`
pub fn expand(value: &str) -> Result<PathBuf, String> {
    shellexpand::full(value)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| e.to_string())
}

/// Whether an `in`/`out` value should be read as a literal path rather than an alias id.
pub fn looks_like_path(value: &str) -> bool {
    value.contains('/') || value.contains('.') || value.starts_with('~') || value.starts_with('$')
}

pub fn find_program_in_path(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return path.exists().then_some(path);
    }

    let env_path = match env::var_os("PATH") {
        Some(x) => x,
        None => {
            error!("PATH 环境变量不存在");
            return None;
        }
    };
    for dir in env::split_paths(&env_path) {
        let candidate = dir.join(program);
        match candidate.metadata() {
            Ok(meta) => {
                // 跳过不可执行文件
                if meta.is_file() && meta.permissions().mode() & 0o111 != 0 {
                    return Some(candidate);
                }
            }
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    debug!("无法读取 {}: {}", candidate.display(), e);
                }
            }
        }
    }
    None
}
