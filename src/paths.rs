// ~/shutdown-alert/src/paths.rs

use std::path::{Path, PathBuf};
use crate::warn;

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const LOG_FILE_NAME: &str = "shutdown-alert.log";
pub const ERROR_LOG_FILE_NAME: &str = "shutdown-alert-errors.json";

/// Directory holding the executable; config and logs live next to it.
pub fn app_root_dir() -> PathBuf {
    match std::env::current_exe() {
        Ok(path) => {
            if let Some(parent) = path.parent() {
                parent.to_path_buf()
            } else {
                warn!("Current executable has no parent, using current directory as app root");
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
            }
        }
        Err(e) => {
            warn!("Failed to get current executable path: {e}, using current directory as app root");
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

pub fn default_config_path() -> PathBuf {
    app_root_dir().join(CONFIG_FILE_NAME)
}

pub fn log_file_path() -> PathBuf {
    app_root_dir().join(LOG_FILE_NAME)
}

pub fn error_log_file_path() -> PathBuf {
    app_root_dir().join(ERROR_LOG_FILE_NAME)
}

/// Absolute path of the running executable with symlinks resolved.
pub fn resolved_exe_path() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    canonical_path(&exe)
}

/// `fs::canonicalize` without the `\\?\` prefix Windows adds, so the result is
/// usable as a plain command line.
pub fn canonical_path(path: &Path) -> std::io::Result<PathBuf> {
    let canonical = std::fs::canonicalize(path)?;
    Ok(strip_verbatim_prefix(canonical))
}

fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    let text = path.to_string_lossy().into_owned();
    if let Some(rest) = text.strip_prefix(r"\\?\UNC\") {
        return PathBuf::from(format!(r"\\{rest}"));
    }
    match text.strip_prefix(r"\\?\") {
        Some(rest) => PathBuf::from(rest),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_drive_verbatim_prefix() {
        let p = strip_verbatim_prefix(PathBuf::from(r"\\?\C:\apps\app.exe"));
        assert_eq!(p, PathBuf::from(r"C:\apps\app.exe"));
    }

    #[test]
    fn strips_unc_verbatim_prefix() {
        let p = strip_verbatim_prefix(PathBuf::from(r"\\?\UNC\server\share\app.exe"));
        assert_eq!(p, PathBuf::from(r"\\server\share\app.exe"));
    }

    #[test]
    fn leaves_plain_paths_alone() {
        let p = strip_verbatim_prefix(PathBuf::from(r"C:\apps\app.exe"));
        assert_eq!(p, PathBuf::from(r"C:\apps\app.exe"));
    }

    #[test]
    fn canonical_path_collapses_dot_segments() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.exe");
        std::fs::write(&target, b"").unwrap();

        let resolved = canonical_path(&dir.path().join(".").join("real.exe")).unwrap();
        assert_eq!(resolved, canonical_path(&target).unwrap());
    }
}
