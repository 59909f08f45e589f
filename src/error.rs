// ~/shutdown-alert/src/error.rs

use std::path::PathBuf;

/// Failures of the lifecycle components.
///
/// Lock and hook failures abort startup. Everything else is either recovered
/// locally (dialog) or surfaced to a caller that logs it and carries on.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("another instance already holds '{lock_name}'")]
    AlreadyRunning { lock_name: String },

    #[error("failed to install session hook on window {window:#x}: {reason}")]
    HookInstall { window: isize, reason: String },

    #[error("confirmation dialog could not be shown: {0}")]
    DialogDisplay(String),

    #[error("registry {operation} of '{value}' failed: {message}")]
    RegistryAccess {
        operation: &'static str,
        value: String,
        message: String,
    },

    #[error("could not resolve the executable path: {0}")]
    PathResolution(#[source] std::io::Error),

    #[error("{context}: {message} ({code:#010X})")]
    Os {
        context: &'static str,
        code: i32,
        message: String,
    },

    #[cfg(not(windows))]
    #[error("this program only runs on Windows")]
    UnsupportedPlatform,
}

impl AppError {
    pub fn is_already_running(&self) -> bool {
        matches!(self, AppError::AlreadyRunning { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
