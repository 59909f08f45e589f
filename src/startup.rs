// ~/shutdown-alert/src/startup.rs
// Keeps the run-at-login entry pointing at the executable that is actually running

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::error::AppError;
use crate::logging::record_error;
use crate::paths::{canonical_path, resolved_exe_path};
use crate::info;

/// One string value per name in the user's run-at-login store.
pub trait RunKeyStore {
    /// `Ok(None)` when the key or the value does not exist.
    fn read(&self, name: &str) -> Result<Option<String>, AppError>;

    fn write(&self, name: &str, value: &str) -> Result<(), AppError>;

    /// Returns whether a value was actually removed.
    fn delete(&self, name: &str) -> Result<bool, AppError>;
}

type ExeResolver = Box<dyn Fn() -> std::io::Result<PathBuf>>;

pub struct StartupRegistration<S: RunKeyStore> {
    store: S,
    value_name: String,
    resolve_exe: ExeResolver,
}

impl<S: RunKeyStore> StartupRegistration<S> {
    pub fn new(store: S, value_name: &str) -> Self {
        Self::with_resolver(store, value_name, Box::new(resolved_exe_path))
    }

    pub fn with_resolver(store: S, value_name: &str, resolve_exe: ExeResolver) -> Self {
        Self {
            store,
            value_name: value_name.to_string(),
            resolve_exe,
        }
    }

    fn current_exe(&self) -> Result<PathBuf, AppError> {
        (self.resolve_exe)().map_err(AppError::PathResolution)
    }

    /// True only when the stored entry names the running executable.
    /// Every failure along the way reads as "not registered".
    pub fn is_registered(&self) -> bool {
        let recorded = match self.store.read(&self.value_name) {
            Ok(Some(value)) => value,
            _ => return false,
        };
        match self.current_exe() {
            Ok(current) => same_path(&recorded, &current),
            Err(_) => false,
        }
    }

    pub fn register(&self) -> Result<(), AppError> {
        let current = self.current_exe()?;
        let value = quoted(&current);
        self.store.write(&self.value_name, &value)?;
        info!("[Startup] Registered {}", value);
        Ok(())
    }

    pub fn unregister(&self) -> Result<(), AppError> {
        if self.store.delete(&self.value_name)? {
            info!("[Startup] Removed '{}'", self.value_name);
        } else {
            info!("[Startup] '{}' was not registered", self.value_name);
        }
        Ok(())
    }

    /// Rewrites an existing entry that points somewhere else. No entry means the
    /// user never opted in, which is left alone.
    pub fn update_if_needed(&self) -> Result<(), AppError> {
        let recorded = match self.store.read(&self.value_name)? {
            Some(value) => value,
            None => return Ok(()),
        };

        let current = match self.current_exe() {
            Ok(path) => path,
            Err(e) => {
                record_error("startup", "failed to resolve the executable path", Some(&e), None);
                return Err(e);
            }
        };

        if same_path(&recorded, &current) {
            return Ok(());
        }

        info!("[Startup] Entry points to {}, moving it to {}", recorded, current.display());
        if let Err(e) = self.register() {
            record_error(
                "startup",
                "failed to update the startup entry",
                Some(&e),
                Some(json!({
                    "old_path": recorded,
                    "new_path": quoted(&current),
                })),
            );
            return Err(e);
        }
        Ok(())
    }
}

fn quoted(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed)
}

/// Compares a stored entry (quoted or not) with the resolved executable path.
/// Falls back to resolving the stored path when the text differs, so a stored
/// symlink to the same binary still matches.
fn same_path(recorded: &str, current: &Path) -> bool {
    let recorded = unquote(recorded);
    if Path::new(recorded) == current {
        return true;
    }
    match canonical_path(Path::new(recorded)) {
        Ok(resolved) => resolved == current,
        Err(_) => false,
    }
}
