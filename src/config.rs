// ~/shutdown-alert/src/config.rs

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::info;

pub const APP_NAME: &str = "Shutdown Alert";

/// Value name of the run-at-login entry.
pub const STARTUP_VALUE_NAME: &str = "ShutdownAlert";

/// Machine-wide single-instance lock. `Global\` makes it visible to every login session.
pub const SINGLETON_LOCK_NAME: &str = r"Global\ShutdownAlert-{E5F8A9C3-4D2B-4A1E-9F3C-8B7D6E5A4C2F}";

const URL_PLACEHOLDER: &str = "{url}";

/// User settings persisted in config.yaml next to the executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Resource opened when the user answers "yes".
    pub target_url: String,

    pub dialog_title: String,

    /// Question shown in the dialog. `{url}` is replaced with `target_url`.
    pub dialog_message: String,

    /// Text shown on the system shutdown screen while the session is held.
    pub block_reason: String,

    /// Also write INFO lines to the text log.
    pub debug_log: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            target_url: "https://www.google.com".to_string(),
            dialog_title: APP_NAME.to_string(),
            dialog_message: "You are about to shut down or sign out.\nDo you want to open {url} first?"
                .to_string(),
            block_reason: "Please answer the confirmation dialog".to_string(),
            debug_log: false,
        }
    }
}

impl UserConfig {
    pub fn dialog_text(&self) -> String {
        self.dialog_message.replace(URL_PLACEHOLDER, &self.target_url)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.target_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "target_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.dialog_message.contains(URL_PLACEHOLDER) {
            return Err(ConfigError::Invalid {
                field: "dialog_message",
                reason: format!("must contain the {URL_PLACEHOLDER} placeholder"),
            });
        }
        if self.block_reason.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "block_reason",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads the user config. A missing file yields the defaults; an unreadable,
/// malformed or invalid file is an error and the caller decides how to fall back.
pub fn load_user_config(path: &Path) -> Result<UserConfig, ConfigError> {
    if !path.exists() {
        info!("No config file at {}, using defaults", path.display());
        return Ok(UserConfig::default());
    }

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    // An empty document deserializes to unit, not to a struct.
    if text.trim().is_empty() {
        return Ok(UserConfig::default());
    }

    let cfg: UserConfig = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    cfg.validate()?;

    info!("Loaded user config from {}", path.display());
    Ok(cfg)
}
