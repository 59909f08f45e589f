// ~/shutdown-alert/src/session/controller.rs
// Deferred confirmation for one session-end query

use std::cell::RefCell;

use serde_json::json;

use crate::config::UserConfig;
use crate::error::AppError;
use crate::logging::record_error;
use crate::session::{SessionHost, WindowId};
use crate::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Pending,
    OpenResourceAndExit,
    ExitOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Affirmed,
    Declined,
}

/// The in-flight negotiation with the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownQuery {
    pub block_reason: String,
    pub resolution: Resolution,
    /// The confirmation is on screen; a stray follow-up must not open another one.
    pub prompting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    Started,
    AlreadyPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved(Resolution),
    NothingPending,
    AlreadyPrompting,
}

/// User-facing side effects of resolving a query.
pub trait ShutdownUi {
    fn bring_to_foreground(&self, window: WindowId);

    /// Blocks until the user answers. `AppError::DialogDisplay` if nothing could be shown.
    fn confirm(&self, owner: WindowId, title: &str, text: &str) -> Result<Confirmation, AppError>;

    fn open_resource(&self, owner: WindowId, target: &str) -> Result<(), AppError>;

    /// Asks the event loop to wind down. Returns immediately.
    fn request_exit(&self, code: i32);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTexts {
    pub title: String,
    pub body: String,
    pub block_reason: String,
    pub target: String,
}

impl From<&UserConfig> for PromptTexts {
    fn from(cfg: &UserConfig) -> Self {
        Self {
            title: cfg.dialog_title.clone(),
            body: cfg.dialog_text(),
            block_reason: cfg.block_reason.clone(),
            target: cfg.target_url.clone(),
        }
    }
}

pub struct ShutdownQueryController {
    ui: Box<dyn ShutdownUi>,
    texts: PromptTexts,
    query: RefCell<Option<ShutdownQuery>>,
}

impl ShutdownQueryController {
    pub fn new(ui: Box<dyn ShutdownUi>, texts: PromptTexts) -> Self {
        Self {
            ui,
            texts,
            query: RefCell::new(None),
        }
    }

    #[cfg(test)]
    pub fn current_query(&self) -> Option<ShutdownQuery> {
        self.query.borrow().clone()
    }

    /// Idle -> Pending. Puts the block reason up before anything else happens.
    /// A repeated query while one is pending only re-asserts the reason.
    pub fn begin_query(&self, host: &dyn SessionHost, window: WindowId) -> BeginOutcome {
        if let Err(e) = host.set_block_reason(window, &self.texts.block_reason) {
            warn!("[Shutdown] Could not set block reason: {e}");
        }

        let mut query = self.query.borrow_mut();
        if query.is_some() {
            info!("[Shutdown] Session-end query repeated while one is pending");
            return BeginOutcome::AlreadyPending;
        }

        info!("[Shutdown] Session-end query received, holding the session");
        *query = Some(ShutdownQuery {
            block_reason: self.texts.block_reason.clone(),
            resolution: Resolution::Pending,
            prompting: false,
        });
        BeginOutcome::Started
    }

    /// Drops a query that could not be scheduled. The caller clears the reason.
    pub fn abandon_query(&self) {
        if self.query.borrow_mut().take().is_some() {
            warn!("[Shutdown] Pending query abandoned");
        }
    }

    /// Pending -> OpenResourceAndExit | ExitOnly. Runs the confirmation and its
    /// consequences, then discards the query. No borrow is held while the dialog
    /// is up, since it pumps messages that may re-enter the hook.
    pub fn resolve(&self, window: WindowId) -> ResolveOutcome {
        {
            let mut query = self.query.borrow_mut();
            match query.as_mut() {
                None => {
                    warn!("[Shutdown] Deferred dialog message with no pending query");
                    return ResolveOutcome::NothingPending;
                }
                Some(q) if q.prompting => return ResolveOutcome::AlreadyPrompting,
                Some(q) => q.prompting = true,
            }
        }

        // The shutdown overlay would otherwise cover the dialog.
        self.ui.bring_to_foreground(window);

        let resolution = match self.ui.confirm(window, &self.texts.title, &self.texts.body) {
            Ok(Confirmation::Affirmed) => Resolution::OpenResourceAndExit,
            Ok(Confirmation::Declined) => Resolution::ExitOnly,
            Err(e) => {
                record_error("dialog", "failed to show the confirmation dialog", Some(&e), None);
                Resolution::ExitOnly
            }
        };
        self.set_resolution(resolution);

        if resolution == Resolution::OpenResourceAndExit {
            if let Err(e) = self.ui.open_resource(window, &self.texts.target) {
                record_error(
                    "shell",
                    "failed to open the target resource",
                    Some(&e),
                    Some(json!({ "target": self.texts.target })),
                );
            }
        }
        self.ui.request_exit(0);

        if let Some(done) = self.query.borrow_mut().take() {
            info!("[Shutdown] Query resolved: {:?}, lifting '{}'", done.resolution, done.block_reason);
        }
        ResolveOutcome::Resolved(resolution)
    }

    fn set_resolution(&self, resolution: Resolution) {
        if let Some(q) = self.query.borrow_mut().as_mut() {
            q.resolution = resolution;
        }
    }
}
