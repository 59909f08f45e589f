// ~/shutdown-alert/src/session/mod.rs
// Session-end interception: message classes, host seams, hook and controller

pub mod controller;
pub mod hook;

use crate::error::AppError;

// Fixed by the host's messaging contract.
pub const CLOSE: u32 = 0x0010;
pub const QUERY_END_SESSION: u32 = 0x0011;
pub const END_SESSION: u32 = 0x0016;
pub const USER_BASE: u32 = 0x0400;

/// Self-addressed follow-up to a session-end query. Never sent by the OS.
pub const SHOW_DIALOG_DEFERRED: u32 = USER_BASE + 1;

/// Answer to a session-end query that holds the session open for now.
pub const BLOCK: isize = 0;
/// Answer to a session-end query that lets the session end.
pub const ALLOW: isize = 1;

/// Host window handle, reduced to its raw value so the logic stays host-neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub isize);

/// Address of the window procedure that was installed before the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviousHandler(pub isize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMessage {
    pub message: u32,
    pub wparam: usize,
    pub lparam: isize,
}

impl RawMessage {
    pub fn new(message: u32, wparam: usize, lparam: isize) -> Self {
        Self { message, wparam, lparam }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMessage {
    QueryEndSession,
    ShowDialogDeferred,
    EndSession,
    Other,
}

impl SessionMessage {
    pub fn classify(message: u32) -> Self {
        match message {
            QUERY_END_SESSION => SessionMessage::QueryEndSession,
            SHOW_DIALOG_DEFERRED => SessionMessage::ShowDialogDeferred,
            END_SESSION => SessionMessage::EndSession,
            _ => SessionMessage::Other,
        }
    }
}

/// Window-system calls the hook and the controller depend on.
pub trait SessionHost {
    /// Swaps the window procedure for the session dispatcher and returns the old one.
    fn replace_procedure(&self, window: WindowId) -> Result<PreviousHandler, AppError>;

    fn restore_procedure(&self, window: WindowId, previous: PreviousHandler) -> Result<(), AppError>;

    fn set_block_reason(&self, window: WindowId, reason: &str) -> Result<(), AppError>;

    /// Best effort. Implementations log a failure and carry on; there is nothing
    /// a caller could do about it while the session is ending.
    fn clear_block_reason(&self, window: WindowId);

    fn post_message(&self, window: WindowId, message: u32) -> Result<(), AppError>;

    fn call_previous(&self, previous: PreviousHandler, window: WindowId, msg: RawMessage) -> isize;
}
