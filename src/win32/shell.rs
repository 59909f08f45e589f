// ~/shutdown-alert/src/win32/shell.rs
// Dialogs, foreground handling and resource launching

use windows::{
    core::{w, PCWSTR},
    Win32::{
        UI::{
            Shell::ShellExecuteW,
            WindowsAndMessaging::{
                MessageBoxW, PostQuitMessage, SetForegroundWindow, IDNO, IDYES, MB_ICONINFORMATION,
                MB_ICONQUESTION, MB_ICONWARNING, MB_OK, MB_SETFOREGROUND, MB_TOPMOST, MB_YESNO,
                SW_SHOWNORMAL,
            },
        },
    },
};

use crate::error::AppError;
use crate::session::controller::{Confirmation, ShutdownUi};
use crate::session::WindowId;
use crate::win32::{hwnd, last_os_error, to_wide};
use crate::{info, warn};

pub struct Win32Shell;

impl ShutdownUi for Win32Shell {
    fn bring_to_foreground(&self, window: WindowId) {
        let raised = unsafe { SetForegroundWindow(hwnd(window)) };
        if !raised.as_bool() {
            warn!("[Shell] Could not bring window {:#x} to the foreground", window.0);
        }
    }

    fn confirm(&self, owner: WindowId, title: &str, text: &str) -> Result<Confirmation, AppError> {
        let title_w = to_wide(title);
        let text_w = to_wide(text);

        let answer = unsafe {
            MessageBoxW(
                Some(hwnd(owner)),
                PCWSTR(text_w.as_ptr()),
                PCWSTR(title_w.as_ptr()),
                MB_YESNO | MB_ICONQUESTION | MB_SETFOREGROUND | MB_TOPMOST,
            )
        };

        if answer == IDYES {
            Ok(Confirmation::Affirmed)
        } else if answer == IDNO {
            Ok(Confirmation::Declined)
        } else if answer.0 == 0 {
            Err(AppError::DialogDisplay(last_os_error("MessageBoxW").to_string()))
        } else {
            // Closing the box some other way counts as "no".
            Ok(Confirmation::Declined)
        }
    }

    fn open_resource(&self, owner: WindowId, target: &str) -> Result<(), AppError> {
        let target_w = to_wide(target);

        let result = unsafe {
            ShellExecuteW(
                Some(hwnd(owner)),
                w!("open"),
                PCWSTR(target_w.as_ptr()),
                PCWSTR::null(),
                PCWSTR::null(),
                SW_SHOWNORMAL,
            )
        };

        // Values up to 32 are error codes, not instance handles.
        let code = result.0 as isize;
        if code <= 32 {
            return Err(AppError::Os {
                context: "ShellExecuteW",
                code: code as i32,
                message: format!("could not open '{target}'"),
            });
        }
        info!("[Shell] Opened {}", target);
        Ok(())
    }

    fn request_exit(&self, code: i32) {
        info!("[Shell] Exit requested ({})", code);
        unsafe { PostQuitMessage(code) };
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Notice {
    Info,
    Warning,
}

/// Ownerless OK box for conditions reported before any window exists.
pub fn show_message(title: &str, text: &str, kind: Notice) {
    let title_w = to_wide(title);
    let text_w = to_wide(text);
    let icon = match kind {
        Notice::Info => MB_ICONINFORMATION,
        Notice::Warning => MB_ICONWARNING,
    };

    unsafe {
        MessageBoxW(
            None,
            PCWSTR(text_w.as_ptr()),
            PCWSTR(title_w.as_ptr()),
            MB_OK | icon | MB_SETFOREGROUND,
        );
    }
}
