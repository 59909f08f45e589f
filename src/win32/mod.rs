// ~/shutdown-alert/src/win32/mod.rs
// Host bindings for the lifecycle seams. Compiled on Windows only.

pub mod mutex;
pub mod registry;
pub mod shell;
pub mod window;

use std::ffi::c_void;

use windows::{
    core::Error,
    Win32::{
        Foundation::{GetLastError, HWND, WIN32_ERROR},
        System::Console::{AttachConsole, ATTACH_PARENT_PROCESS},
    },
};

use crate::error::AppError;
use crate::session::WindowId;

/// Null-terminated UTF-16 copy of `s`. Keep it alive while the PCWSTR is in use.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(Some(0)).collect()
}

pub fn window_id(hwnd: HWND) -> WindowId {
    WindowId(hwnd.0 as isize)
}

pub fn hwnd(window: WindowId) -> HWND {
    HWND(window.0 as *mut c_void)
}

pub fn os_error(context: &'static str, err: Error) -> AppError {
    AppError::Os {
        context,
        code: err.code().0,
        message: err.message(),
    }
}

pub fn win32_error(context: &'static str, status: WIN32_ERROR) -> AppError {
    os_error(context, Error::from(status.to_hresult()))
}

/// Error for an API that only reports failure through the thread's last error.
pub fn last_os_error(context: &'static str) -> AppError {
    win32_error(context, unsafe { GetLastError() })
}

/// The binary uses the GUI subsystem, so CLI output only shows up after
/// borrowing the console of the shell that started it.
pub fn attach_parent_console() {
    unsafe {
        let _ = AttachConsole(ATTACH_PARENT_PROCESS);
    }
}
