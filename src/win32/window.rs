// ~/shutdown-alert/src/win32/window.rs
// Hidden session window, window-procedure subclassing and the message loop

use std::rc::Rc;

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{
            GetLastError, SetLastError, ERROR_CLASS_ALREADY_EXISTS, HWND, LPARAM, LRESULT,
            WIN32_ERROR, WPARAM,
        },
        System::{
            LibraryLoader::GetModuleHandleW,
            Shutdown::{ShutdownBlockReasonCreate, ShutdownBlockReasonDestroy},
        },
        UI::WindowsAndMessaging::*,
    },
};

use crate::error::AppError;
use crate::instance::InstanceLocator;
use crate::session::{
    controller::ShutdownQueryController, hook::HookRegistry, PreviousHandler, RawMessage,
    SessionHost, WindowId,
};
use crate::win32::{hwnd, last_os_error, os_error, to_wide, win32_error, window_id};
use crate::{info, warn};

pub const WINDOW_CLASS: &str = "ShutdownAlertSessionWindow";

thread_local! {
    // Window procedures run on the thread that owns the window, so the
    // registry lives there too.
    static HOOKS: HookRegistry = HookRegistry::default();
}

pub fn with_hooks<R>(f: impl FnOnce(&HookRegistry) -> R) -> R {
    HOOKS.with(f)
}

/// Installs the session hook on `window` for the current thread.
pub fn install_session_hook(window: WindowId, controller: Rc<ShutdownQueryController>) -> Result<(), AppError> {
    with_hooks(|hooks| hooks.install(&Win32SessionHost, window, controller))
}

pub fn uninstall_session_hook(window: WindowId) -> Result<(), AppError> {
    with_hooks(|hooks| hooks.uninstall(&Win32SessionHost, window))
}

pub struct Win32SessionHost;

#[cfg(target_pointer_width = "64")]
unsafe fn set_window_proc(window: HWND, value: isize) -> isize {
    SetWindowLongPtrW(window, GWLP_WNDPROC, value)
}

#[cfg(target_pointer_width = "32")]
unsafe fn set_window_proc(window: HWND, value: isize) -> isize {
    SetWindowLongW(window, GWL_WNDPROC, value as i32) as isize
}

impl SessionHost for Win32SessionHost {
    fn replace_procedure(&self, window: WindowId) -> Result<PreviousHandler, AppError> {
        let dispatcher = session_wndproc as usize as isize;

        // Zero is also a legal previous value, so only the last error tells failure apart.
        let previous = unsafe {
            SetLastError(WIN32_ERROR(0));
            set_window_proc(hwnd(window), dispatcher)
        };
        if previous == 0 {
            let status = unsafe { GetLastError() };
            if status.0 != 0 {
                return Err(AppError::HookInstall {
                    window: window.0,
                    reason: win32_error("SetWindowLongPtrW", status).to_string(),
                });
            }
        }
        Ok(PreviousHandler(previous))
    }

    fn restore_procedure(&self, window: WindowId, previous: PreviousHandler) -> Result<(), AppError> {
        let replaced = unsafe {
            SetLastError(WIN32_ERROR(0));
            set_window_proc(hwnd(window), previous.0)
        };
        if replaced == 0 {
            let status = unsafe { GetLastError() };
            if status.0 != 0 {
                return Err(win32_error("SetWindowLongPtrW", status));
            }
        }
        Ok(())
    }

    fn set_block_reason(&self, window: WindowId, reason: &str) -> Result<(), AppError> {
        let reason_w = to_wide(reason);
        unsafe { ShutdownBlockReasonCreate(hwnd(window), PCWSTR(reason_w.as_ptr())) }
            .map_err(|e| os_error("ShutdownBlockReasonCreate", e))
    }

    fn clear_block_reason(&self, window: WindowId) {
        if let Err(e) = unsafe { ShutdownBlockReasonDestroy(hwnd(window)) } {
            warn!("[Window] Could not clear block reason: {}", e.message());
        }
    }

    fn post_message(&self, window: WindowId, message: u32) -> Result<(), AppError> {
        unsafe { PostMessageW(Some(hwnd(window)), message, WPARAM(0), LPARAM(0)) }
            .map_err(|e| os_error("PostMessageW", e))
    }

    fn call_previous(&self, previous: PreviousHandler, window: WindowId, msg: RawMessage) -> isize {
        // SAFETY: `previous` was read back from GWLP_WNDPROC of this very window.
        let procedure: WNDPROC = unsafe { std::mem::transmute::<isize, WNDPROC>(previous.0) };
        unsafe {
            CallWindowProcW(
                procedure,
                hwnd(window),
                msg.message,
                WPARAM(msg.wparam),
                LPARAM(msg.lparam),
            )
        }
        .0
    }
}

/// Subclass procedure. Windows without a registration fall through to the default.
unsafe extern "system" fn session_wndproc(window: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    let raw = RawMessage::new(msg, wparam.0, lparam.0);
    let handled = HOOKS
        .try_with(|hooks| hooks.dispatch(&Win32SessionHost, window_id(window), raw))
        .ok()
        .flatten();

    match handled {
        Some(result) => LRESULT(result),
        None => DefWindowProcW(window, msg, wparam, lparam),
    }
}

/// Class procedure of the hidden window, and the "original" handler behind the hook.
unsafe extern "system" fn host_wndproc(window: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    match msg {
        WM_ENDSESSION => {
            info!("[Window] Session ending: {}", wparam.0 != 0);
            LRESULT(0)
        }
        // `stop` from a second launch. The window itself is destroyed after the
        // hook is taken off.
        WM_CLOSE => {
            info!("[Window] Close requested");
            PostQuitMessage(0);
            LRESULT(0)
        }
        WM_DESTROY => {
            PostQuitMessage(0);
            LRESULT(0)
        }
        _ => DefWindowProcW(window, msg, wparam, lparam),
    }
}

/// Finds the resident copy by its window class.
pub struct Win32Instances;

impl InstanceLocator for Win32Instances {
    fn find(&self) -> Option<WindowId> {
        let class_w = to_wide(WINDOW_CLASS);
        match unsafe { FindWindowW(PCWSTR(class_w.as_ptr()), PCWSTR::null()) } {
            Ok(found) if !found.is_invalid() => Some(window_id(found)),
            _ => None,
        }
    }

    fn post(&self, window: WindowId, message: u32) -> Result<(), AppError> {
        Win32SessionHost.post_message(window, message)
    }
}

/// Top-level window that is never shown. Message-only windows would miss the
/// session broadcasts, so this one is a regular overlapped window.
pub struct HiddenWindow {
    hwnd: HWND,
}

impl HiddenWindow {
    pub fn create(title: &str) -> Result<Self, AppError> {
        let instance = unsafe { GetModuleHandleW(None) }.map_err(|e| os_error("GetModuleHandleW", e))?;
        let class_w = to_wide(WINDOW_CLASS);
        let title_w = to_wide(title);

        let wc = WNDCLASSW {
            lpfnWndProc: Some(host_wndproc),
            hInstance: instance.into(),
            lpszClassName: PCWSTR(class_w.as_ptr()),
            ..Default::default()
        };

        let atom = unsafe { RegisterClassW(&wc) };
        if atom == 0 {
            let status = unsafe { GetLastError() };
            if status != ERROR_CLASS_ALREADY_EXISTS {
                return Err(win32_error("RegisterClassW", status));
            }
        }

        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                PCWSTR(class_w.as_ptr()),
                PCWSTR(title_w.as_ptr()),
                WS_OVERLAPPED,
                0,
                0,
                0,
                0,
                None,
                None,
                Some(instance.into()),
                None,
            )
        }
        .map_err(|e| os_error("CreateWindowExW", e))?;

        info!("[Window] Created hidden window {:#x}", hwnd.0 as isize);
        Ok(Self { hwnd })
    }

    pub fn id(&self) -> WindowId {
        window_id(self.hwnd)
    }
}

impl Drop for HiddenWindow {
    fn drop(&mut self) {
        unsafe {
            if IsWindow(Some(self.hwnd)).as_bool() {
                if let Err(e) = DestroyWindow(self.hwnd) {
                    warn!("[Window] DestroyWindow failed: {}", e.message());
                }
            }
        }
    }
}

/// Pumps messages for this thread until `WM_QUIT`. Returns its exit code.
pub fn run_message_loop() -> i32 {
    let mut msg = MSG::default();
    unsafe {
        loop {
            let status = GetMessageW(&mut msg, None, 0, 0);
            if status.0 == 0 {
                break;
            }
            if status.0 == -1 {
                let e = last_os_error("GetMessageW");
                warn!("[Window] Message loop stopped: {}", e);
                return 1;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
    msg.wParam.0 as i32
}
