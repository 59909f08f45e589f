// ~/shutdown-alert/src/win32/mutex.rs

use std::{
    cell::Cell,
    collections::HashSet,
    sync::{Mutex, OnceLock},
};

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{CloseHandle, HANDLE, WAIT_ABANDONED, WAIT_OBJECT_0, WAIT_TIMEOUT},
        System::Threading::{CreateMutexW, ReleaseMutex, WaitForSingleObject},
    },
};

use crate::error::AppError;
use crate::singleton::NamedLockApi;
use crate::win32::{last_os_error, os_error, to_wide};
use crate::{info, warn};

// Win32 mutexes are recursive for the owning thread, so a second acquire from
// this process would succeed at the OS level. Names held here are tracked apart.
static HELD_NAMES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

fn held_names() -> &'static Mutex<HashSet<String>> {
    HELD_NAMES.get_or_init(|| Mutex::new(HashSet::new()))
}

fn held_here(name: &str) -> bool {
    held_names().lock().map(|names| names.contains(name)).unwrap_or(false)
}

fn mark_held(name: &str, held: bool) {
    if let Ok(mut names) = held_names().lock() {
        if held {
            names.insert(name.to_string());
        } else {
            names.remove(name);
        }
    }
}

pub struct Win32NamedLock;

pub struct MutexHandle {
    handle: HANDLE,
    name: String,
    owned: Cell<bool>,
}

impl NamedLockApi for Win32NamedLock {
    type Handle = MutexHandle;

    fn open(&self, name: &str) -> Result<MutexHandle, AppError> {
        let wide = to_wide(name);
        let handle = unsafe { CreateMutexW(None, false, PCWSTR(wide.as_ptr())) }
            .map_err(|e| os_error("CreateMutexW", e))?;

        Ok(MutexHandle {
            handle,
            name: name.to_string(),
            owned: Cell::new(false),
        })
    }

    fn try_take(&self, handle: &MutexHandle) -> Result<bool, AppError> {
        if held_here(&handle.name) {
            return Ok(false);
        }

        let wait = unsafe { WaitForSingleObject(handle.handle, 0) };
        let taken = if wait == WAIT_OBJECT_0 {
            true
        } else if wait == WAIT_ABANDONED {
            warn!("[Mutex] '{}' was abandoned by an exited instance, taking over", handle.name);
            true
        } else if wait == WAIT_TIMEOUT {
            false
        } else {
            return Err(last_os_error("WaitForSingleObject"));
        };

        if taken {
            handle.owned.set(true);
            mark_held(&handle.name, true);
        }
        Ok(taken)
    }

    fn unlock(&self, handle: &MutexHandle) {
        if !handle.owned.replace(false) {
            return;
        }
        if let Err(e) = unsafe { ReleaseMutex(handle.handle) } {
            warn!("[Mutex] ReleaseMutex failed for '{}': {}", handle.name, e);
        }
        mark_held(&handle.name, false);
    }

    fn close(&self, handle: MutexHandle) {
        if let Err(e) = unsafe { CloseHandle(handle.handle) } {
            warn!("[Mutex] CloseHandle failed for '{}': {}", handle.name, e);
        } else {
            info!("[Mutex] Closed handle for '{}'", handle.name);
        }
    }
}
