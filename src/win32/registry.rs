// ~/shutdown-alert/src/win32/registry.rs

use std::ffi::c_void;

use windows::core::{Error, PCWSTR};
use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_SUCCESS, WIN32_ERROR};
use windows::Win32::System::Registry::*;

use crate::error::AppError;
use crate::startup::RunKeyStore;
use crate::win32::to_wide;
use crate::{info, warn};

const RUN_KEY_PATH: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";

/// `HKCU\...\Run`: string values launched at user login.
pub struct RunKey;

fn access_error(operation: &'static str, name: &str, status: WIN32_ERROR) -> AppError {
    AppError::RegistryAccess {
        operation,
        value: name.to_string(),
        message: format!("{} ({:#X})", Error::from(status.to_hresult()).message(), status.0),
    }
}

impl RunKeyStore for RunKey {
    fn read(&self, name: &str) -> Result<Option<String>, AppError> {
        let path_w = to_wide(RUN_KEY_PATH);
        let name_w = to_wide(name);

        unsafe {
            let mut size: u32 = 0;
            let status = RegGetValueW(
                HKEY_CURRENT_USER,
                PCWSTR(path_w.as_ptr()),
                PCWSTR(name_w.as_ptr()),
                RRF_RT_REG_SZ,
                None,
                None,
                Some(&mut size as *mut u32),
            );
            if status == ERROR_FILE_NOT_FOUND {
                return Ok(None);
            }
            if status != ERROR_SUCCESS {
                return Err(access_error("read", name, status));
            }

            let mut buffer = vec![0u16; (size as usize).div_ceil(2)];
            let status = RegGetValueW(
                HKEY_CURRENT_USER,
                PCWSTR(path_w.as_ptr()),
                PCWSTR(name_w.as_ptr()),
                RRF_RT_REG_SZ,
                None,
                Some(buffer.as_mut_ptr() as *mut c_void),
                Some(&mut size as *mut u32),
            );
            if status == ERROR_FILE_NOT_FOUND {
                return Ok(None);
            }
            if status != ERROR_SUCCESS {
                return Err(access_error("read", name, status));
            }

            let len = buffer.iter().position(|c| *c == 0).unwrap_or(buffer.len());
            Ok(Some(String::from_utf16_lossy(&buffer[..len])))
        }
    }

    fn write(&self, name: &str, value: &str) -> Result<(), AppError> {
        unsafe {
            let mut key = HKEY::default();

            let path_w = to_wide(RUN_KEY_PATH);

            // create/open registry key
            let status = RegCreateKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR(path_w.as_ptr()),
                None,
                None,
                REG_OPTION_NON_VOLATILE,
                KEY_SET_VALUE,
                None,
                &mut key,
                None,
            );

            if status != ERROR_SUCCESS {
                warn!("[Registry] Failed to create/open key '{}': {:#X}", RUN_KEY_PATH, status.0);
                return Err(access_error("write", name, status));
            }

            let name_w = to_wide(name);
            let data: Vec<u8> = to_wide(value).iter().flat_map(|c| c.to_le_bytes()).collect();

            let status = RegSetValueExW(key, PCWSTR(name_w.as_ptr()), None, REG_SZ, Some(&data));

            let _ = RegCloseKey(key);

            if status != ERROR_SUCCESS {
                warn!("[Registry] Failed to set '{}' in key '{}': {:#X}", name, RUN_KEY_PATH, status.0);
                return Err(access_error("write", name, status));
            }

            info!("[Registry] Set '{}={}' in key '{}'", name, value, RUN_KEY_PATH);
            Ok(())
        }
    }

    fn delete(&self, name: &str) -> Result<bool, AppError> {
        let path_w = to_wide(RUN_KEY_PATH);
        let name_w = to_wide(name);

        let status = unsafe {
            RegDeleteKeyValueW(HKEY_CURRENT_USER, PCWSTR(path_w.as_ptr()), PCWSTR(name_w.as_ptr()))
        };

        if status == ERROR_FILE_NOT_FOUND {
            return Ok(false);
        }
        if status != ERROR_SUCCESS {
            return Err(access_error("delete", name, status));
        }
        info!("[Registry] Deleted '{}' from key '{}'", name, RUN_KEY_PATH);
        Ok(true)
    }
}
