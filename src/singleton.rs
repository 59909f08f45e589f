// ~/shutdown-alert/src/singleton.rs
// Single-instance enforcement through a machine-wide named lock

use crate::error::AppError;
use crate::{info, warn};

/// Host primitive behind the singleton guard.
pub trait NamedLockApi {
    type Handle;

    /// Opens (creating if needed) the named lock without taking it.
    fn open(&self, name: &str) -> Result<Self::Handle, AppError>;

    /// Takes the lock without waiting. `Ok(false)` means another holder is active.
    /// An orphaned lock whose holder died counts as taken.
    fn try_take(&self, handle: &Self::Handle) -> Result<bool, AppError>;

    fn unlock(&self, handle: &Self::Handle);

    fn close(&self, handle: Self::Handle);
}

/// Holds the named lock for the life of the process. Released on drop.
pub struct SingletonGuard<A: NamedLockApi> {
    api: A,
    name: String,
    handle: Option<A::Handle>,
}

impl<A: NamedLockApi> SingletonGuard<A> {
    pub fn acquire(api: A, name: &str) -> Result<Self, AppError> {
        let handle = api.open(name)?;

        match api.try_take(&handle) {
            Ok(true) => {
                info!("[Singleton] Acquired '{}'", name);
                Ok(Self {
                    api,
                    name: name.to_string(),
                    handle: Some(handle),
                })
            }
            Ok(false) => {
                warn!("[Singleton] '{}' is held by another instance", name);
                api.close(handle);
                Err(AppError::AlreadyRunning {
                    lock_name: name.to_string(),
                })
            }
            Err(e) => {
                api.close(handle);
                Err(e)
            }
        }
    }

    #[cfg(test)]
    pub fn is_held(&self) -> bool {
        self.handle.is_some()
    }

    /// Unlocks and closes the handle. Further calls do nothing.
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.api.unlock(&handle);
            self.api.close(handle);
            info!("[Singleton] Released '{}'", self.name);
        }
    }
}

impl<A: NamedLockApi> Drop for SingletonGuard<A> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::{
        cell::RefCell,
        collections::HashMap,
        rc::Rc,
    };

    #[derive(Default)]
    struct LockState {
        open_handles: usize,
        holder: Option<u32>,
    }

    /// In-memory stand-in for the OS lock namespace. Clones share the namespace,
    /// like two processes on one machine.
    #[derive(Clone, Default)]
    pub struct LockTable {
        locks: Rc<RefCell<HashMap<String, LockState>>>,
        next_id: Rc<RefCell<u32>>,
        fail_open: bool,
    }

    pub struct FakeHandle {
        pub name: String,
        pub id: u32,
    }

    impl LockTable {
        pub fn failing() -> Self {
            Self {
                fail_open: true,
                ..Self::default()
            }
        }

        pub fn holder(&self, name: &str) -> Option<u32> {
            self.locks.borrow().get(name).and_then(|s| s.holder)
        }

        pub fn exists(&self, name: &str) -> bool {
            self.locks.borrow().contains_key(name)
        }

        /// Simulates the holder dying: the lock stays named but nobody holds it.
        pub fn orphan(&self, name: &str) {
            if let Some(state) = self.locks.borrow_mut().get_mut(name) {
                state.holder = None;
            }
        }
    }

    impl NamedLockApi for LockTable {
        type Handle = FakeHandle;

        fn open(&self, name: &str) -> Result<FakeHandle, AppError> {
            if self.fail_open {
                return Err(AppError::Os {
                    context: "CreateMutexW",
                    code: 5,
                    message: "access denied".to_string(),
                });
            }
            let id = {
                let mut next = self.next_id.borrow_mut();
                *next += 1;
                *next
            };
            self.locks.borrow_mut().entry(name.to_string()).or_default().open_handles += 1;
            Ok(FakeHandle { name: name.to_string(), id })
        }

        fn try_take(&self, handle: &FakeHandle) -> Result<bool, AppError> {
            let mut locks = self.locks.borrow_mut();
            let state = locks.entry(handle.name.clone()).or_default();
            match state.holder {
                None => {
                    state.holder = Some(handle.id);
                    Ok(true)
                }
                Some(_) => Ok(false),
            }
        }

        fn unlock(&self, handle: &FakeHandle) {
            if let Some(state) = self.locks.borrow_mut().get_mut(&handle.name) {
                if state.holder == Some(handle.id) {
                    state.holder = None;
                }
            }
        }

        fn close(&self, handle: FakeHandle) {
            let mut locks = self.locks.borrow_mut();
            let remove = match locks.get_mut(&handle.name) {
                Some(state) => {
                    state.open_handles = state.open_handles.saturating_sub(1);
                    state.open_handles == 0
                }
                None => false,
            };
            if remove {
                locks.remove(&handle.name);
            }
        }
    }
}
