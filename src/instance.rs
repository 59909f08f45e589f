// ~/shutdown-alert/src/instance.rs
// Hands a command to the copy that is already resident, if there is one

use crate::error::AppError;
use crate::session::{WindowId, CLOSE, QUERY_END_SESSION};
use crate::info;

/// Something a second launch can ask of the resident copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRequest {
    /// Run the session-end flow as if the OS had asked.
    TestDialog,
    /// Leave the message loop and exit.
    Stop,
}

impl InstanceRequest {
    pub fn message(self) -> u32 {
        match self {
            InstanceRequest::TestDialog => QUERY_END_SESSION,
            InstanceRequest::Stop => CLOSE,
        }
    }
}

/// Locates the resident copy's session window and posts to it.
pub trait InstanceLocator {
    fn find(&self) -> Option<WindowId>;

    fn post(&self, window: WindowId, message: u32) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered(WindowId),
    NotRunning,
}

pub fn forward_to_running(locator: &dyn InstanceLocator, request: InstanceRequest) -> Result<Delivery, AppError> {
    let window = match locator.find() {
        Some(window) => window,
        None => {
            info!("[Instance] No resident copy found for {:?}", request);
            return Ok(Delivery::NotRunning);
        }
    };

    locator.post(window, request.message())?;
    info!("[Instance] Sent {:?} to window {:#x}", request, window.0);
    Ok(Delivery::Delivered(window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Desktop {
        resident: Option<WindowId>,
        posted: RefCell<Vec<(WindowId, u32)>>,
        fail_post: bool,
    }

    impl InstanceLocator for Desktop {
        fn find(&self) -> Option<WindowId> {
            self.resident
        }

        fn post(&self, window: WindowId, message: u32) -> Result<(), AppError> {
            if self.fail_post {
                return Err(AppError::Os {
                    context: "PostMessageW",
                    code: 5,
                    message: "access denied".to_string(),
                });
            }
            self.posted.borrow_mut().push((window, message));
            Ok(())
        }
    }

    fn resident() -> Desktop {
        Desktop {
            resident: Some(WindowId(0x77)),
            ..Desktop::default()
        }
    }

    #[test]
    fn test_dialog_reaches_resident_copy_as_session_query() {
        let desktop = resident();
        let delivery = forward_to_running(&desktop, InstanceRequest::TestDialog).unwrap();

        assert_eq!(delivery, Delivery::Delivered(WindowId(0x77)));
        assert_eq!(*desktop.posted.borrow(), vec![(WindowId(0x77), QUERY_END_SESSION)]);
    }

    #[test]
    fn stop_closes_resident_copy() {
        let desktop = resident();
        forward_to_running(&desktop, InstanceRequest::Stop).unwrap();
        assert_eq!(*desktop.posted.borrow(), vec![(WindowId(0x77), CLOSE)]);
    }

    #[test]
    fn nothing_resident_means_nothing_posted() {
        let desktop = Desktop::default();
        for request in [InstanceRequest::TestDialog, InstanceRequest::Stop] {
            assert_eq!(forward_to_running(&desktop, request).unwrap(), Delivery::NotRunning);
        }
        assert!(desktop.posted.borrow().is_empty());
    }

    #[test]
    fn post_failure_is_returned() {
        let desktop = Desktop {
            fail_post: true,
            ..resident()
        };
        assert!(matches!(
            forward_to_running(&desktop, InstanceRequest::Stop),
            Err(AppError::Os { context: "PostMessageW", .. })
        ));
    }
}
