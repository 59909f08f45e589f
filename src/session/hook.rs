// ~/shutdown-alert/src/session/hook.rs
// Window-procedure hook: claims the session-end messages, forwards the rest

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::error::AppError;
use crate::logging::record_error;
use crate::session::{
    controller::{BeginOutcome, ResolveOutcome, ShutdownQueryController},
    PreviousHandler, RawMessage, SessionHost, SessionMessage, WindowId, ALLOW, BLOCK,
    SHOW_DIALOG_DEFERRED,
};
use crate::{info, warn};

struct Registration {
    previous: PreviousHandler,
    controller: Rc<ShutdownQueryController>,
}

/// Window handle -> (original procedure, controller). The host dispatcher is a
/// plain function, so this table is how it finds per-window state.
#[derive(Default)]
pub struct HookRegistry {
    entries: RefCell<HashMap<WindowId, Registration>>,
}

impl HookRegistry {
    pub fn is_installed(&self, window: WindowId) -> bool {
        self.entries.borrow().contains_key(&window)
    }

    /// Substitutes the dispatcher on `window`. Installing twice would make the
    /// hook its own "original" procedure, so the second attempt is refused.
    pub fn install(
        &self,
        host: &dyn SessionHost,
        window: WindowId,
        controller: Rc<ShutdownQueryController>,
    ) -> Result<(), AppError> {
        if self.is_installed(window) {
            return Err(AppError::HookInstall {
                window: window.0,
                reason: "a session hook is already installed on this window".to_string(),
            });
        }

        let previous = host.replace_procedure(window)?;
        self.entries
            .borrow_mut()
            .insert(window, Registration { previous, controller });
        info!("[Hook] Installed on window {:#x}", window.0);
        Ok(())
    }

    /// Puts the original procedure back. A window without a hook is left alone.
    pub fn uninstall(&self, host: &dyn SessionHost, window: WindowId) -> Result<(), AppError> {
        let removed = self.entries.borrow_mut().remove(&window);
        match removed {
            Some(registration) => {
                host.restore_procedure(window, registration.previous)?;
                info!("[Hook] Removed from window {:#x}", window.0);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn lookup(&self, window: WindowId) -> Option<(PreviousHandler, Rc<ShutdownQueryController>)> {
        self.entries
            .borrow()
            .get(&window)
            .map(|r| (r.previous, r.controller.clone()))
    }

    /// Handles one message for `window`. `None` when no hook is installed there.
    /// The table is not borrowed while handlers run; both the dialog and the
    /// original procedure may pump messages that come straight back here.
    pub fn dispatch(&self, host: &dyn SessionHost, window: WindowId, msg: RawMessage) -> Option<isize> {
        let (previous, controller) = self.lookup(window)?;

        let result = match SessionMessage::classify(msg.message) {
            SessionMessage::QueryEndSession => on_query_end_session(host, &controller, window),
            SessionMessage::ShowDialogDeferred => on_show_dialog(host, &controller, window),
            SessionMessage::EndSession | SessionMessage::Other => host.call_previous(previous, window, msg),
        };
        Some(result)
    }
}

/// Must return quickly: the OS is waiting on this answer.
fn on_query_end_session(host: &dyn SessionHost, controller: &ShutdownQueryController, window: WindowId) -> isize {
    match controller.begin_query(host, window) {
        BeginOutcome::AlreadyPending => BLOCK,
        BeginOutcome::Started => match host.post_message(window, SHOW_DIALOG_DEFERRED) {
            Ok(()) => BLOCK,
            Err(e) => {
                // Without the follow-up nobody would ever lift the block.
                record_error("hook", "failed to schedule the confirmation dialog", Some(&e), None);
                controller.abandon_query();
                host.clear_block_reason(window);
                ALLOW
            }
        },
    }
}

fn on_show_dialog(host: &dyn SessionHost, controller: &ShutdownQueryController, window: WindowId) -> isize {
    match controller.resolve(window) {
        ResolveOutcome::Resolved(resolution) => {
            info!("[Hook] Lifting block after {:?}", resolution);
            host.clear_block_reason(window);
        }
        ResolveOutcome::NothingPending => host.clear_block_reason(window),
        ResolveOutcome::AlreadyPrompting => warn!("[Hook] Confirmation already on screen, ignoring repeat"),
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserConfig;
    use crate::session::controller::{Confirmation, PromptTexts, ShutdownUi};
    use crate::session::fake::{count, Answer, FakeHost, FakeUi, Journal};
    use crate::session::{END_SESSION, QUERY_END_SESSION};
    use std::rc::Weak;

    const WINDOW: WindowId = WindowId(0x1000);

    fn controller_with(ui: impl ShutdownUi + 'static) -> Rc<ShutdownQueryController> {
        Rc::new(ShutdownQueryController::new(
            Box::new(ui),
            PromptTexts::from(&UserConfig::default()),
        ))
    }

    fn installed(journal: &Journal, answer: Answer) -> (HookRegistry, FakeHost) {
        let host = FakeHost::with_journal(journal);
        let registry = HookRegistry::default();
        registry
            .install(&host, WINDOW, controller_with(FakeUi::new(journal, answer)))
            .unwrap();
        (registry, host)
    }

    fn msg(message: u32) -> RawMessage {
        RawMessage::new(message, 0, 0)
    }

    /// Delivers queued messages the way the event loop would.
    fn pump(registry: &HookRegistry, host: &FakeHost) {
        while let Some((window, message)) = host.next_posted() {
            registry.dispatch(host, window, msg(message));
        }
    }

    #[test]
    fn query_blocks_before_any_interaction() {
        let journal = Journal::default();
        let (registry, host) = installed(&journal, Answer::Yes);

        let answer = registry.dispatch(&host, WINDOW, msg(QUERY_END_SESSION));

        assert_eq!(answer, Some(BLOCK));
        assert_eq!(count(&journal, "confirm"), 0);
        assert_eq!(host.queue.borrow().len(), 1);
        assert_eq!(host.queue.borrow()[0], (WINDOW, SHOW_DIALOG_DEFERRED));
    }

    #[test]
    fn reason_is_up_between_query_and_follow_up() {
        for answer in [Answer::Yes, Answer::No, Answer::Broken] {
            let journal = Journal::default();
            let (registry, host) = installed(&journal, answer);

            registry.dispatch(&host, WINDOW, msg(QUERY_END_SESSION));
            assert!(host.reason().is_some_and(|r| !r.is_empty()));

            pump(&registry, &host);
            assert_eq!(host.reason(), None);
            assert_eq!(count(&journal, "confirm"), 1);
        }
    }

    #[test]
    fn reason_is_set_before_post_and_cleared_after_exit_request() {
        let journal = Journal::default();
        let (registry, host) = installed(&journal, Answer::Yes);

        registry.dispatch(&host, WINDOW, msg(QUERY_END_SESSION));
        pump(&registry, &host);

        let order = journal.borrow();
        let pos = |entry: &str| order.iter().position(|e| e == entry).unwrap();
        assert!(pos("set_reason") < pos(format!("post {SHOW_DIALOG_DEFERRED:#x}").as_str()));
        assert!(pos("exit") < pos("clear_reason"));
    }

    #[test]
    fn affirm_flow_opens_once_and_exits_once() {
        let journal = Journal::default();
        let (registry, host) = installed(&journal, Answer::Yes);

        registry.dispatch(&host, WINDOW, msg(QUERY_END_SESSION));
        pump(&registry, &host);

        assert_eq!(count(&journal, "open"), 1);
        assert_eq!(count(&journal, "exit"), 1);
    }

    #[test]
    fn display_failure_ends_in_exit_only() {
        let journal = Journal::default();
        let (registry, host) = installed(&journal, Answer::Broken);

        registry.dispatch(&host, WINDOW, msg(QUERY_END_SESSION));
        pump(&registry, &host);

        assert_eq!(count(&journal, "open"), 0);
        assert_eq!(count(&journal, "exit"), 1);
        assert_eq!(host.reason(), None);
    }

    #[test]
    fn duplicate_query_schedules_one_dialog() {
        let journal = Journal::default();
        let (registry, host) = installed(&journal, Answer::No);

        assert_eq!(registry.dispatch(&host, WINDOW, msg(QUERY_END_SESSION)), Some(BLOCK));
        assert_eq!(registry.dispatch(&host, WINDOW, msg(QUERY_END_SESSION)), Some(BLOCK));
        assert_eq!(host.queue.borrow().len(), 1);

        pump(&registry, &host);
        assert_eq!(count(&journal, "confirm"), 1);
    }

    #[test]
    fn failed_post_lets_the_session_end() {
        let journal = Journal::default();
        let host = FakeHost {
            fail_post: true,
            ..FakeHost::with_journal(&journal)
        };
        let registry = HookRegistry::default();
        let controller = controller_with(FakeUi::new(&journal, Answer::Yes));
        registry.install(&host, WINDOW, controller.clone()).unwrap();

        assert_eq!(registry.dispatch(&host, WINDOW, msg(QUERY_END_SESSION)), Some(ALLOW));
        assert_eq!(host.reason(), None);
        assert_eq!(controller.current_query(), None);
        assert_eq!(count(&journal, "confirm"), 0);
    }

    #[test]
    fn stray_follow_up_only_clears_reason() {
        let journal = Journal::default();
        let (registry, host) = installed(&journal, Answer::Yes);

        assert_eq!(registry.dispatch(&host, WINDOW, msg(SHOW_DIALOG_DEFERRED)), Some(0));
        assert_eq!(count(&journal, "confirm"), 0);
        assert_eq!(count(&journal, "exit"), 0);
    }

    #[test]
    fn unowned_messages_are_forwarded_verbatim() {
        let journal = Journal::default();
        let (registry, host) = installed(&journal, Answer::Yes);
        let paint = RawMessage::new(0x000F, 7, -3);
        let end = RawMessage::new(END_SESSION, 1, 0x8000_0000);

        assert_eq!(registry.dispatch(&host, WINDOW, paint), Some(0xBEEF + 0x000F));
        assert_eq!(registry.dispatch(&host, WINDOW, end), Some(0xBEEF + END_SESSION as isize));
        assert_eq!(*host.forwarded.borrow(), vec![paint, end]);
        assert_eq!(host.reason(), None);
    }

    #[test]
    fn unknown_window_is_not_handled() {
        let journal = Journal::default();
        let (registry, host) = installed(&journal, Answer::Yes);
        assert_eq!(registry.dispatch(&host, WindowId(0x2000), msg(QUERY_END_SESSION)), None);
        assert_eq!(host.reason(), None);
    }

    #[test]
    fn second_install_on_same_window_is_refused() {
        let journal = Journal::default();
        let (registry, host) = installed(&journal, Answer::Yes);

        let again = registry.install(&host, WINDOW, controller_with(FakeUi::new(&journal, Answer::No)));

        assert!(matches!(again, Err(AppError::HookInstall { .. })));
        assert_eq!(host.installed.borrow().len(), 1);
    }

    #[test]
    fn replace_failure_leaves_no_registration() {
        let journal = Journal::default();
        let host = FakeHost {
            fail_replace: true,
            ..FakeHost::with_journal(&journal)
        };
        let registry = HookRegistry::default();

        let result = registry.install(&host, WINDOW, controller_with(FakeUi::new(&journal, Answer::Yes)));

        assert!(matches!(result, Err(AppError::HookInstall { .. })));
        assert!(!registry.is_installed(WINDOW));
    }

    #[test]
    fn windows_are_independent() {
        let journal_a = Journal::default();
        let journal_b = Journal::default();
        let host = FakeHost::default();
        let registry = HookRegistry::default();
        let other = WindowId(0x3000);
        registry.install(&host, WINDOW, controller_with(FakeUi::new(&journal_a, Answer::Yes))).unwrap();
        registry.install(&host, other, controller_with(FakeUi::new(&journal_b, Answer::No))).unwrap();

        registry.dispatch(&host, other, msg(QUERY_END_SESSION));
        pump(&registry, &host);

        assert_eq!(count(&journal_a, "confirm"), 0);
        assert_eq!(count(&journal_b, "confirm"), 1);
        assert_eq!(count(&journal_b, "open"), 0);
    }

    #[test]
    fn uninstall_restores_original_procedure() {
        let journal = Journal::default();
        let (registry, host) = installed(&journal, Answer::Yes);

        registry.uninstall(&host, WINDOW).unwrap();
        registry.uninstall(&host, WINDOW).unwrap();

        assert!(!registry.is_installed(WINDOW));
        assert_eq!(count(&journal, "restore 0xbeef"), 1);
        assert_eq!(registry.dispatch(&host, WINDOW, msg(QUERY_END_SESSION)), None);
    }

    /// Dialog that pumps messages while open, like a modal message box does.
    struct ReentrantUi {
        registry: RefCell<Weak<HookRegistry>>,
        host: Rc<FakeHost>,
        answers: RefCell<Vec<Option<isize>>>,
    }

    impl ShutdownUi for Rc<ReentrantUi> {
        fn bring_to_foreground(&self, _window: WindowId) {}

        fn confirm(&self, _owner: WindowId, _title: &str, _text: &str) -> Result<Confirmation, AppError> {
            let registry = self.registry.borrow().upgrade().unwrap();
            let mut answers = self.answers.borrow_mut();
            answers.push(registry.dispatch(&*self.host, WINDOW, msg(QUERY_END_SESSION)));
            answers.push(registry.dispatch(&*self.host, WINDOW, msg(SHOW_DIALOG_DEFERRED)));
            answers.push(registry.dispatch(&*self.host, WINDOW, msg(0x000F)));
            Ok(Confirmation::Declined)
        }

        fn open_resource(&self, _owner: WindowId, _target: &str) -> Result<(), AppError> {
            Ok(())
        }

        fn request_exit(&self, _code: i32) {}
    }

    #[test]
    fn messages_arriving_while_dialog_is_open_are_safe() {
        let host = Rc::new(FakeHost::default());
        let registry = Rc::new(HookRegistry::default());
        let ui = Rc::new(ReentrantUi {
            registry: RefCell::new(Weak::new()),
            host: host.clone(),
            answers: RefCell::new(Vec::new()),
        });
        *ui.registry.borrow_mut() = Rc::downgrade(&registry);

        registry
            .install(&*host, WINDOW, controller_with(ui.clone()))
            .unwrap();

        registry.dispatch(&*host, WINDOW, msg(QUERY_END_SESSION));
        pump(&registry, &host);

        let answers = ui.answers.borrow();
        assert_eq!(answers[0], Some(BLOCK));
        assert_eq!(answers[1], Some(0));
        assert_eq!(answers[2], Some(0xBEEF + 0x000F));
        // The repeated query did not schedule a second dialog.
        assert!(host.queue.borrow().is_empty());
        assert_eq!(host.reason(), None);
    }
}
