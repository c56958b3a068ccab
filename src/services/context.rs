use crate::services::store::ConversationStore;

/// Which of the two context notices a toggle produced. Wording and display
/// belong to the notification collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextNotice {
    Enabled,
    Disabled,
}

/// Receives the toggle confirmation (a toast, a status line, ...).
pub trait Notifier {
    fn notify(&self, notice: ContextNotice);
}

/// Flips the "include prior turns as context" flag stored on the
/// conversation store and confirms every flip to the user, exactly once.
pub struct ContextController {
    notifier: Box<dyn Notifier>,
}

impl ContextController {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn is_enabled(&self, store: &ConversationStore) -> bool {
        store.using_context()
    }

    /// Toggle the flag and emit the matching notice. The notice reflects
    /// the state being left: leaving enabled announces "disabled", leaving
    /// disabled announces "enabled". Read before flipping.
    pub fn toggle(&self, store: &mut ConversationStore) -> bool {
        let was_enabled = store.using_context();
        store.set_using_context(!was_enabled);
        let notice = if was_enabled {
            ContextNotice::Disabled
        } else {
            ContextNotice::Enabled
        };
        self.notifier.notify(notice);
        !was_enabled
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        notices: Arc<Mutex<Vec<ContextNotice>>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: ContextNotice) {
            self.notices.lock().unwrap().push(notice);
        }
    }

    #[test]
    fn test_toggle_off_notifies_disabled() {
        let notifier = RecordingNotifier::default();
        let controller = ContextController::new(Box::new(notifier.clone()));
        let mut store = ConversationStore::new();
        assert!(controller.is_enabled(&store));

        let now_enabled = controller.toggle(&mut store);

        assert!(!now_enabled);
        assert!(!store.using_context());
        assert_eq!(
            *notifier.notices.lock().unwrap(),
            vec![ContextNotice::Disabled]
        );
    }

    #[test]
    fn test_toggle_on_notifies_enabled() {
        let notifier = RecordingNotifier::default();
        let controller = ContextController::new(Box::new(notifier.clone()));
        let mut store = ConversationStore::new();
        store.set_using_context(false);

        let now_enabled = controller.toggle(&mut store);

        assert!(now_enabled);
        assert!(store.using_context());
        assert_eq!(
            *notifier.notices.lock().unwrap(),
            vec![ContextNotice::Enabled]
        );
    }

    #[test]
    fn test_each_toggle_notifies_exactly_once() {
        let notifier = RecordingNotifier::default();
        let controller = ContextController::new(Box::new(notifier.clone()));
        let mut store = ConversationStore::new();

        controller.toggle(&mut store);
        controller.toggle(&mut store);
        controller.toggle(&mut store);

        assert_eq!(
            *notifier.notices.lock().unwrap(),
            vec![
                ContextNotice::Disabled,
                ContextNotice::Enabled,
                ContextNotice::Disabled,
            ]
        );
    }
}
