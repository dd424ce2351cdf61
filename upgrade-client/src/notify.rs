//! User-facing notifications
//!
//! Fire-and-forget: delivery is a side effect and never blocks or fails
//! the operation that triggered it. The default implementation just logs;
//! embedders plug in their own [`Notifier`].

use tracing::info;

/// What happened, for presentation purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    OfferReceived,
    OfferAccepted,
    OfferDeclined,
    OfferExpired,
    UpgradeConfirmed,
    UpgradeRejected,
}

/// A user-visible notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Notification sink
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Default sink that writes notifications to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            kind = ?notification.kind,
            title = %notification.title,
            body = %notification.body,
            "Notification"
        );
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records notifications for assertions
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Notification>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.sent.lock().unwrap().push(notification);
        }
    }

    #[test]
    fn test_recording_notifier_captures() {
        let notifier = RecordingNotifier::default();
        notifier.notify(Notification::new(
            NotificationKind::OfferReceived,
            "Upgrade Offer",
            "S1-22 is available",
        ));
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::OfferReceived);
    }
}
