use log::{error, info, warn};

#[cfg(test)]
use mockall::automock;

/// 通知の重要度。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// ユーザーに見せる通知。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
}

impl Notification {
    pub fn new(severity: Severity, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            severity,
        }
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(Severity::Info, title)
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(Severity::Success, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(Severity::Warning, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(Severity::Error, title)
    }

    /// 詳細を付けた通知を返す。
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 通知の送り先。送りっぱなしで応答は待たない。
#[cfg_attr(test, automock)]
pub trait Notifier {
    fn notify(&self, notification: &Notification);
}

/// 通知をログに流す。
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        let description = notification.description.as_deref().unwrap_or_default();
        match notification.severity {
            Severity::Info | Severity::Success => info!("{} {}", notification.title, description),
            Severity::Warning => warn!("{} {}", notification.title, description),
            Severity::Error => error!("{} {}", notification.title, description),
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use std::cell::RefCell;

    use super::{Notification, Notifier, Severity};

    /// 受け取った通知を順に記録するテスト用の送り先。
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        received: RefCell<Vec<Notification>>,
    }

    impl RecordingNotifier {
        pub fn titles(&self) -> Vec<String> {
            self.received
                .borrow()
                .iter()
                .map(|notification| notification.title.clone())
                .collect()
        }

        pub fn count(&self, severity: Severity) -> usize {
            self.received
                .borrow()
                .iter()
                .filter(|notification| notification.severity == severity)
                .count()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: &Notification) {
            self.received.borrow_mut().push(notification.clone());
        }
    }
}
