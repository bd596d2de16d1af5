//! Transient user notifications ("toasts").

use log::{debug, warn};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// How long the front end should show it.
    pub ttl: Duration,
}

/// Sending side, handed to editors and other action sites.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<Notice>,
}

/// Create a notifier and the receiver the front end drains.
pub fn channel() -> (Notifier, mpsc::UnboundedReceiver<Notice>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Notifier { sender }, receiver)
}

impl Notifier {
    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice {
            level,
            message: message.into(),
            ttl: DEFAULT_TTL,
        };
        debug!("notice {:?}: {}", notice.level, notice.message);
        if self.sender.send(notice).is_err() {
            warn!("notification dropped, nobody is listening");
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Error, message);
    }
}
