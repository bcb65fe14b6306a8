//! Event channel between producers (directory, catalog, uninstall workers) and the single
//! consumer that polls it.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::app::models::{Notification, Severity};

/// Creates a connected producer/consumer pair.
pub fn notification_channel() -> (Notifier, Notifications) {
    let (tx, rx) = mpsc::channel();
    (Notifier { tx }, Notifications { rx })
}

/// Producer side. Cheap to clone; one clone per worker.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Sender<Notification>,
}

impl Notifier {
    /// Never blocks. Events pushed after the consumer is gone are dropped.
    pub fn push(&self, event: Notification) {
        let _ = self.tx.send(event);
    }

    pub fn status(&self, severity: Severity, text: impl Into<String>) {
        self.push(Notification::status(severity, text));
    }
}

/// Consumer side. Not `Sync`, so only one thread can drain it.
#[derive(Debug)]
pub struct Notifications {
    rx: Receiver<Notification>,
}

impl Notifications {
    /// Removes and returns everything queued so far, oldest first. Never blocks.
    pub fn drain_all(&self) -> Vec<Notification> {
        self.rx.try_iter().collect()
    }
}

/// Cuts `value` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_for_status(value: &str, max_chars: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}
