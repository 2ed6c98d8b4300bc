//! User-facing notifications raised while exporting.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

/// Sink for messages meant for the person running the export, as opposed to
/// diagnostics meant for logs.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, message: &str);
}

/// Forwards notifications to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Info => tracing::info!(target: "folio::notify", "{message}"),
            NotifyLevel::Warning => tracing::warn!(target: "folio::notify", "{message}"),
            NotifyLevel::Error => tracing::error!(target: "folio::notify", "{message}"),
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<(NotifyLevel, String)>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(NotifyLevel, String)> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        let mut messages = match self.messages.lock() {
            Ok(messages) => messages,
            Err(poisoned) => poisoned.into_inner(),
        };
        messages.push((level, message.to_owned()));
    }
}
