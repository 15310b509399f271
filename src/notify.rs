//! Stateless notification emitter.
//!
//! Every notification goes out on one fixed channel. Presentation is up to
//! the [`Notifier`] implementation; the CLI uses [`ConsoleNotifier`].

use std::io::Write;
use thiserror::Error;

pub const CHANNEL_ID: &str = "newsdesk_updates";
pub const CHANNEL_NAME: &str = "News updates";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification title must not be empty")]
    EmptyTitle,
    #[error("Failed to write notification: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: i32,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(id: i32, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
        }
    }

    /// Single-line rendering used by console output
    pub fn render(&self) -> String {
        if self.body.is_empty() {
            format!("[{CHANNEL_NAME}] #{} {}", self.id, self.title)
        } else {
            format!("[{CHANNEL_NAME}] #{} {}: {}", self.id, self.title, self.body)
        }
    }
}

pub trait Notifier {
    fn show(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Prints notifications to stderr and records them as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    fn write_to(&self, out: &mut impl Write, notification: &Notification) -> Result<(), NotifyError> {
        if notification.title.trim().is_empty() {
            return Err(NotifyError::EmptyTitle);
        }
        tracing::info!(
            channel = CHANNEL_ID,
            id = notification.id,
            title = %notification.title,
            "Notification"
        );
        writeln!(out, "{}", notification.render())?;
        Ok(())
    }
}

impl Notifier for ConsoleNotifier {
    fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.write_to(&mut std::io::stderr().lock(), notification)
    }
}
