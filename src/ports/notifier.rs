//! Notification sender port.
//!
//! Fire-and-forget mail delivery. Callers must never let a notification
//! failure abort the enclosing transition; errors are logged and dropped at
//! the call site.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the notification sender.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Port for outbound notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message to a recipient.
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<(), NotifyError>;
}

/// Default notifier that silently drops everything.
///
/// Used when no mail provider is configured, and in tests that don't
/// observe notifications.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _subject: &str, _body: &str, _recipient: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}
