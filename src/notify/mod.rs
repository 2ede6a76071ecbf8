//! Notification sinks.
//!
//! `Notifier` delivers one formatted alert. Implementations retry
//! internally; an `Err` means the message was dropped, and callers must
//! not record it as sent.

pub mod format;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Dry-run sink: writes alerts to the log instead of a chat.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        info!(target: "radar::alerts", chars = text.chars().count(), "\n{text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_always_accepts() {
        assert!(LogNotifier.send("<b>hello</b>").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_notifier_failure_surfaces() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("chat unreachable")));
        assert!(notifier.send("x").await.is_err());
    }
}
