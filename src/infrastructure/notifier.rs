use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<(), InfraError>;
}

/// Desktop-notification stand-in: a highlighted line on stderr plus a log record.
#[derive(Debug, Clone)]
pub struct TerminalNotifier {
    enabled: bool,
}

impl TerminalNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Notifier for TerminalNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), InfraError> {
        if !self.enabled {
            return Ok(());
        }
        info!(title, body, "notification");
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(format!("\n*** {title}: {body}\n").as_bytes())
            .await?;
        stderr.flush().await?;
        Ok(())
    }
}
