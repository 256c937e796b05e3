use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::debug;

#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    /// Resolves once; a dismissed prompt counts as not confirmed.
    async fn confirm(
        &self,
        message: &str,
        confirm_label: &str,
        cancel_label: &str,
    ) -> Result<bool, InfraError>;
}

/// Yes/no prompt answered by the next line the terminal reader hands over.
#[derive(Debug, Default)]
pub struct TerminalPrompt {
    pending: Mutex<Option<oneshot::Sender<bool>>>,
}

impl TerminalPrompt {
    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|pending| pending.is_some())
            .unwrap_or(false)
    }

    /// Returns `false` when no prompt was waiting, so the line is a regular command.
    pub fn answer(&self, line: &str) -> bool {
        let Some(sender) = self.take_sender() else {
            return false;
        };
        let confirmed = parse_answer(line);
        debug!(confirmed, "confirmation answered");
        let _ = sender.send(confirmed);
        true
    }

    pub fn dismiss(&self) {
        if self.take_sender().is_some() {
            debug!("confirmation dismissed");
        }
    }

    fn take_sender(&self) -> Option<oneshot::Sender<bool>> {
        self.pending.lock().ok().and_then(|mut pending| pending.take())
    }

    async fn ask<W>(
        &self,
        output: &mut W,
        message: &str,
        confirm_label: &str,
        cancel_label: &str,
    ) -> Result<bool, InfraError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let (sender, receiver) = oneshot::channel();
        {
            let mut pending = self
                .pending
                .lock()
                .map_err(|error| InfraError::SideEffect(format!("prompt lock poisoned: {error}")))?;
            *pending = Some(sender);
        }

        // The next line must stay a command if nobody saw the question.
        if let Err(error) = write_question(output, message, confirm_label, cancel_label).await {
            self.dismiss();
            return Err(error.into());
        }

        Ok(receiver.await.unwrap_or(false))
    }
}

#[async_trait]
impl ConfirmationPrompt for TerminalPrompt {
    async fn confirm(
        &self,
        message: &str,
        confirm_label: &str,
        cancel_label: &str,
    ) -> Result<bool, InfraError> {
        self.ask(&mut tokio::io::stdout(), message, confirm_label, cancel_label)
            .await
    }
}

async fn write_question<W>(
    output: &mut W,
    message: &str,
    confirm_label: &str,
    cancel_label: &str,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output
        .write_all(format!("\n{message}\n  [y] {confirm_label}  [n] {cancel_label}\n> ").as_bytes())
        .await?;
    output.flush().await
}

fn parse_answer(line: &str) -> bool {
    matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "finished" | "done"
    )
}
