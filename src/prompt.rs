//! Confirmation prompt on the terminal.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use upload_sync_core::contract::{ConfirmPrompt, ConfirmRequest};

/// Asks on stdout and reads the answer from stdin. Anything but `y`/`yes` declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

#[async_trait]
impl ConfirmPrompt for TerminalPrompt {
    async fn confirm(&self, request: ConfirmRequest) -> bool {
        let mut stdout = tokio::io::stdout();
        let question = format!("{}: {} [y/N] ", request.title, request.message);
        if stdout.write_all(question.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return false;
        }

        let mut answer = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut answer).await {
            Ok(_) => is_yes(&answer),
            Err(e) => {
                tracing::warn!(error = ?e, "Could not read confirmation answer");
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
