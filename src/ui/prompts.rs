//! Confirmation prompt with a non-interactive fallback

use super::context::UiContext;
use crate::error::{HoardError, HoardResult};

/// Ask a yes/no question
///
/// `--yes` approves without asking; a non-interactive session gets `default`.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> HoardResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| HoardError::User(format!("Prompt task failed: {}", e)))?
    .map_err(|e| HoardError::User(format!("Prompt failed: {}", e)))
}
