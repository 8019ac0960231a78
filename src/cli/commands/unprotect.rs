//! Unprotect command - make tracked paths writable

use super::Workspace;
use crate::cli::args::UnprotectArgs;
use crate::error::HoardResult;
use crate::ui::{self, UiContext};

/// Execute the unprotect command
pub async fn execute(args: UnprotectArgs, ws: &Workspace, ctx: &UiContext) -> HoardResult<()> {
    for path in args.paths {
        let target = path.clone();
        let count = ws.blocking(move |cache| cache.unprotect(&target)).await?;
        ui::step_ok(
            ctx,
            &format!("Unprotected {} ({} files copied)", path.display(), count),
        );
    }
    Ok(())
}
