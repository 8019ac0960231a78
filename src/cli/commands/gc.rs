//! Gc command - drop cache entries no pointer file references

use super::Workspace;
use crate::cli::args::GcArgs;
use crate::error::HoardResult;
use crate::target::Target;
use crate::ui::{self, UiContext};

/// Execute the gc command
pub async fn execute(args: GcArgs, ws: &Workspace, ctx: &UiContext) -> HoardResult<()> {
    let ctx = ctx.clone().with_auto_yes(args.yes);
    let live: Vec<_> = Target::discover(ws.root())?
        .into_iter()
        .map(|t| t.info)
        .collect();

    let prompt = format!(
        "Remove every cache entry not referenced by the {} tracked paths?",
        live.len()
    );
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::step_info(&ctx, "Aborted, nothing removed (pass --yes to skip this prompt)");
        return Ok(());
    }

    let report = ws.blocking(move |cache| cache.gc(&live)).await?;
    ui::step_ok(
        &ctx,
        &format!(
            "Removed {} cache entries and {} temporary files",
            report.removed, report.orphans
        ),
    );
    Ok(())
}
