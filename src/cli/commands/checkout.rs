//! Checkout command - restore tracked paths from the cache

use super::Workspace;
use crate::cache::Checkout;
use crate::cli::args::CheckoutArgs;
use crate::error::{HoardError, HoardResult};
use crate::target::Target;
use crate::ui::{self, UiContext};

/// Execute the checkout command
pub async fn execute(args: CheckoutArgs, ws: &Workspace, ctx: &UiContext) -> HoardResult<()> {
    let targets = ws.targets(&args.targets)?;
    restore(ws, ctx, targets, args.force).await
}

/// Check out each target, continuing past ones the cache cannot serve
///
/// Fails only when no target could be checked out.
pub(crate) async fn restore(
    ws: &Workspace,
    ctx: &UiContext,
    targets: Vec<Target>,
    force: bool,
) -> HoardResult<()> {
    let total = targets.len();
    let mut failed = 0;

    for target in targets {
        let path = target.path.clone();
        let info = target.info.clone();
        let result = ws
            .blocking(move |cache| cache.checkout(&path, &info, force))
            .await;

        match result {
            Ok(Checkout::Restored) => {
                ui::step_ok(ctx, &format!("Checked out {}", target.path.display()))
            }
            Ok(Checkout::Unchanged) => {}
            Err(e @ HoardError::WouldOverwrite(_)) => {
                failed += 1;
                ui::step_warn_hint(ctx, &e.to_string(), "Re-run with --force");
            }
            Err(e) if e.is_skippable() => {
                failed += 1;
                ui::step_warn(ctx, &format!("{}: {}", target.path.display(), e));
            }
            Err(e) => return Err(e),
        }
    }

    if failed > 0 && failed == total {
        return Err(HoardError::BatchFailed {
            operation: "checkout",
            failed,
            total,
        });
    }
    Ok(())
}
