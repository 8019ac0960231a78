//! Save command - store paths and write their pointer files

use super::Workspace;
use crate::cli::args::SaveArgs;
use crate::error::HoardResult;
use crate::target::Target;
use crate::ui::{self, UiContext};

/// Execute the save command
pub async fn execute(args: SaveArgs, ws: &Workspace, ctx: &UiContext) -> HoardResult<()> {
    for path in args.paths {
        let stored = path.clone();
        let info = ws.blocking(move |cache| cache.save(&stored)).await?;
        let pointer = Target::new(&path, info.clone()).save()?;

        ui::step_ok_detail(
            ctx,
            &format!("Saved {} -> {}", path.display(), pointer.display()),
            ui::short(info.as_str()),
        );
    }
    Ok(())
}
