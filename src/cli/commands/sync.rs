//! Push, pull and status - move cache entries between the cache and a remote

use super::checkout::restore;
use super::Workspace;
use crate::checksum::ChecksumInfo;
use crate::cli::args::{OutputFormat, StatusArgs, SyncArgs};
use crate::cloud::{DataCloud, ObjectStatus, TransferSummary};
use crate::error::HoardResult;
use crate::target::Target;
use crate::ui::{self, UiContext};
use std::collections::BTreeMap;

fn cloud(ws: &Workspace, ctx: &UiContext) -> HoardResult<DataCloud> {
    Ok(DataCloud::new(ws.cache.clone(), ws.config.clone())?.with_progress(ctx.show_progress()))
}

fn has_remote(cloud: &DataCloud, ctx: &UiContext, remote: Option<&str>) -> bool {
    if remote.is_some() || cloud.config().default_remote().is_some() {
        return true;
    }
    ui::step_warn_hint(
        ctx,
        "No remote configured",
        "Run: hoard config remote <name> <url> --default",
    );
    false
}

fn report(ctx: &UiContext, verb: &str, summary: &TransferSummary) {
    ui::step_ok(
        ctx,
        &format!(
            "{} {} objects ({} up to date)",
            verb,
            summary.transferred.len(),
            summary.skipped.len()
        ),
    );
    if !summary.failed.is_empty() {
        ui::step_warn(
            ctx,
            &format!("{} objects failed, rerun with -v for details", summary.failed.len()),
        );
    }
}

/// Execute the push command
pub async fn push(args: SyncArgs, ws: &Workspace, ctx: &UiContext) -> HoardResult<()> {
    let cloud = cloud(ws, ctx)?;
    if !has_remote(&cloud, ctx, args.remote.as_deref()) {
        return Ok(());
    }

    let infos = infos(&ws.targets(&args.targets)?);
    let summary = cloud
        .push(&infos, args.jobs, args.remote.as_deref())
        .await?;
    report(ctx, "Pushed", &summary);
    Ok(())
}

/// Execute the pull command, then check out what arrived
pub async fn pull(args: SyncArgs, ws: &Workspace, ctx: &UiContext) -> HoardResult<()> {
    let cloud = cloud(ws, ctx)?;
    if !has_remote(&cloud, ctx, args.remote.as_deref()) {
        return Ok(());
    }

    let targets = ws.targets(&args.targets)?;
    let summary = cloud
        .pull(&infos(&targets), args.jobs, args.remote.as_deref())
        .await?;
    report(ctx, "Pulled", &summary);

    restore(ws, ctx, targets, false).await
}

/// Execute the status command
pub async fn status(args: StatusArgs, ws: &Workspace, ctx: &UiContext) -> HoardResult<()> {
    let cloud = cloud(ws, ctx)?;
    let remote = args.sync.remote.as_deref();
    if !has_remote(&cloud, ctx, remote) {
        return Ok(());
    }

    let targets = ws.targets(&args.sync.targets)?;
    let statuses = cloud.status(&infos(&targets), args.sync.jobs, remote).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        OutputFormat::Table => print_table(ctx, &targets, &statuses),
    }
    Ok(())
}

fn print_table(ctx: &UiContext, targets: &[Target], statuses: &BTreeMap<String, ObjectStatus>) {
    if statuses.is_empty() {
        ui::step_info(ctx, "Nothing to compare");
        return;
    }

    let labels: BTreeMap<&str, String> = targets
        .iter()
        .map(|t| (t.info.as_str(), t.path.display().to_string()))
        .collect();

    let mut in_sync = 0;
    for (checksum, status) in statuses {
        if *status == ObjectStatus::Ok {
            in_sync += 1;
            continue;
        }
        let label = labels
            .get(checksum.as_str())
            .cloned()
            .unwrap_or_else(|| checksum.clone());
        ui::object_status(ctx, *status, &label);
    }

    if in_sync == statuses.len() {
        ui::step_ok(ctx, "Cache and remote are in sync");
    } else {
        ui::key_value(ctx, "in sync", &format!("{}/{}", in_sync, statuses.len()));
    }
}

fn infos(targets: &[Target]) -> Vec<ChecksumInfo> {
    targets.iter().map(|t| t.info.clone()).collect()
}
