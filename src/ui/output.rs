//! Status lines for the binary

use super::context::UiContext;
use crate::cloud::ObjectStatus;
use console::{style, Style};

/// A completed step
pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(message).ok();
    } else {
        println!("  {} {}", style("[OK]").green(), message);
    }
}

/// A completed step with a dimmed detail, usually a checksum
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(format!("{} ({})", message, style(detail).dim())).ok();
    } else {
        println!("  {} {} ({})", style("[OK]").green(), message, detail);
    }
}

pub fn step_warn(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::warning(message).ok();
    } else {
        println!("  {} {}", style("[WARN]").yellow(), message);
    }
}

/// A warning followed by what to do about it
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::warning(format!("{} - {}", message, style(hint).dim())).ok();
    } else {
        println!("  {} {} - {}", style("[WARN]").yellow(), message, hint);
    }
}

pub fn step_info(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::info(message).ok();
    } else {
        println!("  {} {}", style("[INFO]").cyan(), message);
    }
}

pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {}: {}", style(key).dim(), value);
    } else {
        println!("  {}: {}", key, value);
    }
}

/// One row of `hoard status`
pub fn object_status(ctx: &UiContext, status: ObjectStatus, label: &str) {
    let color = match status {
        ObjectStatus::Ok => Style::new().green(),
        ObjectStatus::New => Style::new().cyan(),
        ObjectStatus::Deleted => Style::new().yellow(),
        ObjectStatus::Missing => Style::new().red(),
    };
    let tag = format!("{:<8}", status.as_str());

    if ctx.use_fancy_output() {
        println!("  {} {}", color.apply_to(tag), label);
    } else {
        println!("  {} {}", tag, label);
    }
}

/// Shortened checksum for display
pub fn short(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_non_interactive() {
        let ctx = UiContext::non_interactive();
        step_ok(&ctx, "Saved data");
        step_warn_hint(&ctx, "No remote", "Add one");
        object_status(&ctx, ObjectStatus::New, "abc");
    }

    #[test]
    fn short_keeps_dir_suffix_only_when_short() {
        assert_eq!(short("0123456789abcdef.dir"), "0123456789ab");
        assert_eq!(short("ab.dir"), "ab.dir");
    }
}
