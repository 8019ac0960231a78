//! Progress bar for batch transfers

use indicatif::{ProgressBar, ProgressStyle};

/// Per-item progress for push, pull and status.
///
/// Shows an indicatif bar when enabled; otherwise silent, since per-item
/// failures are already reported through tracing.
pub struct TransferProgress {
    bar: Option<ProgressBar>,
}

impl TransferProgress {
    /// Create a progress indicator for `total` items
    pub fn new(label: &str, total: usize, visible: bool) -> Self {
        let bar = (visible && total > 0).then(|| {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  {spinner:.cyan} {prefix}  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
            {
                bar.set_style(
                    style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .progress_chars("━╸─"),
                );
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            bar
        });
        Self { bar }
    }

    /// Mark one item done, showing a short form of its checksum
    pub fn inc(&self, checksum: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_message(short(checksum).to_string());
            bar.inc(1);
        }
    }

    /// Finish and clear the progress bar.
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

fn short(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_progress_is_inert() {
        let progress = TransferProgress::new("push", 3, false);
        assert!(progress.bar.is_none());
        progress.inc("abc");
        progress.finish();
    }

    #[test]
    fn empty_batch_has_no_bar() {
        let progress = TransferProgress::new("pull", 0, true);
        assert!(progress.bar.is_none());
    }

    #[test]
    fn short_truncates_long_checksums() {
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
        assert_eq!(short("abc"), "abc");
    }
}
