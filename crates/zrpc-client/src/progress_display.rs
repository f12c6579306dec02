//! Indicatif-based terminal progress rendering.

use indicatif::{ProgressBar, ProgressStyle};

use zrpc_core::progress::ProgressCallback;

/// Progress callback rendering a percent bar to the terminal.
///
/// Transfers report percent-granularity updates rather than byte counts,
/// so the bar runs 0 to 100 regardless of payload size.
pub struct TransferBar {
    bar: ProgressBar,
}

impl TransferBar {
    pub fn new(resource: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(Self::style());
        bar.set_message(resource.to_string());
        Self { bar }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("=>-")
    }
}

impl ProgressCallback for TransferBar {
    fn on_progress(&self, percent: u8) {
        self.bar.set_position(percent as u64);
        if percent >= 100 {
            self.bar.finish_with_message("done");
        }
    }
}
