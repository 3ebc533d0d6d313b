//! Spinner shown while a build runs.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::{OwoColorize, Style};
use std::time::Duration;

use super::styled;

/// Hidden automatically when stderr is not a terminal.
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_strings(&["◐", "◓", "◑", "◒", "●"]));
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    /// A spinner that never draws, for `--quiet` and `--json`.
    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }

    pub fn set_message(&self, message: &str) {
        self.pb.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.pb.finish_with_message(format!(
            "{} {}",
            "✓".style(styled(Style::new().green())),
            message
        ));
    }

    pub fn fail(&self, message: &str) {
        self.pb.finish_with_message(format!(
            "{} {}",
            "✗".style(styled(Style::new().red())),
            message
        ));
    }

    /// Remove the spinner line without a final message.
    pub fn clear(&self) {
        self.pb.finish_and_clear();
    }
}
