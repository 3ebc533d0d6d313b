//! Terminal output.
//!
//! Everything here writes to stderr except the tables printed by
//! `packem entries`, which are the command's output.
//!
//! ```no_run
//! use packem_cli::ui;
//!
//! ui::init_colors(false);
//! let spinner = ui::Spinner::new("Building...");
//! spinner.finish("Built 3 files");
//! ui::warning("Dependency \"left-pad\" is declared but never imported by the build output.");
//! ```

mod format;
mod messages;
mod spinner;

pub use format::{entry_rows, format_duration, format_size, print_entries, print_report};
pub use messages::{error, info, success, warning};
pub use spinner::Spinner;

use owo_colors::Style;
use std::sync::atomic::{AtomicBool, Ordering};

static COLORS: AtomicBool = AtomicBool::new(true);
static QUIET: AtomicBool = AtomicBool::new(false);

/// Decide once whether output is colored. `--no-color` always wins.
pub fn init_colors(no_color: bool) {
    let enabled = !no_color && crate::logger::should_use_colors();
    COLORS.store(enabled, Ordering::Relaxed);
    console::set_colors_enabled_stderr(enabled);
}

pub fn colors_enabled() -> bool {
    COLORS.load(Ordering::Relaxed)
}

/// `--quiet`: only errors are printed.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// `style` when colors are on, a no-op style otherwise.
pub(crate) fn styled(style: Style) -> Style {
    if colors_enabled() { style } else { Style::new() }
}
