//! Status lines on stderr.

use owo_colors::{OwoColorize, Style};

use super::{is_quiet, styled};

pub fn success(message: &str) {
    if is_quiet() {
        return;
    }
    eprintln!("{} {}", "✓".style(styled(Style::new().green().bold())), message);
}

pub fn info(message: &str) {
    if is_quiet() {
        return;
    }
    eprintln!("{} {}", "ℹ".style(styled(Style::new().blue().bold())), message);
}

/// Build warnings are printed through this, one per line.
pub fn warning(message: &str) {
    if is_quiet() {
        return;
    }
    eprintln!(
        "{} {}",
        "⚠".style(styled(Style::new().yellow().bold())),
        message.style(styled(Style::new().yellow()))
    );
}

pub fn error(message: &str) {
    eprintln!(
        "{} {}",
        "✗".style(styled(Style::new().red().bold())),
        message.style(styled(Style::new().red()))
    );
}
