//! Sizes, durations and the tables printed after a build.

use console::Term;
use owo_colors::{OwoColorize, Style};
use packem::{BuildEntry, BuildOutcome, BuildReportEntry};
use std::path::Path;
use std::time::Duration;

use super::styled;

/// Binary units, two decimals above bytes.
///
/// ```
/// use packem_cli::ui::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(500), "500 B");
/// assert_eq!(format_size(1024), "1.00 KB");
/// assert_eq!(format_size(1_048_576), "1.00 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    packem::size_limit::human_size(bytes)
}

/// ```
/// use std::time::Duration;
/// use packem_cli::ui::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms < 1000 {
        format!("{total_ms}ms")
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

fn table_width() -> usize {
    let (_, cols) = Term::stderr().size();
    (cols as usize).clamp(40, 80)
}

/// Print the build report to stderr: entries with their chunk totals and
/// declarations, then chunks not owned by any entry, then assets.
pub fn print_report(outcome: &BuildOutcome) {
    let report = &outcome.report;
    let width = table_width();
    let dim = styled(Style::new().dimmed());

    eprintln!();
    for entry in report.entries() {
        print_row(entry, width, styled(Style::new().bold().cyan()));
        if let Some(total) = entry.total_bytes.filter(|total| *total != entry.bytes) {
            eprintln!("  {}", format!("total {}", format_size(total)).style(dim));
        }
        if let Some(types) = &entry.types {
            eprintln!("  {}", format!("types {types}").style(dim));
        }
        if let Some(exports) = entry.exports.as_ref().filter(|e| !e.is_empty()) {
            eprintln!("  {}", format!("exports {}", exports.join(", ")).style(dim));
        }
    }

    let loose = report.loose_chunks();
    if !loose.is_empty() {
        eprintln!("{}", "chunks".style(dim));
        for chunk in loose {
            print_row(chunk, width, Style::new());
        }
    }

    let assets = report.assets();
    if !assets.is_empty() {
        eprintln!("{}", "assets".style(dim));
        for asset in assets {
            print_row(asset, width, Style::new());
        }
    }

    eprintln!("{}", "─".repeat(width).style(dim));
    eprintln!(
        "{} files, {} in {}",
        report.len(),
        format_size(report.total_bytes()).style(styled(Style::new().bold())),
        format_duration(outcome.duration)
    );

    let cached = outcome.tasks.iter().filter(|task| task.cached).count();
    if cached > 0 {
        eprintln!(
            "{}",
            format!("{cached} of {} tasks restored from cache", outcome.tasks.len()).style(dim)
        );
    }
}

fn print_row(record: &BuildReportEntry, width: usize, style: Style) {
    let size = format_size(record.bytes);
    let pad = width.saturating_sub(record.path.len() + size.len()).max(1);
    eprintln!(
        "{}{}{}",
        record.path.style(style),
        " ".repeat(pad),
        size.style(styled(Style::new().green()))
    );
}

/// One row per entry: name, source, formats, environment, runtime.
pub fn entry_rows(entries: &[BuildEntry], root: &Path) -> Vec<[String; 5]> {
    entries
        .iter()
        .map(|entry| {
            let mut formats = Vec::new();
            if entry.wants_esm() {
                formats.push("esm");
            }
            if entry.wants_cjs() {
                formats.push("cjs");
            }
            if entry.wants_declaration() {
                formats.push("dts");
            }
            [
                entry.output_stem().to_string(),
                packem::options::relative_slash(root, &entry.input),
                formats.join("+"),
                entry
                    .environment
                    .map(|env| env.as_str().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                entry
                    .runtime
                    .map(|runtime| runtime.as_str().to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect()
}

/// Print the resolved entries to stdout.
pub fn print_entries(entries: &[BuildEntry], root: &Path) {
    const HEADER: [&str; 5] = ["name", "source", "formats", "env", "runtime"];
    let rows = entry_rows(entries, root);

    let mut widths = HEADER.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cells: [&str; 5]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", line(HEADER).style(styled(Style::new().bold())));
    for row in &rows {
        println!("{}", line(row.each_ref().map(String::as_str)));
    }
}
