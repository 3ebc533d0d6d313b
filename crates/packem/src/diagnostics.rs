//! Structured bundler failures.
//!
//! Adapters report failures as [`BundlerError`] values: one per failed task,
//! cloneable and serializable, with an optional source location and a
//! pre-rendered code frame.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A failure of one bundler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlerError {
    /// Label of the task that failed (see `BuildTask::label`).
    pub task: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub code_frame: Option<String>,
    pub help: Option<String>,
}

impl BundlerError {
    pub fn new(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            message: message.into(),
            file: None,
            line: None,
            column: None,
            code_frame: None,
            help: None,
        }
    }

    /// Build an error from free-form adapter output, pulling out a
    /// `path:line:column` location when one is present.
    pub fn from_message(task: impl Into<String>, text: &str) -> Self {
        let mut error = Self::new(task, first_line(text));
        if let Some((file, line, column)) = extract_location(text) {
            error.file = Some(file);
            error.line = Some(line);
            error.column = Some(column);
        }
        error
    }

    pub fn with_location(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Render a code frame from the failing file's source text.
    pub fn attach_code_frame(&mut self, source: &str) {
        if let (Some(line), Some(column)) = (self.line, self.column) {
            self.code_frame = code_frame(source, line, column);
        }
    }
}

impl fmt::Display for BundlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.task, self.message)?;
        if let Some(file) = &self.file {
            write!(f, " ({file}")?;
            if let (Some(line), Some(column)) = (self.line, self.column) {
                write!(f, ":{line}:{column}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for BundlerError {}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Unknown bundler error")
        .to_string()
}

fn location_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([^\s'\x22(]+\.(?:[cm]?[jt]sx?|json|css)):(\d+):(\d+)")
            .unwrap_or_else(|_| unreachable!("location pattern is a valid regex"))
    })
}

/// Find the first `file:line:column` triple in `text`.
pub fn extract_location(text: &str) -> Option<(String, u32, u32)> {
    let captures = location_regex().captures(text)?;
    let file = captures.get(1)?.as_str().to_string();
    let line = captures.get(2)?.as_str().parse().ok()?;
    let column = captures.get(3)?.as_str().parse().ok()?;
    Some((file, line, column))
}

/// Render two lines of context around a 1-based `line`/`column` with a caret.
pub fn code_frame(source: &str, line: u32, column: u32) -> Option<String> {
    let lines: Vec<&str> = source.lines().collect();
    let target = usize::try_from(line).ok()?.checked_sub(1)?;
    if target >= lines.len() {
        return None;
    }

    let start = target.saturating_sub(2);
    let end = (target + 2).min(lines.len() - 1);
    let gutter = (end + 1).to_string().len();

    let mut frame = String::new();
    for (index, text) in lines.iter().enumerate().take(end + 1).skip(start) {
        let marker = if index == target { '>' } else { ' ' };
        frame.push_str(&format!("{marker} {:>gutter$} | {text}\n", index + 1));
        if index == target {
            let pad = usize::try_from(column.max(1) - 1).unwrap_or(0);
            frame.push_str(&format!("  {:>gutter$} | {}^\n", "", " ".repeat(pad)));
        }
    }
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_location_from_message() {
        let error = BundlerError::from_message(
            "esm",
            "Unexpected token\n  at /p/src/index.ts:3:7\n",
        );
        assert_eq!(error.message, "Unexpected token");
        assert_eq!(error.file.as_deref(), Some("/p/src/index.ts"));
        assert_eq!(error.line, Some(3));
        assert_eq!(error.column, Some(7));
    }

    #[test]
    fn message_without_location() {
        let error = BundlerError::from_message("cjs", "something broke");
        assert!(error.file.is_none());
        assert_eq!(error.to_string(), "[cjs] something broke");
    }

    #[test]
    fn code_frame_marks_column() {
        let source = "const a = 1;\nconst b = ;\nconst c = 3;\n";
        let frame = code_frame(source, 2, 11).unwrap();
        assert!(frame.contains("> 2 | const b = ;"));
        assert!(frame.contains("|           ^"));
    }

    #[test]
    fn code_frame_out_of_range() {
        assert!(code_frame("one line", 5, 1).is_none());
        assert!(code_frame("one line", 0, 1).is_none());
    }
}
