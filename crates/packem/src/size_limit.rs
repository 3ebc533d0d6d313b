//! Emitted-size budgets.
//!
//! Limits are globs over report paths mapped to a size, plus an optional
//! limit on the total. Violations fail the build with [`Error::SizeLimit`],
//! or come back as warnings when `allowFail` is set.

use regex::Regex;
use std::sync::OnceLock;

use crate::options::{BundleLimitOptions, SizeValue};
use crate::report::BuildReport;
use crate::{Error, Result};

fn size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(b|kb|kib|k|mb|mib|m|gb|gib|g)?\s*$")
            .unwrap_or_else(|_| unreachable!("size pattern is a valid regex"))
    })
}

/// Parse `2048`, `"10 KB"`, `"1.5mb"` into bytes. Units are binary.
pub fn parse_size(value: &SizeValue) -> Result<u64> {
    let text = match value {
        SizeValue::Bytes(bytes) => return Ok(*bytes),
        SizeValue::Text(text) => text,
    };

    let invalid = || {
        Error::config(format!(
            "Invalid size limit \"{text}\": expected a number of bytes or a size such as \"10 KB\"."
        ))
    };

    let captures = size_regex().captures(text).ok_or_else(invalid)?;
    let number: f64 = captures
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(invalid)?;
    let multiplier: u64 = match captures
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("b") => 1,
        Some("k" | "kb" | "kib") => 1024,
        Some("m" | "mb" | "mib") => 1024 * 1024,
        Some(_) => 1024 * 1024 * 1024,
    };

    Ok((number * multiplier as f64).round() as u64)
}

/// `1536` -> `1.50 KB`
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}

/// Check the report against the configured limits.
///
/// Returns the violations as warnings when `allow_fail` is set.
pub fn check(report: &BuildReport, options: &BundleLimitOptions) -> Result<Vec<String>> {
    let mut violations = Vec::new();

    for (pattern, limit) in &options.limits {
        let limit = parse_size(limit)?;
        let glob = glob::Pattern::new(pattern).map_err(|e| {
            Error::config(format!("Invalid size limit pattern \"{pattern}\": {e}"))
        })?;

        for record in report.records().filter(|r| glob.matches(&r.path)) {
            let observed = record.total_bytes.unwrap_or(record.bytes);
            if observed > limit {
                violations.push(format!(
                    "File \"{}\" is {}, which exceeds the limit of {} set by \"{pattern}\".",
                    record.path,
                    human_size(observed),
                    human_size(limit)
                ));
            }
        }
    }

    if let Some(total_limit) = &options.limit {
        let limit = parse_size(total_limit)?;
        let total = report.total_bytes();
        if total > limit {
            violations.push(format!(
                "Total output is {}, which exceeds the limit of {}.",
                human_size(total),
                human_size(limit)
            ));
        }
    }

    if violations.is_empty() {
        return Ok(violations);
    }
    if options.allow_fail {
        tracing::debug!(count = violations.len(), "size limits exceeded, reporting as warnings");
        Ok(violations)
    } else {
        Err(Error::SizeLimit(violations))
    }
}
