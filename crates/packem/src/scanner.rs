//! Source tree scanning for auto-detected entries.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::options::relative_slash;
use crate::runtime::{Runtime, RuntimeError, walk_files};
use crate::{Error, Result};

/// Directories never descended into.
const SKIP_DIRS: [&str; 3] = ["node_modules", "__tests__", "__snapshots__"];

/// A candidate entry file below the source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the source directory, `/`-separated, without extension.
    pub name: String,
    /// With a leading dot.
    pub extension: String,
}

/// List entry candidates below `source_dir`, sorted by name.
///
/// Declaration files and test files are skipped. A missing directory and a
/// directory without candidates are both `NotFound` errors.
pub async fn scan(
    runtime: &dyn Runtime,
    source_dir: &Path,
    extensions: &[String],
) -> Result<Vec<SourceFile>> {
    let label = source_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_dir.display().to_string());

    let is_dir = match runtime.metadata(source_dir).await {
        Ok(meta) => meta.is_dir,
        Err(RuntimeError::FileNotFound(_)) => false,
        Err(e) => return Err(e.into()),
    };
    if !is_dir {
        return Err(Error::not_found(
            format!("No '{label}' directory found."),
            source_dir,
        ));
    }

    let mut files: Vec<SourceFile> = walk_files(runtime, source_dir, &SKIP_DIRS)
        .await?
        .into_iter()
        .filter_map(|path| classify(source_dir, path, extensions))
        .collect();

    if files.is_empty() {
        return Err(Error::not_found(
            format!("No source files found in '{label}'."),
            source_dir,
        ));
    }

    files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    tracing::debug!(count = files.len(), dir = %source_dir.display(), "scanned source files");
    Ok(files)
}

fn classify(source_dir: &Path, path: PathBuf, extensions: &[String]) -> Option<SourceFile> {
    let file_name = path.file_name()?.to_string_lossy().into_owned();
    if is_declaration_file(&file_name) || is_test_file(&file_name) {
        return None;
    }

    // Longest match, so `a.mts` is not read as `a.m` + `.ts`.
    let extension = extensions
        .iter()
        .filter(|ext| file_name.ends_with(ext.as_str()) && file_name.len() > ext.len())
        .max_by_key(|ext| ext.len())?
        .clone();

    let relative = relative_slash(source_dir, &path);
    let name = relative.strip_suffix(extension.as_str())?.to_string();
    Some(SourceFile {
        path,
        name,
        extension,
    })
}

pub fn is_declaration_file(file_name: &str) -> bool {
    [".d.ts", ".d.mts", ".d.cts"]
        .iter()
        .any(|ext| file_name.ends_with(ext))
}

pub fn is_test_file(file_name: &str) -> bool {
    let mut parts = file_name.split('.');
    parts.next();
    parts.any(|part| part == "test" || part == "spec")
}
