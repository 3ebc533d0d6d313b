//! Filesystem abstraction used by the orchestrator.
//!
//! Every file the orchestrator touches (package.json, source probing, the
//! output walk) goes through [`Runtime`], so tests and embedders can swap the
//! platform implementation.

mod native;

pub use native::NativeRuntime;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur during runtime operations
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Other runtime error
    #[error("Runtime error: {0}")]
    Other(String),
}

/// File metadata
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Whether this is a directory
    pub is_dir: bool,
    /// Whether this is a file
    pub is_file: bool,
    /// Last modified timestamp (milliseconds since epoch)
    pub modified: Option<u64>,
}

/// Platform runtime trait.
#[async_trait]
pub trait Runtime: Send + Sync + std::fmt::Debug {
    /// Read a file from the filesystem
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>>;

    /// Write a file, creating parent directories as needed
    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()>;

    /// Get file metadata
    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata>;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is an existing regular file
    fn is_file(&self, path: &Path) -> bool;

    /// Create a directory
    async fn create_dir(&self, path: &Path, recursive: bool) -> RuntimeResult<()>;

    /// Remove a directory and everything below it
    async fn remove_dir_all(&self, path: &Path) -> RuntimeResult<()>;

    /// List the entry names of a directory, sorted
    async fn read_dir(&self, path: &Path) -> RuntimeResult<Vec<String>>;

    /// Get the current working directory
    fn get_cwd(&self) -> RuntimeResult<PathBuf>;
}

/// Recursively list every file below `dir`, as absolute paths sorted
/// lexicographically.
///
/// Directories named in `skip_dirs` are not descended into.
pub async fn walk_files(
    runtime: &dyn Runtime,
    dir: &Path,
    skip_dirs: &[&str],
) -> RuntimeResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        for name in runtime.read_dir(&current).await? {
            let path = current.join(&name);
            let meta = runtime.metadata(&path).await?;
            if meta.is_dir {
                if !skip_dirs.contains(&name.as_str()) {
                    stack.push(path);
                }
            } else if meta.is_file {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn walk_files_is_sorted_and_skips_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("b/nested")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("b/nested/z.ts"), "").unwrap();
        std::fs::write(root.join("a.ts"), "").unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "").unwrap();

        let runtime = NativeRuntime::new();
        let files = walk_files(&runtime, root, &["node_modules"]).await.unwrap();

        assert_eq!(
            files,
            vec![root.join("a.ts"), root.join("b/nested/z.ts")]
        );
    }

    #[tokio::test]
    async fn walk_files_missing_dir_errors() {
        let dir = TempDir::new().unwrap();
        let runtime = NativeRuntime::new();
        let result = walk_files(&runtime, &dir.path().join("missing"), &[]).await;
        assert!(matches!(result, Err(RuntimeError::FileNotFound(_))));
    }
}
