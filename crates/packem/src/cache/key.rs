//! Cache key computation using BLAKE3 content-addressed hashing.

use blake3::Hasher;
use std::path::Path;

use super::CacheResult;
use crate::group::BuildTask;
use crate::runtime::{Runtime, walk_files};

/// Current cache format version. Increment when cache format changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Content-addressed cache key (BLAKE3 hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash of everything shared by the tasks of one build.
///
/// Covers, in order:
/// 1. cache format version and crate version
/// 2. `package.json` bytes
/// 3. resolved options as JSON
/// 4. source tree fingerprint (sorted relative paths + content hashes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildFingerprint(blake3::Hash);

impl BuildFingerprint {
    pub fn new(package_json: &[u8], options_json: &str, sources: blake3::Hash) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(&CACHE_FORMAT_VERSION.to_le_bytes());
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update(b"\0");
        hasher.update(blake3::hash(package_json).as_bytes());
        hasher.update(options_json.as_bytes());
        hasher.update(b"\0");
        hasher.update(sources.as_bytes());
        Self(hasher.finalize())
    }

    /// Key for one task: the build fingerprint plus the task descriptor.
    pub fn task_key(&self, task: &BuildTask) -> CacheResult<CacheKey> {
        let descriptor = serde_json::to_vec(task)
            .map_err(|e| super::CacheError::SerializationError(e.to_string()))?;

        let mut hasher = Hasher::new();
        hasher.update(self.0.as_bytes());
        hasher.update(&descriptor);
        Ok(CacheKey(hasher.finalize().to_hex().to_string()))
    }
}

/// Fingerprint every file below `source_dir`.
pub async fn source_fingerprint(
    runtime: &dyn Runtime,
    source_dir: &Path,
) -> CacheResult<blake3::Hash> {
    let files = walk_files(runtime, source_dir, &["node_modules"]).await?;

    let mut hasher = Hasher::new();
    for file in files {
        let relative = file.strip_prefix(source_dir).unwrap_or(&file);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        let content = runtime.read_file(&file).await?;
        hasher.update(blake3::hash(&content).as_bytes());
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::runtime::NativeRuntime;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fingerprint_changes_with_content() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.ts"), "export const a = 1;").unwrap();
        let runtime = NativeRuntime::new();

        let first = source_fingerprint(&runtime, dir.path()).await.unwrap();
        let again = source_fingerprint(&runtime, dir.path()).await.unwrap();
        assert_eq!(first, again);

        std::fs::write(dir.path().join("index.ts"), "export const a = 2;").unwrap();
        let changed = source_fingerprint(&runtime, dir.path()).await.unwrap();
        assert_ne!(first, changed);
    }

    #[test]
    fn build_fingerprint_covers_package_and_options() {
        let sources = blake3::hash(b"sources");
        let base = BuildFingerprint::new(b"{}", "{}", sources);

        assert_eq!(base, BuildFingerprint::new(b"{}", "{}", sources));
        assert_ne!(base, BuildFingerprint::new(b"{\"a\":1}", "{}", sources));
        assert_ne!(base, BuildFingerprint::new(b"{}", "{\"minify\":true}", sources));
    }
}
