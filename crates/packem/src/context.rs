//! Per-invocation build state.

use indexmap::IndexSet;
use std::sync::Arc;

use crate::cache::FileCache;
use crate::entry::BuildEntry;
use crate::hooks::HookRegistry;
use crate::options::{BuildOptions, ResolvedPaths};
use crate::package_json::PackageJson;
use crate::report::BuildReport;
use crate::tsconfig::TsConfig;

/// State owned by the orchestrator for one build, or one watch session.
///
/// Concurrent tasks never touch this directly: they get owned
/// [`crate::BuildTask`] values, and their results are merged here after the
/// join.
#[derive(Debug)]
pub struct BuildContext {
    pub options: BuildOptions,
    pub paths: ResolvedPaths,
    pub package: PackageJson,
    /// Raw `package.json` bytes, part of the cache key.
    pub package_bytes: Vec<u8>,
    pub tsconfig: Option<TsConfig>,
    pub entries: Vec<BuildEntry>,
    pub report: BuildReport,
    pub hooks: HookRegistry,
    pub cache: Option<Arc<FileCache>>,
    warnings: IndexSet<String>,
}

impl BuildContext {
    pub fn new(
        options: BuildOptions,
        paths: ResolvedPaths,
        package: PackageJson,
        package_bytes: Vec<u8>,
    ) -> Self {
        Self {
            options,
            paths,
            package,
            package_bytes,
            tsconfig: None,
            entries: Vec::new(),
            report: BuildReport::new(),
            hooks: HookRegistry::new(),
            cache: None,
            warnings: IndexSet::new(),
        }
    }

    /// Record a warning once, logging it the first time.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.warnings.contains(&message) {
            tracing::warn!("{message}");
            self.warnings.insert(message);
        }
    }

    pub fn extend_warnings(&mut self, messages: impl IntoIterator<Item = String>) {
        for message in messages {
            self.warn(message);
        }
    }

    pub fn warnings(&self) -> &IndexSet<String> {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings).into_iter().collect()
    }

    /// Reset the per-build accumulators before a rebuild.
    pub fn refresh(&mut self) {
        self.report = BuildReport::new();
        self.warnings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn context() -> BuildContext {
        let options = BuildOptions::default();
        let paths = ResolvedPaths::new(Path::new("/p"), &options);
        BuildContext::new(options, paths, PackageJson::default(), b"{}".to_vec())
    }

    #[test]
    fn warnings_are_deduplicated_in_insertion_order() {
        let mut ctx = context();
        ctx.warn("b");
        ctx.warn("a");
        ctx.warn("b");
        assert_eq!(ctx.warnings().iter().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn refresh_clears_report_and_warnings() {
        let mut ctx = context();
        ctx.warn("stale");
        ctx.refresh();
        assert!(ctx.warnings().is_empty());
        assert!(ctx.report.is_empty());
    }
}
