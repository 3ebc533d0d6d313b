//! Build report aggregation.
//!
//! Task outputs are folded in planned order, so "first writer wins" is
//! deterministic. [`BuildReport::finalize`] then resolves each entry's
//! transitive chunk set and cross-links declaration files.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::bundler::ModuleSize;
use crate::extension::{DeclaredKind, declaration_extension, split_declared};
use crate::group::TaskOutput;
use crate::options::relative_slash;
use crate::runtime::{Runtime, RuntimeResult, walk_files};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Entry,
    Chunk,
    Asset,
}

/// One emitted file. Paths are relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReportEntry {
    pub path: String,
    pub bytes: u64,
    #[serde(rename = "type")]
    pub kind: ReportKind,
    /// Logical entry name, for entry records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Chunks reachable from this entry through static imports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exports: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<ModuleSize>>,
    /// Declaration file emitted for this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<String>,
    /// Entry bytes plus the bytes of every reachable chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
}

impl BuildReportEntry {
    fn new(path: String, bytes: u64, kind: ReportKind) -> Self {
        Self {
            path,
            bytes,
            kind,
            name: None,
            chunks: None,
            exports: None,
            modules: None,
            types: None,
            total_bytes: None,
        }
    }
}

/// Everything a build emitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    records: IndexMap<String, BuildReportEntry>,
    #[serde(skip)]
    imports: IndexMap<String, Vec<String>>,
    /// Chunk paths imported by at least one chunk.
    used_imports: IndexSet<String>,
    /// Bare specifiers left external by any chunk.
    external_imports: IndexSet<String>,
}

impl BuildReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one task's output into the report.
    pub fn record(&mut self, output: &TaskOutput) {
        for chunk in &output.chunks {
            self.imports
                .entry(chunk.path.clone())
                .or_insert_with(|| chunk.imports.clone());
            self.used_imports.extend(chunk.imports.iter().cloned());
            self.external_imports
                .extend(chunk.external_imports.iter().cloned());

            if self.records.contains_key(&chunk.path) {
                continue;
            }
            let kind = if chunk.is_entry {
                ReportKind::Entry
            } else {
                ReportKind::Chunk
            };
            let mut record = BuildReportEntry::new(chunk.path.clone(), chunk.bytes, kind);
            if chunk.is_entry {
                record.name = chunk.entry_name.clone();
                record.exports = Some(chunk.exports.clone());
            }
            if !chunk.modules.is_empty() {
                record.modules = Some(chunk.modules.clone());
            }
            self.records.insert(chunk.path.clone(), record);
        }

        for asset in &output.assets {
            if !self.records.contains_key(&asset.path) {
                self.records.insert(
                    asset.path.clone(),
                    BuildReportEntry::new(asset.path.clone(), asset.bytes, ReportKind::Asset),
                );
            }
        }
    }

    /// Record files under `out_dir` that no task reported, sized by stat.
    pub async fn record_untracked(&mut self, runtime: &dyn Runtime, out_dir: &Path) -> RuntimeResult<()> {
        if !runtime.exists(out_dir) {
            return Ok(());
        }
        for file in walk_files(runtime, out_dir, &[]).await? {
            let path = relative_slash(out_dir, &file);
            if self.records.contains_key(&path) {
                continue;
            }
            let meta = runtime.metadata(&file).await?;
            tracing::debug!(%path, bytes = meta.size, "untracked output file");
            self.records.insert(
                path.clone(),
                BuildReportEntry::new(path, meta.size, ReportKind::Asset),
            );
        }
        Ok(())
    }

    /// Resolve transitive chunks, `totalBytes` and declaration links.
    pub fn finalize(&mut self) {
        let entry_paths: Vec<String> = self
            .records
            .values()
            .filter(|r| r.kind == ReportKind::Entry)
            .map(|r| r.path.clone())
            .collect();

        for path in entry_paths {
            let chunks = self.reachable_chunks(&path);
            let chunk_bytes: u64 = chunks
                .iter()
                .filter_map(|c| self.records.get(c))
                .map(|r| r.bytes)
                .sum();
            let types = declaration_for(&path).filter(|dts| self.records.contains_key(dts));

            if let Some(record) = self.records.get_mut(&path) {
                record.total_bytes = Some(record.bytes + chunk_bytes);
                record.chunks = Some(chunks);
                record.types = types;
            }
        }
    }

    fn reachable_chunks(&self, entry: &str) -> Vec<String> {
        let mut seen: IndexSet<String> = IndexSet::new();
        let mut stack: Vec<&str> = vec![entry];
        while let Some(current) = stack.pop() {
            for import in self.imports.get(current).into_iter().flatten() {
                if import != entry && seen.insert(import.clone()) {
                    stack.push(import);
                }
            }
        }
        let mut chunks: Vec<String> = seen.into_iter().collect();
        chunks.sort();
        chunks
    }

    pub fn get(&self, path: &str) -> Option<&BuildReportEntry> {
        self.records.get(path)
    }

    pub fn records(&self) -> impl Iterator<Item = &BuildReportEntry> {
        self.records.values()
    }

    fn of_kind(&self, kind: ReportKind) -> impl Iterator<Item = &BuildReportEntry> {
        self.records.values().filter(move |r| r.kind == kind)
    }

    pub fn entries(&self) -> Vec<&BuildReportEntry> {
        self.of_kind(ReportKind::Entry).collect()
    }

    pub fn chunks(&self) -> Vec<&BuildReportEntry> {
        self.of_kind(ReportKind::Chunk).collect()
    }

    pub fn assets(&self) -> Vec<&BuildReportEntry> {
        self.of_kind(ReportKind::Asset).collect()
    }

    /// Non-entry chunks that nothing imports.
    pub fn loose_chunks(&self) -> Vec<&BuildReportEntry> {
        self.of_kind(ReportKind::Chunk)
            .filter(|r| !self.used_imports.contains(&r.path))
            .collect()
    }

    /// Sum of every recorded file, declarations included.
    pub fn total_bytes(&self) -> u64 {
        self.records.values().map(|r| r.bytes).sum()
    }

    pub fn used_imports(&self) -> &IndexSet<String> {
        &self.used_imports
    }

    pub fn external_imports(&self) -> &IndexSet<String> {
        &self.external_imports
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// `index.mjs` -> `index.d.mts`
fn declaration_for(path: &str) -> Option<String> {
    let (stem, extension, kind) = split_declared(path)?;
    match kind {
        DeclaredKind::Js(_) => Some(format!("{stem}{}", declaration_extension(extension))),
        DeclaredKind::Declaration => None,
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::group::{EmittedAsset, EmittedChunk};
    use crate::runtime::NativeRuntime;
    use tempfile::TempDir;

    fn chunk(path: &str, bytes: u64, is_entry: bool, imports: &[&str]) -> EmittedChunk {
        EmittedChunk {
            path: path.to_string(),
            bytes,
            is_entry,
            entry_name: is_entry.then(|| path.split('.').next().unwrap_or(path).to_string()),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            external_imports: Vec::new(),
            exports: Vec::new(),
            modules: Vec::new(),
        }
    }

    fn asset(path: &str, bytes: u64) -> EmittedAsset {
        EmittedAsset {
            path: path.to_string(),
            bytes,
        }
    }

    #[test]
    fn total_bytes_follow_transitive_chunks() {
        let mut report = BuildReport::new();
        report.record(&TaskOutput {
            chunks: vec![
                chunk("index.mjs", 100, true, &["shared-a.mjs"]),
                chunk("shared-a.mjs", 40, false, &["shared-b.mjs"]),
                chunk("shared-b.mjs", 10, false, &[]),
                chunk("orphan.mjs", 5, false, &[]),
            ],
            ..Default::default()
        });
        report.finalize();

        let entry = report.get("index.mjs").unwrap();
        assert_eq!(entry.total_bytes, Some(150));
        assert_eq!(
            entry.chunks.as_deref(),
            Some(&["shared-a.mjs".to_string(), "shared-b.mjs".to_string()][..])
        );

        let loose: Vec<_> = report.loose_chunks().iter().map(|r| r.path.clone()).collect();
        assert_eq!(loose, vec!["orphan.mjs"]);
        assert_eq!(report.total_bytes(), 155);
    }

    #[test]
    fn declarations_link_but_do_not_count_toward_entry_total() {
        let mut report = BuildReport::new();
        report.record(&TaskOutput {
            chunks: vec![chunk("index.cjs", 100, true, &[])],
            ..Default::default()
        });
        report.record(&TaskOutput {
            assets: vec![asset("index.d.cts", 30)],
            ..Default::default()
        });
        report.finalize();

        let entry = report.get("index.cjs").unwrap();
        assert_eq!(entry.types.as_deref(), Some("index.d.cts"));
        assert_eq!(entry.total_bytes, Some(100));
        assert_eq!(report.total_bytes(), 130);
    }

    #[test]
    fn first_writer_wins() {
        let mut report = BuildReport::new();
        report.record(&TaskOutput {
            assets: vec![asset("styles.css", 10)],
            ..Default::default()
        });
        report.record(&TaskOutput {
            assets: vec![asset("styles.css", 99)],
            ..Default::default()
        });
        assert_eq!(report.get("styles.css").unwrap().bytes, 10);
        assert_eq!(report.assets().len(), 1);
    }

    #[tokio::test]
    async fn untracked_files_become_assets() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("index.mjs"), "x").unwrap();
        std::fs::write(dir.path().join("nested/readme.txt"), "hello").unwrap();

        let mut report = BuildReport::new();
        report.record(&TaskOutput {
            chunks: vec![chunk("index.mjs", 1, true, &[])],
            ..Default::default()
        });
        report
            .record_untracked(&NativeRuntime::new(), dir.path())
            .await
            .unwrap();

        let asset = report.get("nested/readme.txt").unwrap();
        assert_eq!(asset.kind, ReportKind::Asset);
        assert_eq!(asset.bytes, 5);
        assert_eq!(report.entries().len(), 1);
    }

    #[test]
    fn serializes_type_field() {
        let mut report = BuildReport::new();
        report.record(&TaskOutput {
            chunks: vec![chunk("index.mjs", 1, true, &[])],
            ..Default::default()
        });
        report.finalize();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["records"]["index.mjs"]["type"], "entry");
        assert_eq!(json["records"]["index.mjs"]["totalBytes"], 1);
    }
}
