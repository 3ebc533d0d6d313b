//! Shared test utilities for packem integration tests
//!
//! A throwaway package on disk plus a bundler that records every task it is
//! handed and emits exactly the planned files.

#![allow(dead_code, clippy::disallowed_methods)]

use async_trait::async_trait;
use packem::{
    BuildOptions, BuildTask, BundleOutput, Bundler, BundlerError, NativeRuntime, OutputAsset,
    OutputChunk, Runtime, TaskKind,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A package root in a temporary directory.
pub struct Project {
    dir: TempDir,
}

impl Project {
    /// Create a package with the given `package.json` and source files.
    pub fn new(package: Value, files: &[&str]) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        std::fs::write(
            dir.path().join("package.json"),
            serde_json::to_string_pretty(&package).expect("serialize package.json"),
        )
        .expect("write package.json");
        let project = Self { dir };
        for file in files {
            project.write(file, "export const value = 1;\nexport default value;\n");
        }
        project
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().expect("file has a parent"))
            .expect("create parent dirs");
        std::fs::write(path, contents).expect("write file");
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).is_file()
    }

    /// Options rooted at this project, without the persistent cache.
    pub fn options(&self) -> BuildOptions {
        BuildOptions {
            root_dir: Some(self.root().to_path_buf()),
            file_cache: false,
            ..Default::default()
        }
    }

    /// Every file under `dist/`, relative and sorted.
    pub fn dist_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        collect(&self.path("dist"), &self.path("dist"), &mut files);
        files.sort();
        files
    }
}

fn collect(base: &Path, dir: &Path, files: &mut Vec<String>) {
    let Ok(read) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in read.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(base, &path, files);
        } else {
            let relative = path.strip_prefix(base).expect("under base");
            files.push(
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/"),
            );
        }
    }
}

pub fn runtime() -> Arc<dyn Runtime> {
    Arc::new(NativeRuntime::new())
}

/// Records every task and emits one file per planned output.
#[derive(Debug, Default)]
pub struct RecordingBundler {
    tasks: Mutex<Vec<BuildTask>>,
    padding: usize,
    external_imports: Vec<String>,
    fail_on: Option<String>,
}

impl RecordingBundler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` bytes of filler to every chunk.
    pub fn with_padding(mut self, bytes: usize) -> Self {
        self.padding = bytes;
        self
    }

    /// Bare specifiers every chunk reports as external.
    pub fn with_external_imports(mut self, imports: &[&str]) -> Self {
        self.external_imports = imports.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Fail the task with this label.
    pub fn failing_on(mut self, label: &str) -> Self {
        self.fail_on = Some(label.to_string());
        self
    }

    pub fn tasks(&self) -> Vec<BuildTask> {
        self.tasks.lock().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.tasks.lock().iter().map(BuildTask::label).collect()
    }

    pub fn js_tasks(&self) -> Vec<BuildTask> {
        self.tasks()
            .into_iter()
            .filter(|t| matches!(t.kind, TaskKind::Js(_)))
            .collect()
    }

    fn record(&self, task: &BuildTask) -> Result<(), BundlerError> {
        self.tasks.lock().push(task.clone());
        let label = task.label();
        if self.fail_on.as_deref() == Some(label.as_str()) {
            return Err(BundlerError::new(&label, "Unexpected token."));
        }
        Ok(())
    }
}

#[async_trait]
impl Bundler for RecordingBundler {
    fn name(&self) -> &str {
        "recording"
    }

    async fn bundle(&self, task: &BuildTask) -> Result<BundleOutput, BundlerError> {
        self.record(task)?;
        let mut output = BundleOutput::default();
        for task_entry in &task.entries {
            for planned in &task_entry.outputs {
                let code = format!(
                    "// {} ({})\nexport default 1;\n{}",
                    task_entry.entry.name,
                    planned.format,
                    "x".repeat(self.padding)
                );
                let mut chunk = OutputChunk::new(task_entry.file_name(planned), code).entry();
                chunk.name = Some(task_entry.entry.name.clone());
                chunk.exports = vec!["default".to_string()];
                chunk.external_imports = self.external_imports.clone();
                output.chunks.push(chunk);
            }
        }
        Ok(output)
    }

    async fn emit_declarations(&self, task: &BuildTask) -> Result<BundleOutput, BundlerError> {
        self.record(task)?;
        let mut output = BundleOutput::default();
        for task_entry in &task.entries {
            for planned in &task_entry.outputs {
                output.assets.push(OutputAsset::new(
                    task_entry.file_name(planned),
                    "declare const value: number;\nexport default value;\n",
                ));
            }
        }
        Ok(output)
    }
}
