//! Concurrent task execution.
//!
//! Tasks are spawned on a `JoinSet` and bounded by a semaphore. Every task
//! runs to completion; failures are collected and returned alongside the
//! successes, sorted back into planned order.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use super::{BuildTask, TaskKind};
use crate::bundler::{BundleOutput, Bundler, ModuleSize};
use crate::cache::{BuildFingerprint, CacheKey, FileCache};
use crate::diagnostics::BundlerError;
use crate::options::relative_slash;
use crate::runtime::Runtime;
use crate::validate::validate_output_path;

const SHEBANG: &str = "#!/usr/bin/env node\n";

/// A chunk as written to disk. Paths are relative to the package output
/// directory and `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedChunk {
    pub path: String,
    pub bytes: u64,
    pub is_entry: bool,
    pub entry_name: Option<String>,
    pub imports: Vec<String>,
    pub external_imports: Vec<String>,
    pub exports: Vec<String>,
    pub modules: Vec<ModuleSize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedAsset {
    pub path: String,
    pub bytes: u64,
}

/// Everything a task left on disk. This is also the cached value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub chunks: Vec<EmittedChunk>,
    pub assets: Vec<EmittedAsset>,
    pub warnings: Vec<String>,
}

impl TaskOutput {
    fn files(&self) -> impl Iterator<Item = (&str, u64)> {
        self.chunks
            .iter()
            .map(|c| (c.path.as_str(), c.bytes))
            .chain(self.assets.iter().map(|a| (a.path.as_str(), a.bytes)))
    }
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub output: TaskOutput,
    pub cached: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: usize,
    pub label: String,
    pub outcome: Result<TaskOutcome, BundlerError>,
}

/// Shared collaborators of every task in one run.
#[derive(Debug, Clone)]
pub struct TaskEnv {
    pub bundler: Arc<dyn Bundler>,
    pub runtime: Arc<dyn Runtime>,
    pub cache: Option<(Arc<FileCache>, BuildFingerprint)>,
    /// Package output directory; emitted paths are relative to it.
    pub out_dir: PathBuf,
    pub max_parallel: usize,
}

/// Run every task and return one result per task, in planned order.
pub async fn run_tasks(tasks: Vec<BuildTask>, env: TaskEnv) -> Vec<TaskResult> {
    use tokio::sync::Semaphore;
    use tokio::task::JoinSet;

    let labels: Vec<(usize, String)> = tasks.iter().map(|t| (t.id, t.label())).collect();
    let mut join_set = JoinSet::new();
    let semaphore = Arc::new(Semaphore::new(env.max_parallel.max(1)));
    let mut spawned: FxHashMap<tokio::task::Id, usize> = FxHashMap::default();

    for task in tasks {
        let env = env.clone();
        let permit = Arc::clone(&semaphore);
        let task_id = task.id;
        let span = tracing::info_span!("task", group = %task.group, kind = %task.kind);

        let handle = join_set.spawn(
            async move {
                let _permit = permit.acquire_owned().await.ok();
                let label = task.label();
                let outcome = run_task(&task, &env).await;
                TaskResult {
                    task_id: task.id,
                    label,
                    outcome,
                }
            }
            .instrument(span),
        );
        spawned.insert(handle.id(), task_id);
    }

    let mut results = Vec::with_capacity(spawned.len());
    while let Some(joined) = join_set.join_next_with_id().await {
        match joined {
            Ok((_, result)) => results.push(result),
            Err(join_err) => {
                let task_id = spawned.get(&join_err.id()).copied().unwrap_or(usize::MAX);
                let label = labels
                    .iter()
                    .find(|(id, _)| *id == task_id)
                    .map(|(_, label)| label.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                let error = BundlerError::new(&label, format!("Build task panicked: {join_err}"))
                    .with_help("This is a bug in the bundler adapter. Please report it.");
                results.push(TaskResult {
                    task_id,
                    label,
                    outcome: Err(error),
                });
            }
        }
    }

    results.sort_by_key(|r| r.task_id);
    results
}

async fn run_task(task: &BuildTask, env: &TaskEnv) -> Result<TaskOutcome, BundlerError> {
    let started = Instant::now();
    let key = cache_key(task, env);

    if let (Some((cache, _)), Some(key)) = (&env.cache, &key) {
        if let Some(hit) = cache.load(&task.subdir, key) {
            if outputs_intact(env, &hit.output).await {
                tracing::info!(task = %task.label(), "cache hit");
                return Ok(TaskOutcome {
                    output: hit.output.clone(),
                    cached: true,
                    duration: started.elapsed(),
                });
            }
            tracing::debug!(task = %task.label(), "cached outputs changed on disk");
        }
    }

    tracing::info!(task = %task.label(), bundler = env.bundler.name(), "starting task");
    let bundle = match task.kind {
        TaskKind::Js(_) => env.bundler.bundle(task).await?,
        TaskKind::Declaration => env.bundler.emit_declarations(task).await?,
    };

    let output = write_outputs(task, env, bundle).await?;

    if let (Some((cache, _)), Some(key)) = (&env.cache, &key) {
        cache.store(&task.subdir, key, output.clone());
    }

    let duration = started.elapsed();
    tracing::info!(
        task = %task.label(),
        chunks = output.chunks.len(),
        assets = output.assets.len(),
        elapsed_ms = duration.as_millis() as u64,
        "finished task"
    );
    Ok(TaskOutcome {
        output,
        cached: false,
        duration,
    })
}

fn cache_key(task: &BuildTask, env: &TaskEnv) -> Option<CacheKey> {
    let (_, fingerprint) = env.cache.as_ref()?;
    match fingerprint.task_key(task) {
        Ok(key) => Some(key),
        Err(error) => {
            tracing::warn!(task = %task.label(), %error, "could not compute cache key");
            None
        }
    }
}

/// Every cached file still exists with its recorded size.
async fn outputs_intact(env: &TaskEnv, output: &TaskOutput) -> bool {
    for (path, bytes) in output.files() {
        match env.runtime.metadata(&env.out_dir.join(path)).await {
            Ok(meta) if meta.is_file && meta.size == bytes => {}
            _ => return false,
        }
    }
    true
}

/// Write a bundle to disk and describe what was written.
async fn write_outputs(
    task: &BuildTask,
    env: &TaskEnv,
    bundle: BundleOutput,
) -> Result<TaskOutput, BundlerError> {
    let label = task.label();

    // Planned file name -> (entry name, executable)
    let mut planned: FxHashMap<String, (&str, bool)> = FxHashMap::default();
    for task_entry in &task.entries {
        for output in &task_entry.outputs {
            planned.insert(
                task_entry.file_name(output),
                (task_entry.entry.name.as_str(), task_entry.entry.executable),
            );
        }
    }

    let mut output = TaskOutput {
        warnings: bundle.warnings,
        ..Default::default()
    };

    for chunk in bundle.chunks {
        let target = output_path(task, &chunk.file_name).map_err(|e| BundlerError::new(&label, e))?;
        let planned_entry = planned.get(&chunk.file_name).copied();
        let executable = chunk.is_entry && planned_entry.is_some_and(|(_, exec)| exec);

        let code = if executable && !chunk.code.starts_with("#!") {
            format!("{SHEBANG}{}", chunk.code)
        } else {
            chunk.code
        };

        write(env, &target, code.as_bytes(), &label).await?;

        output.chunks.push(EmittedChunk {
            path: relative_slash(&env.out_dir, &target),
            bytes: code.len() as u64,
            is_entry: chunk.is_entry,
            entry_name: planned_entry
                .map(|(name, _)| name.to_string())
                .or(chunk.name),
            imports: chunk
                .imports
                .iter()
                .map(|import| relative_slash(&env.out_dir, &task.out_dir.join(import)))
                .collect(),
            external_imports: chunk.external_imports,
            exports: chunk.exports,
            modules: chunk.modules,
        });
    }

    for asset in bundle.assets {
        let target = output_path(task, &asset.file_name).map_err(|e| BundlerError::new(&label, e))?;
        write(env, &target, &asset.source, &label).await?;
        output.assets.push(EmittedAsset {
            path: relative_slash(&env.out_dir, &target),
            bytes: asset.source.len() as u64,
        });
    }

    for (file_name, (name, _)) in &planned {
        let path = relative_slash(&env.out_dir, &task.out_dir.join(file_name));
        let emitted = output.chunks.iter().any(|c| c.path == path)
            || output.assets.iter().any(|a| a.path == path);
        if !emitted {
            output.warnings.push(format!(
                "Bundler did not emit \"{path}\" for entry \"{name}\"."
            ));
        }
    }
    output.warnings.sort();

    Ok(output)
}

fn output_path(task: &BuildTask, file_name: &str) -> Result<PathBuf, String> {
    validate_output_path(&task.out_dir, file_name).map_err(|e| e.to_string())
}

async fn write(env: &TaskEnv, path: &Path, bytes: &[u8], label: &str) -> Result<(), BundlerError> {
    env.runtime
        .write_file(path, bytes)
        .await
        .map_err(|e| BundlerError::new(label, format!("Failed to write {}: {e}", path.display())))
}
