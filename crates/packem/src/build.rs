//! Top-level orchestration.
//!
//! ```text
//! prepare -> infer -> validate -> clean -> plan -> run tasks -> report
//!         -> size limits -> package validation -> warnings
//! ```
//!
//! Static and configuration errors surface before any task runs. Task
//! failures are collected and surface after every task has settled; the
//! outputs of successful tasks stay on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bundler::Bundler;
use crate::cache::{BuildFingerprint, FileCache, source_fingerprint};
use crate::context::BuildContext;
use crate::entry::BuildEntry;
use crate::group::{PlanContext, TaskEnv, plan_tasks, run_tasks};
use crate::hooks::{HookPayload, HookRegistry};
use crate::inference::{DefaultShape, infer_entries};
use crate::options::{BuildOptions, ResolvedPaths};
use crate::package_json::PackageJson;
use crate::report::BuildReport;
use crate::runtime::Runtime;
use crate::tsconfig::TsConfig;
use crate::validate::validate_entries;
use crate::{Error, Result, size_limit, validation};

/// Per-task timing, for summaries.
#[derive(Debug, Clone)]
pub struct TaskSummary {
    pub label: String,
    pub cached: bool,
    pub duration: Duration,
    /// Report paths written by the task.
    pub files: Vec<String>,
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub entries: Vec<BuildEntry>,
    pub report: BuildReport,
    /// Warnings that did not fail the build (`failOnWarn: false`).
    pub warnings: Vec<String>,
    pub tasks: Vec<TaskSummary>,
    pub duration: Duration,
}

/// Build a package.
pub async fn build(
    options: BuildOptions,
    bundler: Arc<dyn Bundler>,
    runtime: Arc<dyn Runtime>,
) -> Result<BuildOutcome> {
    build_with_hooks(options, HookRegistry::new(), bundler, runtime).await
}

/// Build a package, notifying `hooks` along the way.
pub async fn build_with_hooks(
    options: BuildOptions,
    hooks: HookRegistry,
    bundler: Arc<dyn Bundler>,
    runtime: Arc<dyn Runtime>,
) -> Result<BuildOutcome> {
    let mut ctx = prepare(options, runtime.as_ref()).await?;
    ctx.hooks = hooks;
    if ctx.options.file_cache {
        ctx.cache = Some(Arc::new(FileCache::open(&ctx.paths.cache_dir)));
    }
    execute(&mut ctx, bundler, runtime).await
}

/// Build again with an existing context, keeping its hooks and cache.
pub async fn rebuild(
    ctx: &mut BuildContext,
    bundler: Arc<dyn Bundler>,
    runtime: Arc<dyn Runtime>,
) -> Result<BuildOutcome> {
    ctx.refresh();
    execute(ctx, bundler, runtime).await
}

/// Resolve entries without building anything.
pub async fn resolve_entries(options: BuildOptions, runtime: &dyn Runtime) -> Result<BuildContext> {
    let mut ctx = prepare(options, runtime).await?;
    resolve_into(&mut ctx, runtime).await?;
    Ok(ctx)
}

/// Validate options and load `package.json` and `tsconfig.json`.
pub async fn prepare(mut options: BuildOptions, runtime: &dyn Runtime) -> Result<BuildContext> {
    options.validate()?;

    let cwd = runtime.get_cwd()?;
    let root = match &options.root_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => cwd.join(dir),
        None => cwd,
    };
    let root = path_clean::clean(root);
    options.root_dir = Some(root.clone());

    let package = PackageJson::from_dir(runtime, &root).await?;
    let package_bytes = runtime.read_file(&package.path).await?;
    validation::validate_engines(&package)?;

    let tsconfig = TsConfig::discover(runtime, &root, options.tsconfig.as_deref()).await?;
    if let Some(tsconfig) = &tsconfig {
        tracing::debug!(path = %tsconfig.path.display(), "loaded tsconfig");
        tsconfig.apply_defaults(&mut options);
    }

    let paths = ResolvedPaths::new(&root, &options);
    tracing::debug!(
        root = %paths.root.display(),
        source_dir = %paths.source_dir.display(),
        out_dir = %paths.out_dir.display(),
        "resolved paths"
    );

    let mut ctx = BuildContext::new(options, paths, package, package_bytes);
    ctx.tsconfig = tsconfig;
    Ok(ctx)
}

async fn resolve_into(ctx: &mut BuildContext, runtime: &dyn Runtime) -> Result<()> {
    let inferred = infer_entries(runtime, &ctx.package, &ctx.options, &ctx.paths).await?;
    ctx.extend_warnings(inferred.warnings);

    let defaults = DefaultShape::for_package(&ctx.package, &ctx.options);
    let validated = validate_entries(
        runtime,
        inferred.entries,
        &ctx.paths,
        &ctx.options.source_extensions,
        defaults,
    )?;
    ctx.extend_warnings(validated.warnings);

    if validated.entries.is_empty() {
        return Err(Error::config("No entries detected."));
    }
    ctx.entries = validated.entries;
    Ok(())
}

async fn execute(
    ctx: &mut BuildContext,
    bundler: Arc<dyn Bundler>,
    runtime: Arc<dyn Runtime>,
) -> Result<BuildOutcome> {
    let started = Instant::now();

    ctx.hooks.emit(HookPayload::BuildPrepare {
        options: &ctx.options,
        package: &ctx.package,
    })?;

    resolve_into(ctx, runtime.as_ref()).await?;
    ctx.hooks.emit(HookPayload::EntriesResolved {
        entries: &ctx.entries,
    })?;

    if ctx.options.clean {
        clean(ctx, runtime.as_ref()).await?;
    }

    let mut externals: Vec<String> = ctx
        .package
        .runtime_dependency_names()
        .into_iter()
        .map(String::from)
        .collect();
    externals.extend(ctx.options.externals.iter().cloned());

    let tasks = plan_tasks(
        &ctx.entries,
        &PlanContext {
            options: &ctx.options,
            paths: &ctx.paths,
            package_type: ctx.package.package_type(),
            externals,
            tsconfig: ctx.tsconfig.as_ref(),
        },
    );

    for task in &tasks {
        ctx.hooks.emit(HookPayload::TaskBefore { task })?;
    }

    let env = TaskEnv {
        bundler,
        runtime: Arc::clone(&runtime),
        cache: cache_layer(ctx, runtime.as_ref()).await,
        out_dir: ctx.paths.out_dir.clone(),
        max_parallel: ctx.options.max_parallel(),
    };

    tracing::info!(tasks = tasks.len(), entries = ctx.entries.len(), "building");
    let results = run_tasks(tasks.clone(), env).await;

    let mut errors = Vec::new();
    let mut summaries = Vec::with_capacity(results.len());
    for (task, result) in tasks.iter().zip(&results) {
        ctx.hooks.emit(HookPayload::TaskDone { task, result })?;
        match &result.outcome {
            Ok(outcome) => {
                ctx.report.record(&outcome.output);
                ctx.extend_warnings(outcome.output.warnings.iter().cloned());
                summaries.push(TaskSummary {
                    label: result.label.clone(),
                    cached: outcome.cached,
                    duration: outcome.duration,
                    files: outcome
                        .output
                        .chunks
                        .iter()
                        .map(|c| c.path.clone())
                        .chain(outcome.output.assets.iter().map(|a| a.path.clone()))
                        .collect(),
                });
            }
            Err(error) => {
                tracing::error!(task = %result.label, "{error}");
                errors.push(error.clone());
            }
        }
    }

    ctx.report
        .record_untracked(runtime.as_ref(), &ctx.paths.out_dir)
        .await?;
    ctx.report.finalize();

    if !errors.is_empty() {
        return Err(Error::Bundler(errors));
    }

    // `allowFail` violations are reported but never promoted by `failOnWarn`.
    let soft_limits = match &ctx.options.validation.bundle_limit {
        Some(limits) => size_limit::check(&ctx.report, limits)?,
        None => Vec::new(),
    };
    for warning in &soft_limits {
        tracing::warn!("{warning}");
    }
    if ctx.options.validation.package_json {
        let warnings = validation::validate_package_fields(&ctx.package, &ctx.report, &ctx.paths)?;
        ctx.extend_warnings(warnings);
    }
    if ctx.options.validation.dependencies {
        let warnings = validation::validate_dependencies(&ctx.package, &ctx.report);
        ctx.extend_warnings(warnings);
    }

    let promotable: Vec<String> = ctx.warnings().iter().cloned().collect();
    let mut warnings = promotable.clone();
    warnings.extend(soft_limits.into_iter().filter(|w| !promotable.contains(w)));
    ctx.hooks.emit(HookPayload::BuildDone {
        report: &ctx.report,
        warnings: &warnings,
    })?;

    if ctx.options.fail_on_warn && !promotable.is_empty() {
        return Err(Error::Warnings(promotable));
    }

    let duration = started.elapsed();
    tracing::info!(
        files = ctx.report.len(),
        bytes = ctx.report.total_bytes(),
        elapsed_ms = duration.as_millis() as u64,
        "build finished"
    );

    Ok(BuildOutcome {
        entries: ctx.entries.clone(),
        report: ctx.report.clone(),
        warnings,
        tasks: summaries,
        duration,
    })
}

/// Remove the output directories of this build.
async fn clean(ctx: &BuildContext, runtime: &dyn Runtime) -> Result<()> {
    let mut dirs: Vec<PathBuf> = vec![ctx.paths.out_dir.clone()];
    for entry in &ctx.entries {
        if let Some(dir) = &entry.out_dir {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
    }

    for dir in dirs {
        ensure_cleanable(&dir, &ctx.paths)?;
        if runtime.exists(&dir) {
            tracing::debug!(dir = %dir.display(), "cleaning output directory");
            runtime.remove_dir_all(&dir).await?;
        }
    }
    Ok(())
}

fn ensure_cleanable(dir: &Path, paths: &ResolvedPaths) -> Result<()> {
    if paths.root.starts_with(dir) || paths.source_dir.starts_with(dir) {
        return Err(Error::config(format!(
            "Refusing to clean \"{}\": it contains the package root or source directory.",
            dir.display()
        )));
    }
    Ok(())
}

async fn cache_layer(
    ctx: &BuildContext,
    runtime: &dyn Runtime,
) -> Option<(Arc<FileCache>, BuildFingerprint)> {
    let cache = ctx.cache.as_ref()?;
    let sources = match source_fingerprint(runtime, &ctx.paths.source_dir).await {
        Ok(sources) => sources,
        Err(error) => {
            tracing::warn!(%error, "could not fingerprint sources, cache disabled");
            return None;
        }
    };
    let options_json = match serde_json::to_string(&ctx.options) {
        Ok(json) => json,
        Err(error) => {
            tracing::warn!(%error, "could not serialize options, cache disabled");
            return None;
        }
    };
    let fingerprint = BuildFingerprint::new(&ctx.package_bytes, &options_json, sources);
    Some((Arc::clone(cache), fingerprint))
}
