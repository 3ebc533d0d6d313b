//! Environment/runtime grouping and task planning.
//!
//! Validated entries are partitioned by `(environment, runtime)` and, inside
//! each group, by requested formats. Every non-empty JS bucket becomes one
//! [`BuildTask`]; every group with declaration-requesting entries gets one
//! extra declaration task.

mod executor;

pub use executor::{
    EmittedAsset, EmittedChunk, TaskEnv, TaskOutcome, TaskOutput, TaskResult, run_tasks,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::entry::{BuildEntry, Environment, ModuleFormat, TargetRuntime};
use crate::extension::{self, OutputExtensions};
use crate::options::{BuildOptions, ResolvedPaths, relative_slash};
use crate::package_json::{PackageType, extract_package_name, is_bare_specifier};
use crate::tsconfig::TsConfig;

/// Node.js built-in modules kept external in every build.
pub const NODE_BUILTINS: [&str; 40] = [
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2",
    "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls",
    "trace_events", "tty", "url", "util", "v8", "vm", "zlib",
];

/// Whether `name` is a Node.js built-in module, with or without `node:`.
pub fn is_node_builtin(name: &str) -> bool {
    match name.strip_prefix("node:") {
        Some(builtin) => !builtin.is_empty(),
        None => NODE_BUILTINS.contains(&extract_package_name(name)),
    }
}

/// `(environment, runtime)`. Unset sorts first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GroupKey {
    pub environment: Option<Environment>,
    pub runtime: Option<TargetRuntime>,
}

impl GroupKey {
    /// Output subdirectory, e.g. `production/edge-light`; empty when unset.
    pub fn subdir(&self) -> String {
        [
            self.environment.map(|e| e.as_str()),
            self.runtime.map(|r| r.as_str()),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("/")
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subdir = self.subdir();
        if subdir.is_empty() {
            f.write_str("default")
        } else {
            f.write_str(&subdir)
        }
    }
}

/// Which formats a bucket's entries request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Bucket {
    EsmAndCjs,
    EsmOnly,
    CjsOnly,
    DtsOnly,
}

impl Bucket {
    pub fn formats(&self) -> &'static [ModuleFormat] {
        match self {
            Bucket::EsmAndCjs => &[ModuleFormat::Esm, ModuleFormat::Cjs],
            Bucket::EsmOnly => &[ModuleFormat::Esm],
            Bucket::CjsOnly => &[ModuleFormat::Cjs],
            Bucket::DtsOnly => &[],
        }
    }

    fn for_entry(entry: &BuildEntry) -> Option<Self> {
        match (entry.wants_esm(), entry.wants_cjs(), entry.wants_declaration()) {
            (true, true, _) => Some(Bucket::EsmAndCjs),
            (true, false, _) => Some(Bucket::EsmOnly),
            (false, true, _) => Some(Bucket::CjsOnly),
            (false, false, true) => Some(Bucket::DtsOnly),
            (false, false, false) => None,
        }
    }
}

/// Entries of one group, partitioned by requested formats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupBuckets {
    pub esm_and_cjs: Vec<BuildEntry>,
    pub esm_only: Vec<BuildEntry>,
    pub cjs_only: Vec<BuildEntry>,
    pub dts_only: Vec<BuildEntry>,
}

impl GroupBuckets {
    pub fn get(&self, bucket: Bucket) -> &[BuildEntry] {
        match bucket {
            Bucket::EsmAndCjs => &self.esm_and_cjs,
            Bucket::EsmOnly => &self.esm_only,
            Bucket::CjsOnly => &self.cjs_only,
            Bucket::DtsOnly => &self.dts_only,
        }
    }

    fn get_mut(&mut self, bucket: Bucket) -> &mut Vec<BuildEntry> {
        match bucket {
            Bucket::EsmAndCjs => &mut self.esm_and_cjs,
            Bucket::EsmOnly => &mut self.esm_only,
            Bucket::CjsOnly => &mut self.cjs_only,
            Bucket::DtsOnly => &mut self.dts_only,
        }
    }

    /// All entries, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = &BuildEntry> {
        self.esm_and_cjs
            .iter()
            .chain(&self.esm_only)
            .chain(&self.cjs_only)
            .chain(&self.dts_only)
    }

    pub fn len(&self) -> usize {
        self.esm_and_cjs.len() + self.esm_only.len() + self.cjs_only.len() + self.dts_only.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition entries by `(environment, runtime)`, then by format bucket.
///
/// Every entry with at least one requested output lands in exactly one bucket.
pub fn group(entries: &[BuildEntry]) -> BTreeMap<GroupKey, GroupBuckets> {
    let mut groups: BTreeMap<GroupKey, GroupBuckets> = BTreeMap::new();
    for entry in entries {
        let Some(bucket) = Bucket::for_entry(entry) else {
            continue;
        };
        let key = GroupKey {
            environment: entry.environment,
            runtime: entry.runtime,
        };
        groups
            .entry(key)
            .or_default()
            .get_mut(bucket)
            .push(entry.clone());
    }
    groups
}

/// What a task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    Js(Bucket),
    Declaration,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Js(Bucket::EsmAndCjs) => f.write_str("esm+cjs"),
            TaskKind::Js(Bucket::EsmOnly) => f.write_str("esm"),
            TaskKind::Js(Bucket::CjsOnly) => f.write_str("cjs"),
            TaskKind::Js(Bucket::DtsOnly) | TaskKind::Declaration => f.write_str("dts"),
        }
    }
}

/// One file an entry produces in a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedOutput {
    pub format: ModuleFormat,
    /// JS extension for JS tasks, declaration extension for declaration tasks.
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub entry: BuildEntry,
    pub outputs: Vec<PlannedOutput>,
}

impl TaskEntry {
    /// Output file name relative to the task's output directory.
    pub fn file_name(&self, output: &PlannedOutput) -> String {
        format!("{}{}", self.entry.output_stem(), output.extension)
    }

    pub fn output_for(&self, format: ModuleFormat) -> Option<&PlannedOutput> {
        self.outputs.iter().find(|o| o.format == format)
    }
}

/// A single bundler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTask {
    /// Position in the plan. Results are merged in this order.
    pub id: usize,
    pub kind: TaskKind,
    pub group: GroupKey,
    pub entries: Vec<TaskEntry>,
    pub root_dir: PathBuf,
    pub source_dir: PathBuf,
    /// Absolute output directory of this task.
    pub out_dir: PathBuf,
    /// `out_dir` relative to the package output directory, `/`-separated.
    pub subdir: String,
    /// Global replacements, e.g. `process.env.NODE_ENV` -> `"production"`.
    pub define: IndexMap<String, String>,
    pub minify: bool,
    pub sourcemap: bool,
    pub cjs_interop: bool,
    pub externals: Vec<String>,
    pub alias: IndexMap<String, String>,
    /// `compilerOptions.target` from tsconfig.
    pub target: Option<String>,
    /// `compilerOptions.jsx` from tsconfig.
    pub jsx: Option<String>,
}

impl BuildTask {
    /// Short label used in logs and errors, e.g. `production/node:esm`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.group, self.kind)
    }

    /// Formats emitted by this task, ESM first.
    pub fn formats(&self) -> Vec<ModuleFormat> {
        let mut formats: Vec<ModuleFormat> = Vec::new();
        for format in [ModuleFormat::Esm, ModuleFormat::Cjs] {
            if self
                .entries
                .iter()
                .any(|e| e.output_for(format).is_some())
            {
                formats.push(format);
            }
        }
        formats
    }

    /// Whether an import specifier stays external.
    pub fn is_external(&self, specifier: &str) -> bool {
        if is_node_builtin(specifier) {
            return true;
        }
        if !is_bare_specifier(specifier) {
            return false;
        }
        let package = extract_package_name(specifier);
        self.externals
            .iter()
            .any(|external| external == specifier || external == package)
    }

    /// Export conditions for resolving dependencies of this task.
    pub fn conditions(&self, format: ModuleFormat) -> Vec<String> {
        let mut conditions: Vec<&str> = Vec::new();
        match self.group.runtime {
            Some(TargetRuntime::EdgeLight) => {
                conditions.extend(["edge-light", "workerd", "worker", "browser"])
            }
            Some(TargetRuntime::Node) | None => conditions.push("node"),
        }
        if let Some(environment) = self.group.environment {
            conditions.push(environment.as_str());
        }
        conditions.push(match format {
            ModuleFormat::Esm => "import",
            ModuleFormat::Cjs => "require",
        });
        conditions.push("default");
        conditions.into_iter().map(String::from).collect()
    }
}

/// Inputs shared by every planned task.
#[derive(Debug, Clone)]
pub struct PlanContext<'a> {
    pub options: &'a BuildOptions,
    pub paths: &'a ResolvedPaths,
    pub package_type: PackageType,
    pub externals: Vec<String>,
    pub tsconfig: Option<&'a TsConfig>,
}

impl PlanContext<'_> {
    fn extensions(&self, format: ModuleFormat, dual: bool) -> OutputExtensions {
        extension::resolve(
            format,
            self.package_type,
            self.options.output_extension_map.as_ref(),
            self.options.node10_compatibility,
            dual,
        )
    }

    /// Declaration outputs of an entry: one per JS format, or one in the
    /// package's native format for declaration-only entries.
    fn declaration_outputs(&self, entry: &BuildEntry) -> Vec<PlannedOutput> {
        let mut formats: Vec<ModuleFormat> = [ModuleFormat::Esm, ModuleFormat::Cjs]
            .into_iter()
            .filter(|f| entry.wants(*f))
            .collect();
        if formats.is_empty() {
            formats.push(match self.package_type {
                PackageType::Module => ModuleFormat::Esm,
                PackageType::Commonjs => ModuleFormat::Cjs,
            });
        }
        formats
            .into_iter()
            .map(|format| PlannedOutput {
                format,
                extension: self.extensions(format, entry.is_dual()).dts,
            })
            .collect()
    }

    fn js_outputs(&self, entry: &BuildEntry, bucket: Bucket) -> Vec<PlannedOutput> {
        bucket
            .formats()
            .iter()
            .map(|&format| PlannedOutput {
                format,
                extension: self.extensions(format, entry.is_dual()).js,
            })
            .collect()
    }
}

/// Define map for a group.
pub fn defines(key: &GroupKey) -> IndexMap<String, String> {
    let mut define = IndexMap::new();
    if let Some(environment) = key.environment {
        define.insert(
            "process.env.NODE_ENV".to_string(),
            format!("\"{environment}\""),
        );
    }
    if let Some(runtime) = key.runtime {
        define.insert(
            "EdgeRuntime".to_string(),
            (runtime == TargetRuntime::EdgeLight).to_string(),
        );
    }
    define
}

/// Explicit configuration wins; otherwise only production builds minify.
pub fn should_minify(explicit: Option<bool>, environment: Option<Environment>) -> bool {
    explicit.unwrap_or(environment == Some(Environment::Production))
}

/// Plan every task for the validated entries, in deterministic order.
pub fn plan_tasks(entries: &[BuildEntry], ctx: &PlanContext<'_>) -> Vec<BuildTask> {
    let mut tasks = Vec::new();

    for (key, buckets) in group(entries) {
        for bucket in [Bucket::EsmAndCjs, Bucket::EsmOnly, Bucket::CjsOnly] {
            for (out_dir, members) in by_out_dir(buckets.get(bucket).iter()) {
                let entries = members
                    .into_iter()
                    .map(|entry| TaskEntry {
                        outputs: ctx.js_outputs(entry, bucket),
                        entry: entry.clone(),
                    })
                    .collect();
                tasks.push(new_task(tasks.len(), TaskKind::Js(bucket), key, out_dir, entries, ctx));
            }
        }

        let declared = buckets.iter().filter(|entry| entry.wants_declaration());
        for (out_dir, members) in by_out_dir(declared) {
            let entries = members
                .into_iter()
                .map(|entry| TaskEntry {
                    outputs: ctx.declaration_outputs(entry),
                    entry: entry.clone(),
                })
                .collect();
            tasks.push(new_task(tasks.len(), TaskKind::Declaration, key, out_dir, entries, ctx));
        }
    }

    tracing::debug!(count = tasks.len(), "planned build tasks");
    tasks
}

/// Split entries by their output directory override, keeping first-seen order.
fn by_out_dir<'e>(
    entries: impl Iterator<Item = &'e BuildEntry>,
) -> IndexMap<Option<PathBuf>, Vec<&'e BuildEntry>> {
    let mut split: IndexMap<Option<PathBuf>, Vec<&BuildEntry>> = IndexMap::new();
    for entry in entries {
        split.entry(entry.out_dir.clone()).or_default().push(entry);
    }
    split
}

fn new_task(
    id: usize,
    kind: TaskKind,
    group: GroupKey,
    out_dir: Option<PathBuf>,
    entries: Vec<TaskEntry>,
    ctx: &PlanContext<'_>,
) -> BuildTask {
    let base = out_dir.unwrap_or_else(|| ctx.paths.out_dir.clone());
    let group_subdir = group.subdir();
    let task_out_dir = if group_subdir.is_empty() {
        base
    } else {
        base.join(&group_subdir)
    };

    BuildTask {
        id,
        kind,
        group,
        entries,
        root_dir: ctx.paths.root.clone(),
        source_dir: ctx.paths.source_dir.clone(),
        subdir: relative_slash(&ctx.paths.out_dir, &task_out_dir),
        out_dir: task_out_dir,
        define: defines(&group),
        minify: should_minify(ctx.options.minify, group.environment),
        sourcemap: ctx.options.sourcemap,
        cjs_interop: ctx.options.cjs_interop,
        externals: ctx.externals.clone(),
        alias: ctx.options.alias.clone(),
        target: ctx.tsconfig.and_then(|t| t.target.clone()),
        jsx: ctx.tsconfig.and_then(|t| t.jsx.clone()),
    }
}
