//! Build options.
//!
//! Every field carries a serde default so a partial `packem.config.json`, the
//! `"packem"` key of `package.json` and CLI flags can be layered over
//! [`BuildOptions::default`] with one deep-merge.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::entry::{Environment, TargetRuntime};
use crate::{Error, Result};

pub fn default_source_dir() -> PathBuf {
    PathBuf::from("src")
}

pub fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

pub fn default_cache_dir() -> PathBuf {
    PathBuf::from("node_modules/.cache/packem")
}

pub fn default_source_extensions() -> Vec<String> {
    [".ts", ".tsx", ".mts", ".cts", ".js", ".jsx", ".mjs", ".cjs"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn default_true() -> bool {
    true
}

/// Default task concurrency: `min(num_cpus, 8)`.
pub fn default_max_parallel() -> usize {
    num_cpus::get().clamp(1, 8)
}

/// Options for one build invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BuildOptions {
    /// Package root. Defaults to the current working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,

    /// Source directory, relative to the root.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Output directory, relative to the root.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Explicit entries. When empty, entries are inferred from package.json.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<EntryOption>,

    /// Emit declaration files. Unset means "as inferred".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<bool>,

    /// Force CommonJS output on or off for every entry.
    #[serde(default, rename = "emitCJS", skip_serializing_if = "Option::is_none")]
    pub emit_cjs: Option<bool>,

    /// Force ES module output on or off for every entry.
    #[serde(default, rename = "emitESM", skip_serializing_if = "Option::is_none")]
    pub emit_esm: Option<bool>,

    /// Make `module.exports = default` interop for CommonJS output.
    #[serde(default)]
    pub cjs_interop: bool,

    /// Custom output extensions per format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_extension_map: Option<OutputExtensionMap>,

    /// Always use `.cjs`/`.mjs`, even where `.js` would be unambiguous.
    #[serde(default)]
    pub node10_compatibility: bool,

    /// Minify output. Unset means "minify production builds only".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,

    #[serde(default)]
    pub sourcemap: bool,

    /// Remove the output directory before building.
    #[serde(default = "default_true")]
    pub clean: bool,

    /// Reuse outputs of unchanged tasks.
    #[serde(default = "default_true")]
    pub file_cache: bool,

    /// Cache directory, relative to the root.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Treat warnings as a failed build.
    #[serde(default = "default_true")]
    pub fail_on_warn: bool,

    /// Extensions probed when mapping output paths back to sources.
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,

    /// Import specifier aliases, e.g. `{"@": "./src"}`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub alias: IndexMap<String, String>,

    /// Extra specifiers to keep external besides package dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub externals: Vec<String>,

    /// Maximum concurrent bundler tasks. Defaults to `min(num_cpus, 8)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// tsconfig path, relative to the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsconfig: Option<PathBuf>,

    #[serde(default)]
    pub validation: ValidationOptions,

    /// Shell command run after each successful build in watch mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            root_dir: None,
            source_dir: default_source_dir(),
            out_dir: default_out_dir(),
            entries: Vec::new(),
            declaration: None,
            emit_cjs: None,
            emit_esm: None,
            cjs_interop: false,
            output_extension_map: None,
            node10_compatibility: false,
            minify: None,
            sourcemap: false,
            clean: true,
            file_cache: true,
            cache_dir: default_cache_dir(),
            fail_on_warn: true,
            source_extensions: default_source_extensions(),
            alias: IndexMap::new(),
            externals: Vec::new(),
            max_parallel: None,
            tsconfig: None,
            validation: ValidationOptions::default(),
            on_success: None,
        }
    }
}

/// An `entries` item: a path or glob, or a full entry object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum EntryOption {
    Path(String),
    Entry(EntryConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntryConfig {
    /// Source path or glob, relative to the root.
    pub input: String,
    /// Output name. Derived from the input path when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cjs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub esm: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<TargetRuntime>,
    #[serde(default)]
    pub executable: bool,
}

impl EntryOption {
    pub fn input(&self) -> &str {
        match self {
            EntryOption::Path(path) => path,
            EntryOption::Entry(config) => &config.input,
        }
    }
}

/// Custom JS extensions per format. A leading dot is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OutputExtensionMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cjs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub esm: Option<String>,
}

/// Post-build validators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOptions {
    /// Cross-check package.json fields against emitted files.
    #[serde(default = "default_true")]
    pub package_json: bool,
    /// Report unused and undeclared dependencies.
    #[serde(default = "default_true")]
    pub dependencies: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_limit: Option<BundleLimitOptions>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            package_json: true,
            dependencies: true,
            bundle_limit: None,
        }
    }
}

/// Size limits for emitted files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleLimitOptions {
    /// Glob over output paths (relative to the output directory) to a size
    /// such as `"10 KB"` or `2048`.
    #[serde(default)]
    pub limits: IndexMap<String, SizeValue>,
    /// Limit for the sum of all emitted files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<SizeValue>,
    /// Report violations as warnings instead of failing.
    #[serde(default)]
    pub allow_fail: bool,
}

/// A size given in bytes or as a human-readable string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl BuildOptions {
    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.emit_cjs == Some(false)
            && self.emit_esm == Some(false)
            && self.declaration != Some(true)
        {
            return Err(Error::config(
                "\"emitCJS\" and \"emitESM\" are both false and \"declaration\" is not enabled: nothing would be built.",
            ));
        }

        if self.max_parallel == Some(0) {
            return Err(Error::config("\"maxParallel\" must be at least 1."));
        }

        if self.source_extensions.is_empty() {
            return Err(Error::config("\"sourceExtensions\" cannot be empty."));
        }

        for name in self.alias.keys() {
            crate::validation::validate_alias_name(name)?;
        }

        if let Some(limits) = &self.validation.bundle_limit {
            for (pattern, size) in &limits.limits {
                glob::Pattern::new(pattern).map_err(|e| {
                    Error::config(format!("Invalid bundle limit pattern {pattern:?}: {e}"))
                })?;
                crate::size_limit::parse_size(size)?;
            }
            if let Some(total) = &limits.limit {
                crate::size_limit::parse_size(total)?;
            }
        }

        Ok(())
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel.unwrap_or_else(default_max_parallel).max(1)
    }

    /// Generate the JSON Schema for the options file.
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(BuildOptions);
        serde_json::to_value(schema).unwrap_or_default()
    }
}

/// Absolute directories derived from [`BuildOptions`] for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPaths {
    pub root: PathBuf,
    pub source_dir: PathBuf,
    pub out_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl ResolvedPaths {
    pub fn new(root: &Path, options: &BuildOptions) -> Self {
        let root = path_clean::clean(root);
        Self {
            source_dir: path_clean::clean(root.join(&options.source_dir)),
            out_dir: path_clean::clean(root.join(&options.out_dir)),
            cache_dir: path_clean::clean(root.join(&options.cache_dir)),
            root,
        }
    }

    /// Output directory relative to the root, `/`-separated, without a
    /// trailing slash.
    pub fn out_dir_relative(&self) -> String {
        relative_slash(&self.root, &self.out_dir)
    }

    pub fn source_dir_relative(&self) -> String {
        relative_slash(&self.root, &self.source_dir)
    }
}

/// `path` relative to `base` with `/` separators, or the full path when it
/// is not below `base`.
pub fn relative_slash(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
