//! Build entries: the unit of work passed from inference to the bundler.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// `NODE_ENV`-like build variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Map a condition key or file-name segment to an environment.
    pub fn from_condition(key: &str) -> Option<Self> {
        match key {
            "development" => Some(Environment::Development),
            "production" => Some(Environment::Production),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment runtime an entry targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum TargetRuntime {
    #[serde(rename = "node")]
    Node,
    #[serde(rename = "edge-light")]
    EdgeLight,
}

impl TargetRuntime {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetRuntime::Node => "node",
            TargetRuntime::EdgeLight => "edge-light",
        }
    }

    pub fn from_condition(key: &str) -> Option<Self> {
        match key {
            "node" => Some(TargetRuntime::Node),
            "edge-light" => Some(TargetRuntime::EdgeLight),
            _ => None,
        }
    }
}

impl fmt::Display for TargetRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JavaScript module format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    Cjs,
    Esm,
}

impl fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleFormat::Cjs => f.write_str("cjs"),
            ModuleFormat::Esm => f.write_str("esm"),
        }
    }
}

/// One logical buildable unit.
///
/// Format flags are tri-state: `None` means "not explicitly requested",
/// which matters when duplicates are merged (first explicit value wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildEntry {
    /// Absolute source path, or a glob pattern before validation expands it.
    pub input: PathBuf,
    /// Logical output name relative to the output directory, without extension.
    pub name: String,
    /// Output directory override. `None` means the package output directory.
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
    /// Physical file name for conditional variants sharing `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_alias: Option<String>,
    /// `bin` entries get a shebang.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub executable: bool,
}

impl BuildEntry {
    pub fn new(input: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            name: name.into(),
            out_dir: None,
            cjs: None,
            esm: None,
            declaration: None,
            environment: None,
            runtime: None,
            file_alias: None,
            executable: false,
        }
    }

    pub fn with_cjs(mut self, cjs: bool) -> Self {
        self.cjs = Some(cjs);
        self
    }

    pub fn with_esm(mut self, esm: bool) -> Self {
        self.esm = Some(esm);
        self
    }

    pub fn with_declaration(mut self, declaration: bool) -> Self {
        self.declaration = Some(declaration);
        self
    }

    pub fn with_environment(mut self, environment: Option<Environment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_runtime(mut self, runtime: Option<TargetRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn wants_cjs(&self) -> bool {
        self.cjs == Some(true)
    }

    pub fn wants_esm(&self) -> bool {
        self.esm == Some(true)
    }

    pub fn wants_declaration(&self) -> bool {
        self.declaration == Some(true)
    }

    pub fn wants(&self, format: ModuleFormat) -> bool {
        match format {
            ModuleFormat::Cjs => self.wants_cjs(),
            ModuleFormat::Esm => self.wants_esm(),
        }
    }

    /// Emits both CommonJS and ESM.
    pub fn is_dual(&self) -> bool {
        self.wants_cjs() && self.wants_esm()
    }

    /// Requests at least one output.
    pub fn has_output(&self) -> bool {
        self.wants_cjs() || self.wants_esm() || self.wants_declaration()
    }

    /// File stem used on disk.
    pub fn output_stem(&self) -> &str {
        self.file_alias.as_deref().unwrap_or(&self.name)
    }

    /// Identity used for deduplication.
    pub fn identity(&self) -> EntryIdentity {
        EntryIdentity {
            input: self.input.clone(),
            name: self.name.clone(),
            file_alias: self.file_alias.clone(),
            environment: self.environment,
            runtime: self.runtime,
        }
    }

    /// Merge flags from a structurally identical entry.
    ///
    /// Fields already set on `self` are kept; unset ones inherit from `other`.
    pub fn merge_from(&mut self, other: &BuildEntry) {
        self.cjs = self.cjs.or(other.cjs);
        self.esm = self.esm.or(other.esm);
        self.declaration = self.declaration.or(other.declaration);
        if self.out_dir.is_none() {
            self.out_dir = other.out_dir.clone();
        }
        self.executable |= other.executable;
    }
}

/// Key under which two entries count as the same build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryIdentity {
    pub input: PathBuf,
    pub name: String,
    pub file_alias: Option<String>,
    pub environment: Option<Environment>,
    pub runtime: Option<TargetRuntime>,
}
