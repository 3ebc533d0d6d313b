//! Package.json parsing.
//!
//! Only the fields that drive entry inference and post-build validation are
//! modeled; everything else is ignored by serde.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::runtime::{Runtime, RuntimeError};
use crate::{Error, Result};

/// Maximum allowed size for package.json files (10MB)
const MAX_PACKAGE_JSON_SIZE: u64 = 10 * 1024 * 1024;

/// The package `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    #[default]
    Commonjs,
    Module,
}

/// Parsed package.json structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "type")]
    pub package_type: Option<PackageType>,
    pub main: Option<String>,
    pub module: Option<String>,
    pub types: Option<String>,
    pub typings: Option<String>,
    /// Kept raw; parsed by [`crate::exports::BinField`].
    pub bin: Option<Value>,
    /// Kept raw; parsed by [`crate::exports::ExportsField`].
    pub exports: Option<Value>,
    /// Kept raw; parsed by [`crate::exports::ImportsField`].
    pub imports: Option<Value>,
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: IndexMap<String, String>,
    #[serde(default)]
    pub peer_dependencies: IndexMap<String, String>,
    #[serde(default)]
    pub peer_dependencies_meta: IndexMap<String, PeerDependencyMeta>,
    #[serde(default)]
    pub optional_dependencies: IndexMap<String, String>,
    pub side_effects: Option<Value>,
    pub engines: Option<Engines>,
    /// Build options embedded under the `"packem"` key.
    pub packem: Option<Value>,
    /// File path this was loaded from
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDependencyMeta {
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engines {
    pub node: Option<String>,
}

impl PackageJson {
    /// Load `package.json` from `path` using the provided runtime.
    pub async fn from_path(runtime: &dyn Runtime, path: &Path) -> Result<Self> {
        let metadata = runtime.metadata(path).await.map_err(|e| match e {
            RuntimeError::FileNotFound(_) => missing(path),
            other => Error::Runtime(other),
        })?;

        if metadata.size > MAX_PACKAGE_JSON_SIZE {
            return Err(Error::config(format!(
                "package.json exceeds maximum size of {}MB",
                MAX_PACKAGE_JSON_SIZE / 1024 / 1024
            )));
        }

        let bytes = runtime.read_file(path).await.map_err(|e| match e {
            RuntimeError::FileNotFound(_) => missing(path),
            other => Error::Runtime(other),
        })?;

        let mut pkg = Self::parse(&bytes)?;
        pkg.path = path.to_path_buf();
        Ok(pkg)
    }

    /// Load `<root>/package.json`.
    pub async fn from_dir(runtime: &dyn Runtime, root: &Path) -> Result<Self> {
        Self::from_path(runtime, &root.join("package.json")).await
    }

    /// Parse package.json bytes. Invalid JSON surfaces the parser message.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let content = std::str::from_utf8(bytes)
            .map_err(|e| Error::config(format!("package.json contains invalid UTF-8: {e}")))?;
        serde_json::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type.unwrap_or_default()
    }

    pub fn is_module(&self) -> bool {
        self.package_type() == PackageType::Module
    }

    /// `types`, falling back to `typings`.
    pub fn types_field(&self) -> Option<(&'static str, &str)> {
        self.types
            .as_deref()
            .map(|t| ("types", t))
            .or_else(|| self.typings.as_deref().map(|t| ("typings", t)))
    }

    /// Whether the package declares any buildable public surface.
    pub fn has_entry_fields(&self) -> bool {
        self.main.is_some() || self.module.is_some() || self.exports.is_some() || self.bin.is_some()
    }

    /// Runtime dependency names: dependencies, peer and optional.
    ///
    /// These are the specifiers a library build leaves external.
    pub fn runtime_dependency_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .dependencies
            .keys()
            .chain(self.peer_dependencies.keys())
            .chain(self.optional_dependencies.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn is_declared(&self, package: &str) -> bool {
        self.dependencies.contains_key(package)
            || self.peer_dependencies.contains_key(package)
            || self.optional_dependencies.contains_key(package)
            || self.dev_dependencies.contains_key(package)
    }

    pub fn is_optional_peer(&self, package: &str) -> bool {
        self.peer_dependencies_meta
            .get(package)
            .is_some_and(|meta| meta.optional)
    }
}

fn missing(path: &Path) -> Error {
    Error::not_found("No such file or directory, for package.json found.", path)
}

/// Extract the base package name from an npm import specifier.
///
/// - `@foo/bar/baz` -> `@foo/bar`
/// - `lodash/fp` -> `lodash`
pub fn extract_package_name(specifier: &str) -> &str {
    if specifier.starts_with('@') {
        if let Some(first_slash) = specifier.find('/') {
            if let Some(second_slash) = specifier[first_slash + 1..].find('/') {
                return &specifier[..first_slash + 1 + second_slash];
            }
        }
        return specifier;
    }

    match specifier.find('/') {
        Some(idx) => &specifier[..idx],
        None => specifier,
    }
}

/// Whether `specifier` names a bare package rather than a relative,
/// absolute, subpath-import or protocol specifier.
pub fn is_bare_specifier(specifier: &str) -> bool {
    !(specifier.is_empty()
        || specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with('#')
        || specifier.contains(':'))
}
