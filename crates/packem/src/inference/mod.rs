//! Entry inference.
//!
//! Entries come from one of three places, in priority order:
//!
//! 1. `options.entries`, used verbatim;
//! 2. the package's declared surface (`main`, `module`, `types`, `exports`,
//!    `bin`), mapped back to source files;
//! 3. every file of the source directory, when the package declares none of
//!    those fields.
//!
//! In cases 2 and 3, `<name>.development.<ext>` / `<name>.production.<ext>`
//! siblings are folded in as environment variants of `<name>`.

mod fields;

use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use crate::entry::{BuildEntry, EntryIdentity, Environment};
use crate::options::{BuildOptions, EntryOption, ResolvedPaths};
use crate::package_json::PackageJson;
use crate::runtime::Runtime;
use crate::scanner::{self, SourceFile};
use crate::validate::derive_name;
use crate::{Error, Result};

pub(crate) use fields::normalize_declared;

/// Entries plus the non-fatal anomalies found while inferring them.
#[derive(Debug, Clone, Default)]
pub struct Inferred {
    pub entries: Vec<BuildEntry>,
    pub warnings: Vec<String>,
}

/// Flags given to entries that request no output of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultShape {
    pub cjs: bool,
    pub esm: bool,
    pub declaration: bool,
}

impl DefaultShape {
    /// ESM always; CJS unless the package is `type: module`; declarations
    /// only when enabled.
    pub fn for_package(package: &PackageJson, options: &BuildOptions) -> Self {
        Self {
            cjs: options.emit_cjs.unwrap_or(!package.is_module()),
            esm: options.emit_esm.unwrap_or(true),
            declaration: options.declaration.unwrap_or(false),
        }
    }

    pub fn apply(&self, entry: &mut BuildEntry) {
        entry.cjs = Some(self.cjs);
        entry.esm = Some(self.esm);
        entry.declaration = Some(self.declaration);
    }
}

/// Infer the build entries of a package.
pub async fn infer_entries(
    runtime: &dyn Runtime,
    package: &PackageJson,
    options: &BuildOptions,
    paths: &ResolvedPaths,
) -> Result<Inferred> {
    if !options.entries.is_empty() {
        let mut entries: Vec<BuildEntry> = options
            .entries
            .iter()
            .map(|option| from_option(option, paths, &options.source_extensions))
            .collect();
        apply_overrides(&mut entries, options);
        tracing::debug!(count = entries.len(), "using configured entries");
        return Ok(Inferred {
            entries,
            warnings: Vec::new(),
        });
    }

    let sources = scanner::scan(runtime, &paths.source_dir, &options.source_extensions).await?;

    let (mut entries, warnings) = if package.has_entry_fields() {
        let mut inferrer = fields::FieldInferrer::new(runtime, package, options, paths, &sources);
        inferrer.collect()?;
        inferrer.into_entries()
    } else {
        tracing::debug!("package declares no entry fields, using source files");
        (from_sources(&sources, package, options), Vec::new())
    };

    add_environment_variants(runtime, &mut entries, &options.source_extensions);

    let mut entries: Vec<BuildEntry> = entries.into_values().collect();
    apply_overrides(&mut entries, options);

    if entries.is_empty() {
        return Err(Error::config("No entries detected."));
    }

    tracing::debug!(count = entries.len(), "inferred entries");
    Ok(Inferred { entries, warnings })
}

fn from_option(option: &EntryOption, paths: &ResolvedPaths, extensions: &[String]) -> BuildEntry {
    match option {
        EntryOption::Path(path) => {
            let input = paths.root.join(path);
            let name = derive_name(&input, paths, extensions);
            BuildEntry::new(input, name)
        }
        EntryOption::Entry(config) => {
            let input = paths.root.join(&config.input);
            let name = config
                .name
                .clone()
                .unwrap_or_else(|| derive_name(&input, paths, extensions));
            BuildEntry {
                out_dir: config.out_dir.as_ref().map(|dir| paths.root.join(dir)),
                cjs: config.cjs,
                esm: config.esm,
                declaration: config.declaration,
                environment: config.environment,
                runtime: config.runtime,
                executable: config.executable,
                ..BuildEntry::new(input, name)
            }
        }
    }
}

fn from_sources(
    sources: &[SourceFile],
    package: &PackageJson,
    options: &BuildOptions,
) -> IndexMap<EntryIdentity, BuildEntry> {
    let shape = DefaultShape::for_package(package, options);
    let mut entries = IndexMap::new();

    for source in sources {
        let is_variant = source.name.rsplit_once('.').is_some_and(|(base, suffix)| {
            Environment::from_condition(suffix).is_some()
                && sources.iter().any(|other| other.name == base)
        });
        if is_variant {
            continue;
        }

        let mut entry = BuildEntry::new(source.path.clone(), source.name.clone());
        shape.apply(&mut entry);
        fields::upsert(&mut entries, entry);
    }
    entries
}

/// Add `<stem>.<environment><ext>` siblings of every environment-less entry.
fn add_environment_variants(
    runtime: &dyn Runtime,
    entries: &mut IndexMap<EntryIdentity, BuildEntry>,
    extensions: &[String],
) {
    let bases: Vec<BuildEntry> = entries
        .values()
        .filter(|entry| entry.environment.is_none())
        .cloned()
        .collect();

    for base in bases {
        let Some(stem) = source_stem(&base.input, extensions) else {
            continue;
        };
        for environment in [Environment::Development, Environment::Production] {
            let Some(variant_input) = extensions
                .iter()
                .map(|ext| PathBuf::from(format!("{stem}.{environment}{ext}")))
                .find(|candidate| runtime.is_file(candidate))
            else {
                continue;
            };

            tracing::debug!(name = %base.name, %environment, "found environment variant");
            let mut variant = base.clone().with_environment(Some(environment));
            variant.input = variant_input;
            fields::upsert(entries, variant);
        }
    }
}

/// Input path without its source extension, as a string.
fn source_stem(input: &Path, extensions: &[String]) -> Option<String> {
    let text = input.to_str()?;
    extensions
        .iter()
        .filter(|ext| text.ends_with(ext.as_str()))
        .max_by_key(|ext| ext.len())
        .map(|ext| text[..text.len() - ext.len()].to_string())
}

/// `emitCJS`, `emitESM` and `declaration` override inferred flags when set.
fn apply_overrides(entries: &mut [BuildEntry], options: &BuildOptions) {
    for entry in entries {
        if let Some(cjs) = options.emit_cjs {
            entry.cjs = Some(cjs);
        }
        if let Some(esm) = options.emit_esm {
            entry.esm = Some(esm);
        }
        if let Some(declaration) = options.declaration {
            entry.declaration = Some(declaration);
        }
    }
}

/// Find the source for a logical name: `<dir>/<name><ext>` for each
/// extension, then `<dir>/<name>/index<ext>`.
pub fn probe_source(
    runtime: &dyn Runtime,
    source_dir: &Path,
    name: &str,
    extensions: &[String],
) -> Option<PathBuf> {
    let direct = extensions
        .iter()
        .map(|ext| source_dir.join(format!("{name}{ext}")));
    let index = extensions
        .iter()
        .map(|ext| source_dir.join(name).join(format!("index{ext}")));

    direct.chain(index).find(|candidate| runtime.is_file(candidate))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests;
