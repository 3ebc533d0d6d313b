//! Entry inference from `main`, `module`, `types`, `exports` and `bin`.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

use crate::entry::{BuildEntry, EntryIdentity, Environment, ModuleFormat, TargetRuntime};
use crate::exports::{BinField, ExportTarget, ExportsField, match_wildcard, substitute};
use crate::extension::{DeclaredKind, split_declared};
use crate::options::{BuildOptions, ResolvedPaths};
use crate::package_json::PackageJson;
use crate::runtime::Runtime;
use crate::scanner::SourceFile;
use crate::{Error, Result};

use super::probe_source;

/// Condition keys with a structural meaning. Anything else is custom.
const KNOWN_CONDITIONS: [&str; 9] = [
    "import",
    "require",
    "default",
    "types",
    "module",
    "node",
    "edge-light",
    "development",
    "production",
];

/// What a declared output path produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputKind {
    Js(ModuleFormat),
    Declaration,
}

#[derive(Debug, Clone)]
struct Claim {
    kind: OutputKind,
    input: PathBuf,
    environment: Option<Environment>,
}

/// A declared output path plus where it was declared.
#[derive(Debug, Clone)]
struct Leaf {
    field: String,
    path: String,
    conditions: Vec<String>,
    module_field: bool,
    executable: bool,
}

impl Leaf {
    fn plain(field: impl Into<String>, path: &str) -> Self {
        Self {
            field: field.into(),
            path: path.to_string(),
            conditions: Vec::new(),
            module_field: false,
            executable: false,
        }
    }

    fn has_condition(&self, key: &str) -> bool {
        self.conditions.iter().any(|c| c == key)
    }
}

pub(super) struct FieldInferrer<'a> {
    runtime: &'a dyn Runtime,
    package: &'a PackageJson,
    options: &'a BuildOptions,
    paths: &'a ResolvedPaths,
    sources: &'a [SourceFile],
    out_prefix: String,
    entries: IndexMap<EntryIdentity, BuildEntry>,
    claims: FxHashMap<String, Claim>,
    pub(super) warnings: Vec<String>,
}

impl<'a> FieldInferrer<'a> {
    pub(super) fn new(
        runtime: &'a dyn Runtime,
        package: &'a PackageJson,
        options: &'a BuildOptions,
        paths: &'a ResolvedPaths,
        sources: &'a [SourceFile],
    ) -> Self {
        Self {
            runtime,
            package,
            options,
            paths,
            sources,
            out_prefix: format!("{}/", paths.out_dir_relative()),
            entries: IndexMap::new(),
            claims: FxHashMap::default(),
            warnings: Vec::new(),
        }
    }

    pub(super) fn into_entries(self) -> (IndexMap<EntryIdentity, BuildEntry>, Vec<String>) {
        (self.entries, self.warnings)
    }

    /// Walk every entry field in a fixed order: main, module, types,
    /// exports, bin.
    pub(super) fn collect(&mut self) -> Result<()> {
        let package = self.package;

        if let Some(main) = &package.main {
            self.process(Leaf::plain("main", main))?;
        }
        if let Some(module) = &package.module {
            let mut leaf = Leaf::plain("module", module);
            leaf.module_field = true;
            self.process(leaf)?;
        }
        if let Some((field, types)) = package.types_field() {
            let mut leaf = Leaf::plain(field, types);
            leaf.conditions.push("types".to_string());
            self.process(leaf)?;
        }
        if let Some(raw) = &package.exports {
            let exports = ExportsField::parse(raw)?;
            for target in exports.flatten() {
                self.process_export(&target)?;
            }
        }
        if let Some(raw) = &package.bin {
            let bin = BinField::parse(raw)?;
            for (field, path) in bin.targets() {
                let mut leaf = Leaf::plain(field, path);
                leaf.executable = true;
                self.process(leaf)?;
            }
        }

        Ok(())
    }

    fn process_export(&mut self, target: &ExportTarget) -> Result<()> {
        let leaf = Leaf {
            field: target.field("exports"),
            path: target.path.clone(),
            conditions: target.conditions.clone(),
            module_field: false,
            executable: false,
        };

        if !target.is_wildcard() {
            return self.process(leaf);
        }

        let Some(pattern) = self
            .strip_out_dir(&target.path)
            .and_then(|rel| split_declared(&rel).map(|(stem, _, _)| stem.to_string()))
        else {
            self.warn_outside(&leaf);
            return Ok(());
        };

        let captures: Vec<String> = self
            .sources
            .iter()
            .filter_map(|source| match_wildcard(&pattern, &source.name))
            .filter(|capture| !is_environment_variant(capture))
            .map(str::to_string)
            .collect();

        if captures.is_empty() {
            self.warnings.push(format!(
                "No source files match the wildcard \"{}\" of field \"{}\".",
                target.path, leaf.field
            ));
            return Ok(());
        }

        for capture in captures {
            let concrete = Leaf {
                field: substitute(&leaf.field, &capture),
                path: substitute(&target.path, &capture),
                ..leaf.clone()
            };
            self.process(concrete)?;
        }
        Ok(())
    }

    fn process(&mut self, leaf: Leaf) -> Result<()> {
        let Some(relative) = self.strip_out_dir(&leaf.path) else {
            self.warn_outside(&leaf);
            return Ok(());
        };

        let Some((stem, _, declared)) = split_declared(&relative) else {
            self.warnings.push(format!(
                "Skipping \"{}\" of field \"{}\": unsupported file extension.",
                leaf.path, leaf.field
            ));
            return Ok(());
        };

        let kind = self.output_kind(&leaf, declared)?;
        let environment = leaf
            .conditions
            .iter()
            .rev()
            .find_map(|c| Environment::from_condition(c));
        let runtime = leaf
            .conditions
            .iter()
            .rev()
            .find_map(|c| TargetRuntime::from_condition(c));
        let custom = leaf
            .conditions
            .iter()
            .rev()
            .find(|c| !KNOWN_CONDITIONS.contains(&c.as_str()));

        let Some((name, file_alias, input)) = self
            .resolve_source(stem, environment, runtime, custom.map(String::as_str))
        else {
            self.warnings.push(format!(
                "Could not find a source file for \"{}\" of field \"{}\" in \"{}\".",
                leaf.path,
                leaf.field,
                self.paths.source_dir_relative()
            ));
            return Ok(());
        };

        self.claim(&leaf, &relative, kind, &input, environment)?;

        let mut entry = BuildEntry::new(input, name)
            .with_environment(environment)
            .with_runtime(runtime);
        entry.file_alias = file_alias;
        entry.executable = leaf.executable;
        match kind {
            OutputKind::Js(ModuleFormat::Cjs) => entry.cjs = Some(true),
            OutputKind::Js(ModuleFormat::Esm) => entry.esm = Some(true),
            OutputKind::Declaration => entry.declaration = Some(true),
        }

        tracing::debug!(field = %leaf.field, name = %entry.name, ?kind, "inferred entry");
        upsert(&mut self.entries, entry);
        Ok(())
    }

    /// Decide the output format from conditions, the field and the extension.
    fn output_kind(&self, leaf: &Leaf, declared: DeclaredKind) -> Result<OutputKind> {
        let extension_format = match declared {
            DeclaredKind::Declaration => return Ok(OutputKind::Declaration),
            _ if leaf.has_condition("types") => return Ok(OutputKind::Declaration),
            DeclaredKind::Js(format) => format,
        };

        let condition_format = if leaf.has_condition("import") {
            Some(ModuleFormat::Esm)
        } else if leaf.has_condition("require") {
            Some(ModuleFormat::Cjs)
        } else if leaf.module_field || leaf.has_condition("module") {
            Some(ModuleFormat::Esm)
        } else {
            None
        };

        match (condition_format, extension_format) {
            (Some(condition), Some(extension)) if condition != extension => {
                Err(Error::conflict(&leaf.field, &leaf.path))
            }
            (Some(format), _) | (None, Some(format)) => Ok(OutputKind::Js(format)),
            (None, None) if self.package.is_module() => Ok(OutputKind::Js(ModuleFormat::Esm)),
            (None, None) => Ok(OutputKind::Js(ModuleFormat::Cjs)),
        }
    }

    /// Map an output stem back to `(name, file_alias, source)`.
    ///
    /// A stem carrying a variant suffix (`index.development`,
    /// `index.react-server`) resolves to the variant source when it exists.
    fn resolve_source(
        &self,
        stem: &str,
        environment: Option<Environment>,
        runtime: Option<TargetRuntime>,
        custom: Option<&str>,
    ) -> Option<(String, Option<String>, PathBuf)> {
        let mut name = stem.to_string();
        let mut variant = None;
        for key in [
            environment.map(|e| e.as_str()),
            runtime.map(|r| r.as_str()),
        ]
        .into_iter()
        .flatten()
        {
            if let Some(base) = name.strip_suffix(&format!(".{key}")) {
                name = base.to_string();
                variant = Some(key);
            }
        }

        if let Some(custom) = custom {
            if let Some(base) = name.strip_suffix(&format!(".{custom}")) {
                let alias = name.clone();
                if let Some(input) = self.probe(&alias) {
                    return Some((base.to_string(), Some(alias), input));
                }
            }
        }

        if let Some(key) = variant {
            if let Some(input) = self.probe(&format!("{name}.{key}")) {
                return Some((name, None, input));
            }
        }

        let input = self.probe(&name)?;
        Some((name, None, input))
    }

    fn probe(&self, name: &str) -> Option<PathBuf> {
        probe_source(
            self.runtime,
            &self.paths.source_dir,
            name,
            &self.options.source_extensions,
        )
    }

    /// Record which format claimed an output path, rejecting conflicts.
    fn claim(
        &mut self,
        leaf: &Leaf,
        relative: &str,
        kind: OutputKind,
        input: &Path,
        environment: Option<Environment>,
    ) -> Result<()> {
        if let Some(existing) = self.claims.get(relative) {
            if existing.kind != kind {
                return Err(Error::conflict(&leaf.field, &leaf.path));
            }
            if existing.input.as_path() == input && existing.environment != environment {
                return Err(Error::config(format!(
                    "Ambiguous target \"{}\" of field \"{}\": the same source is built for different environments into one file.",
                    leaf.path, leaf.field
                )));
            }
            return Ok(());
        }

        self.claims.insert(
            relative.to_string(),
            Claim {
                kind,
                input: input.to_path_buf(),
                environment,
            },
        );
        Ok(())
    }

    fn strip_out_dir(&self, path: &str) -> Option<String> {
        let normalized = normalize_declared(path);
        normalized
            .strip_prefix(&self.out_prefix)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }

    fn warn_outside(&mut self, leaf: &Leaf) {
        self.warnings.push(format!(
            "Could not map \"{}\" of field \"{}\" to a source file: it is outside of the \"{}\" directory.",
            leaf.path,
            leaf.field,
            self.paths.out_dir_relative()
        ));
    }
}

/// Insert an entry, merging flags into a structurally identical one.
pub(super) fn upsert(entries: &mut IndexMap<EntryIdentity, BuildEntry>, entry: BuildEntry) {
    match entries.get_mut(&entry.identity()) {
        Some(existing) => {
            for (slot, value) in [
                (&mut existing.cjs, entry.cjs),
                (&mut existing.esm, entry.esm),
                (&mut existing.declaration, entry.declaration),
            ] {
                if value == Some(true) {
                    *slot = Some(true);
                }
            }
            existing.executable |= entry.executable;
        }
        None => {
            entries.insert(entry.identity(), entry);
        }
    }
}

/// `./dist//a.js` -> `dist/a.js`
pub(crate) fn normalize_declared(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

pub(super) fn is_environment_variant(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, suffix)| Environment::from_condition(suffix).is_some())
}
