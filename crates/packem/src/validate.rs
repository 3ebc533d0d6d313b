//! Entry validation: glob expansion, source probing, name safety,
//! deduplication and output collisions.

use indexmap::IndexMap;
use path_clean::PathClean;
use rustc_hash::FxHashMap;
use std::path::{Component, Path, PathBuf};

use crate::entry::{BuildEntry, EntryIdentity};
use crate::inference::DefaultShape;
use crate::options::{ResolvedPaths, relative_slash};
use crate::runtime::Runtime;
use crate::scanner::{is_declaration_file, is_test_file};
use crate::{Error, Result};

/// Validated entries plus warnings for dropped ones.
#[derive(Debug, Clone, Default)]
pub struct Validated {
    pub entries: Vec<BuildEntry>,
    pub warnings: Vec<String>,
}

/// Run every validation step in order.
///
/// Entries that request no format at all get `defaults`; entries whose
/// flags are all explicitly off are dropped with a warning.
pub fn validate_entries(
    runtime: &dyn Runtime,
    entries: Vec<BuildEntry>,
    paths: &ResolvedPaths,
    extensions: &[String],
    defaults: DefaultShape,
) -> Result<Validated> {
    let expanded = expand_globs(runtime, entries, paths, extensions)?;

    let mut resolved = Vec::with_capacity(expanded.len());
    for mut entry in expanded {
        entry.input = resolve_input(runtime, &entry.input, paths, extensions)?;
        validate_name(&entry.name)?;
        if let Some(alias) = &entry.file_alias {
            validate_name(alias)?;
        }
        resolved.push(entry);
    }

    let mut warnings = Vec::new();
    let entries = dedup(resolved)
        .into_iter()
        .filter_map(|mut entry| {
            if entry.cjs.is_none() && entry.esm.is_none() && entry.declaration.is_none() {
                defaults.apply(&mut entry);
            }
            if entry.has_output() {
                Some(entry)
            } else {
                warnings.push(format!(
                    "Entry \"{}\" ({}) requests no output and will be skipped.",
                    entry.name,
                    relative_slash(&paths.root, &entry.input)
                ));
                None
            }
        })
        .collect::<Vec<_>>();

    check_targets(&entries, paths)?;
    Ok(Validated { entries, warnings })
}

/// Reject distinct entries that would write the same output file.
///
/// Two entries collide when they share output directory, environment,
/// runtime and on-disk stem, and both request the same output kind.
pub fn check_targets(entries: &[BuildEntry], paths: &ResolvedPaths) -> Result<()> {
    let mut targets: FxHashMap<_, &BuildEntry> = FxHashMap::default();
    for entry in entries {
        let kinds = [
            (entry.wants_cjs(), "cjs"),
            (entry.wants_esm(), "esm"),
            (entry.wants_declaration(), "declaration"),
        ];
        for (_, kind) in kinds.into_iter().filter(|(wanted, _)| *wanted) {
            let key = (
                entry.out_dir.as_deref(),
                entry.environment,
                entry.runtime,
                entry.output_stem(),
                kind,
            );
            if let Some(first) = targets.insert(key, entry) {
                return Err(Error::config(format!(
                    "Entries \"{}\" and \"{}\" both build \"{}\" ({kind}) into the same file. Give one of them a different name.",
                    relative_slash(&paths.root, &first.input),
                    relative_slash(&paths.root, &entry.input),
                    entry.output_stem(),
                )));
            }
        }
    }
    Ok(())
}

/// Logical name of `input`: relative to the source directory (or the root
/// when outside it), `/`-separated, with the source extension removed.
pub fn derive_name(input: &Path, paths: &ResolvedPaths, extensions: &[String]) -> String {
    let relative = if input.starts_with(&paths.source_dir) {
        relative_slash(&paths.source_dir, input)
    } else {
        relative_slash(&paths.root, input)
    };

    extensions
        .iter()
        .filter(|ext| relative.ends_with(ext.as_str()) && relative.len() > ext.len())
        .max_by_key(|ext| ext.len())
        .map(|ext| relative[..relative.len() - ext.len()].to_string())
        .unwrap_or(relative)
}

pub fn is_glob(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

/// Replace every glob-pattern input with one entry per matching file.
pub fn expand_globs(
    runtime: &dyn Runtime,
    entries: Vec<BuildEntry>,
    paths: &ResolvedPaths,
    extensions: &[String],
) -> Result<Vec<BuildEntry>> {
    let mut out = Vec::with_capacity(entries.len());

    for entry in entries {
        let pattern = entry.input.to_string_lossy().into_owned();
        if !is_glob(&pattern) {
            out.push(entry);
            continue;
        }

        let matches = glob::glob(&pattern)
            .map_err(|e| Error::config(format!("Invalid entry pattern {pattern:?}: {e}")))?;

        let mut files: Vec<PathBuf> = matches
            .filter_map(|m| m.ok())
            .filter(|path| runtime.is_file(path))
            .filter(|path| {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy())
                    .unwrap_or_default();
                !is_declaration_file(&file_name) && !is_test_file(&file_name)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(Error::not_found(
                format!(
                    "No files match the entry pattern \"{}\".",
                    relative_slash(&paths.root, &entry.input)
                ),
                &entry.input,
            ));
        }

        tracing::debug!(pattern = %pattern, count = files.len(), "expanded entry glob");
        for file in files {
            let name = derive_name(&file, paths, extensions);
            out.push(BuildEntry {
                input: file,
                name,
                ..entry.clone()
            });
        }
    }

    Ok(out)
}

/// Find the file behind an entry input: the path itself, then
/// `<input><ext>`, then `<input>/index<ext>`.
pub fn resolve_input(
    runtime: &dyn Runtime,
    input: &Path,
    paths: &ResolvedPaths,
    extensions: &[String],
) -> Result<PathBuf> {
    if runtime.is_file(input) {
        return Ok(input.to_path_buf());
    }

    let text = input.to_string_lossy();
    let direct = extensions
        .iter()
        .map(|ext| PathBuf::from(format!("{text}{ext}")));
    let index = extensions
        .iter()
        .map(|ext| input.join(format!("index{ext}")));

    direct
        .chain(index)
        .find(|candidate| runtime.is_file(candidate))
        .ok_or_else(|| {
            Error::not_found(
                format!(
                    "entry {} does not exist.",
                    relative_slash(&paths.root, input)
                ),
                input,
            )
        })
}

/// Check that `name` is a safe relative output path.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::config("Entry name cannot be empty."));
    }
    if name.contains('\0') {
        return Err(Error::config(format!(
            "Entry name {name:?} contains a null byte."
        )));
    }
    let path = Path::new(name);
    if path.is_absolute() || name.starts_with('/') || name.starts_with('\\') {
        return Err(Error::config(format!(
            "Entry name \"{name}\" must be a relative path."
        )));
    }
    let cleaned = path.clean();
    if cleaned == Path::new(".")
        || matches!(cleaned.components().next(), Some(Component::ParentDir))
    {
        return Err(Error::config(format!(
            "Entry name \"{name}\" escapes the output directory."
        )));
    }
    Ok(())
}

/// Join `file_name` onto `base_dir`, rejecting anything that escapes it.
pub fn validate_output_path(base_dir: &Path, file_name: &str) -> Result<PathBuf> {
    if file_name.contains('\0') {
        return Err(Error::config("Output file name contains a null byte."));
    }

    let full_path = base_dir.join(Path::new(file_name).clean()).clean();
    if !full_path.starts_with(base_dir) {
        return Err(Error::config(format!(
            "Output path '{}' escapes output directory '{}' (resolved to '{}')",
            file_name,
            base_dir.display(),
            full_path.display()
        )));
    }
    Ok(full_path)
}

/// Collapse structurally identical entries.
///
/// The first occurrence keeps its position; its unset flags are filled from
/// later duplicates ("first explicit wins").
pub fn dedup(entries: Vec<BuildEntry>) -> Vec<BuildEntry> {
    let mut unique: IndexMap<EntryIdentity, BuildEntry> = IndexMap::with_capacity(entries.len());
    for entry in entries {
        match unique.get_mut(&entry.identity()) {
            Some(existing) => existing.merge_from(&entry),
            None => {
                unique.insert(entry.identity(), entry);
            }
        }
    }
    unique.into_values().collect()
}
