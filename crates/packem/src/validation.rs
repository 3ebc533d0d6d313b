//! Post-build validation of package metadata.
//!
//! - alias names (checked with the options, before anything runs)
//! - `engines.node` ranges
//! - declared `package.json` paths against the emitted files
//! - imported packages against declared dependencies
//!
//! Everything except the alias and engines checks yields warnings; whether
//! warnings fail the build is decided by `failOnWarn`.

use semver::VersionReq;

use crate::entry::{Environment, TargetRuntime};
use crate::exports::{BinField, ExportTarget, ExportsField, ImportsField};
use crate::extension::{DeclaredKind, JS_EXTENSIONS, split_declared};
use crate::group::{GroupKey, is_node_builtin};
use crate::inference::normalize_declared;
use crate::options::ResolvedPaths;
use crate::package_json::{PackageJson, extract_package_name};
use crate::report::BuildReport;
use crate::{Error, Result};

/// An alias key must be a usable import specifier prefix.
pub fn validate_alias_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("it is empty")
    } else if name.contains('\0') || name.chars().any(char::is_whitespace) {
        Some("it contains whitespace or a null byte")
    } else if name.starts_with("./") || name.starts_with("../") || name.starts_with('/') {
        Some("it is a path, not a specifier")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::config(format!(
            "Invalid alias name \"{name}\": {reason}."
        ))),
        None => Ok(()),
    }
}

/// Check that `engines.node`, when present, is a valid npm range.
pub fn validate_engines(package: &PackageJson) -> Result<Option<Vec<VersionReq>>> {
    let Some(range) = package.engines.as_ref().and_then(|e| e.node.as_deref()) else {
        return Ok(None);
    };
    parse_npm_range(range)
        .map(Some)
        .map_err(|e| Error::config(format!("Invalid \"engines.node\" range \"{range}\": {e}")))
}

/// Parse an npm range (`>=18`, `^18 || ^20`, `>=14 <16`, `14 - 16`) into
/// alternatives.
pub fn parse_npm_range(range: &str) -> std::result::Result<Vec<VersionReq>, semver::Error> {
    range
        .split("||")
        .map(|alternative| {
            let alternative = alternative.trim();
            if let Some((low, high)) = alternative.split_once(" - ") {
                return VersionReq::parse(&format!(">={}, <={}", low.trim(), high.trim()));
            }
            VersionReq::parse(&comparators(alternative))
        })
        .collect()
}

/// `>= 14 <16` -> `>=14, <16`
fn comparators(alternative: &str) -> String {
    if alternative.is_empty() || alternative == "x" {
        return "*".to_string();
    }
    let mut parts: Vec<String> = Vec::new();
    let mut pending_operator: Option<&str> = None;
    for token in alternative.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_operator = Some(token);
            continue;
        }
        match pending_operator.take() {
            Some(operator) => parts.push(format!("{operator}{token}")),
            None => parts.push(token.to_string()),
        }
    }
    parts.join(", ")
}

/// One path the package declares, with the group its conditions select.
struct Declared {
    field: String,
    path: String,
    group: GroupKey,
}

impl Declared {
    fn plain(field: String, path: &str) -> Self {
        Self {
            field,
            path: path.to_string(),
            group: GroupKey::default(),
        }
    }
}

fn declared_paths(package: &PackageJson) -> Result<Vec<Declared>> {
    let mut declared = Vec::new();
    if let Some(main) = &package.main {
        declared.push(Declared::plain("main".to_string(), main));
    }
    if let Some(module) = &package.module {
        declared.push(Declared::plain("module".to_string(), module));
    }
    if let Some((field, types)) = package.types_field() {
        declared.push(Declared::plain(field.to_string(), types));
    }

    let mut targets: Vec<(String, ExportTarget)> = Vec::new();
    if let Some(exports) = &package.exports {
        for target in ExportsField::parse(exports)?.flatten() {
            targets.push((target.field("exports"), target));
        }
    }
    if let Some(imports) = &package.imports {
        for target in ImportsField::parse(imports)?.flatten() {
            targets.push((target.field("imports"), target));
        }
    }
    for (field, target) in targets.into_iter().filter(|(_, t)| !t.is_wildcard()) {
        declared.push(Declared {
            group: condition_group(&target.conditions),
            field,
            path: target.path,
        });
    }

    if let Some(bin) = &package.bin {
        for (field, path) in BinField::parse(bin)?.targets() {
            declared.push(Declared::plain(field, path));
        }
    }

    Ok(declared)
}

/// The environment and runtime a leaf's conditions select. The innermost
/// condition wins, as in entry inference.
fn condition_group(conditions: &[String]) -> GroupKey {
    GroupKey {
        environment: conditions
            .iter()
            .rev()
            .find_map(|c| Environment::from_condition(c)),
        runtime: conditions
            .iter()
            .rev()
            .find_map(|c| TargetRuntime::from_condition(c)),
    }
}

/// Where the planner writes a declared leaf, relative to the output
/// directory: `index.development.mjs` under `development` lands at
/// `development/index.mjs`.
fn planned_path(relative: &str, group: GroupKey) -> String {
    let subdir = group.subdir();
    if subdir.is_empty() {
        return relative.to_string();
    }
    let Some((stem, ext, _)) = split_declared(relative) else {
        return format!("{subdir}/{relative}");
    };

    let mut stem = stem;
    for key in [
        group.environment.map(|e| e.as_str()),
        group.runtime.map(|r| r.as_str()),
    ]
    .into_iter()
    .flatten()
    {
        if let Some(base) = stem.strip_suffix(key).and_then(|s| s.strip_suffix('.')) {
            stem = base;
        }
    }
    format!("{subdir}/{stem}{ext}")
}

/// Every declared path inside the output directory must have been emitted.
///
/// Leaves under environment or runtime conditions are looked up in their
/// group subdirectory. When a sibling with a different JS extension was
/// emitted instead, the warning names it.
pub fn validate_package_fields(
    package: &PackageJson,
    report: &BuildReport,
    paths: &ResolvedPaths,
) -> Result<Vec<String>> {
    let prefix = format!("{}/", paths.out_dir_relative());
    let mut warnings = Vec::new();

    for Declared { field, path, group } in declared_paths(package)? {
        let normalized = normalize_declared(&path);
        let Some(relative) = normalized.strip_prefix(&prefix) else {
            continue;
        };
        let planned = planned_path(relative, group);
        if report.get(relative).is_some() || report.get(&planned).is_some() {
            continue;
        }

        let emitted_instead = split_declared(&planned).and_then(|(stem, _, kind)| match kind {
            DeclaredKind::Js(_) => JS_EXTENSIONS
                .iter()
                .map(|ext| format!("{stem}{ext}"))
                .find(|candidate| report.get(candidate).is_some()),
            DeclaredKind::Declaration => None,
        });

        warnings.push(match emitted_instead {
            Some(actual) => format!(
                "Field \"{field}\" declares \"{path}\", but the build wrote \"./{prefix}{actual}\"."
            ),
            None => format!("Field \"{field}\" points to \"{path}\", which was not emitted."),
        });
    }

    Ok(warnings)
}

/// Compare imported packages with the declared dependencies.
pub fn validate_dependencies(package: &PackageJson, report: &BuildReport) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut imported: Vec<&str> = report
        .external_imports()
        .iter()
        .filter(|s| !is_node_builtin(s))
        .map(|s| extract_package_name(s))
        .filter(|name| package.name.as_deref() != Some(*name))
        .collect();
    imported.sort_unstable();
    imported.dedup();

    for name in &imported {
        let runtime_declared = package.dependencies.contains_key(*name)
            || package.peer_dependencies.contains_key(*name)
            || package.optional_dependencies.contains_key(*name);
        if runtime_declared {
            continue;
        }
        if package.dev_dependencies.contains_key(*name) {
            warnings.push(format!(
                "\"{name}\" is imported by the build output but only listed in \"devDependencies\"."
            ));
        } else {
            warnings.push(format!(
                "\"{name}\" is imported by the build output but not declared in \"dependencies\" or \"peerDependencies\"."
            ));
        }
    }

    for name in package.dependencies.keys() {
        if name.starts_with("@types/") || imported.contains(&name.as_str()) {
            continue;
        }
        warnings.push(format!(
            "Dependency \"{name}\" is declared but never imported by the build output."
        ));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{EmittedAsset, EmittedChunk, TaskOutput};
    use crate::options::BuildOptions;
    use serde_json::json;
    use std::path::Path;

    fn package(value: serde_json::Value) -> PackageJson {
        PackageJson::parse(value.to_string().as_bytes()).unwrap()
    }

    fn report(chunks: &[(&str, &[&str])], assets: &[&str]) -> BuildReport {
        let mut report = BuildReport::new();
        report.record(&TaskOutput {
            chunks: chunks
                .iter()
                .map(|(path, externals)| EmittedChunk {
                    path: path.to_string(),
                    bytes: 1,
                    is_entry: true,
                    entry_name: None,
                    imports: Vec::new(),
                    external_imports: externals.iter().map(|s| s.to_string()).collect(),
                    exports: Vec::new(),
                    modules: Vec::new(),
                })
                .collect(),
            assets: assets
                .iter()
                .map(|path| EmittedAsset {
                    path: path.to_string(),
                    bytes: 1,
                })
                .collect(),
            warnings: Vec::new(),
        });
        report
    }

    #[test]
    fn alias_names() {
        assert!(validate_alias_name("@").is_ok());
        assert!(validate_alias_name("~utils").is_ok());
        let err = validate_alias_name("./src").unwrap_err();
        assert!(err.to_string().contains("\"./src\""));
        assert!(validate_alias_name("").is_err());
        assert!(validate_alias_name("my alias").is_err());
    }

    #[test]
    fn npm_ranges() {
        assert_eq!(parse_npm_range(">=18").unwrap().len(), 1);
        assert_eq!(parse_npm_range("^18 || ^20").unwrap().len(), 2);
        assert!(parse_npm_range(">= 14 <16").is_ok());
        assert!(parse_npm_range("14 - 16").is_ok());
        assert!(parse_npm_range("*").is_ok());
        assert!(parse_npm_range("not a range").is_err());
    }

    #[test]
    fn invalid_engines_names_value() {
        let pkg = package(json!({ "engines": { "node": "banana" } }));
        let err = validate_engines(&pkg).unwrap_err();
        assert!(err.to_string().contains("\"banana\""));

        let pkg = package(json!({ "engines": { "node": ">=18" } }));
        assert!(validate_engines(&pkg).unwrap().is_some());
    }

    #[test]
    fn missing_and_mismatched_fields() {
        let pkg = package(json!({
            "main": "./dist/index.js",
            "types": "./dist/index.d.ts",
            "exports": { ".": { "import": "./dist/index.mjs" }, "./extra": "./dist/extra.js" },
            "imports": { "#internal": "./dist/internal.js" }
        }));
        let paths = ResolvedPaths::new(Path::new("/p"), &BuildOptions::default());
        let report = report(&[("index.cjs", &[]), ("index.mjs", &[])], &["index.d.ts"]);

        let warnings = validate_package_fields(&pkg, &report, &paths).unwrap();

        assert_eq!(
            warnings,
            vec![
                "Field \"main\" declares \"./dist/index.js\", but the build wrote \"./dist/index.mjs\".",
                "Field \"exports[\"./extra\"]\" points to \"./dist/extra.js\", which was not emitted.",
                "Field \"imports[\"#internal\"]\" points to \"./dist/internal.js\", which was not emitted.",
            ]
        );
    }

    #[test]
    fn variant_leaves_are_found_in_their_group() {
        let pkg = package(json!({
            "exports": {
                "import": {
                    "development": "./dist/index.development.mjs",
                    "production": "./dist/index.production.mjs",
                    "edge-light": "./dist/worker.edge-light.mjs",
                    "default": "./dist/index.mjs"
                }
            }
        }));
        let paths = ResolvedPaths::new(Path::new("/p"), &BuildOptions::default());
        let report = report(
            &[
                ("index.mjs", &[]),
                ("development/index.mjs", &[]),
                ("production/index.js", &[]),
                ("edge-light/worker.mjs", &[]),
            ],
            &[],
        );

        let warnings = validate_package_fields(&pkg, &report, &paths).unwrap();

        assert_eq!(
            warnings,
            vec![
                "Field \"exports[\".\"].import.production\" declares \"./dist/index.production.mjs\", but the build wrote \"./dist/production/index.js\".",
            ]
        );
    }

    #[test]
    fn planned_paths_follow_the_group_subdirectory() {
        let production = GroupKey {
            environment: Some(Environment::Production),
            runtime: None,
        };
        assert_eq!(
            planned_path("index.production.mjs", production),
            "production/index.mjs"
        );
        assert_eq!(planned_path("index.mjs", production), "production/index.mjs");
        assert_eq!(planned_path("index.mjs", GroupKey::default()), "index.mjs");

        let both = GroupKey {
            environment: Some(Environment::Development),
            runtime: Some(TargetRuntime::EdgeLight),
        };
        assert_eq!(
            planned_path("lib/a.development.d.mts", both),
            "development/edge-light/lib/a.d.mts"
        );
    }

    #[test]
    fn dependency_checks() {
        let pkg = package(json!({
            "name": "my-lib",
            "dependencies": { "react": "^18", "unused": "^1", "@types/node": "^20" },
            "devDependencies": { "vitest": "^1" }
        }));
        let report = report(
            &[(
                "index.mjs",
                &["react/jsx-runtime", "vitest", "lodash", "node:fs", "path", "my-lib/utils"],
            )],
            &[],
        );

        let warnings = validate_dependencies(&pkg, &report);

        assert_eq!(
            warnings,
            vec![
                "\"lodash\" is imported by the build output but not declared in \"dependencies\" or \"peerDependencies\".",
                "\"vitest\" is imported by the build output but only listed in \"devDependencies\".",
                "Dependency \"unused\" is declared but never imported by the build output.",
            ]
        );
    }
}
