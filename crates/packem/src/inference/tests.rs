use super::*;
use crate::entry::{ModuleFormat, TargetRuntime};
use crate::runtime::NativeRuntime;
use serde_json::{Value, json};
use tempfile::TempDir;

fn fixture(files: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for file in files {
        let path = dir.path().join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "export const value = 1;\n").unwrap();
    }
    dir
}

async fn infer(dir: &TempDir, package: Value, options: BuildOptions) -> Result<Inferred> {
    let package = PackageJson::parse(package.to_string().as_bytes()).unwrap();
    let paths = ResolvedPaths::new(dir.path(), &options);
    infer_entries(&NativeRuntime::new(), &package, &options, &paths).await
}

#[tokio::test]
async fn minimal_package_main_only() {
    let dir = fixture(&["src/index.ts"]);
    let inferred = infer(&dir, json!({ "main": "./dist/index.cjs" }), BuildOptions::default())
        .await
        .unwrap();

    assert_eq!(inferred.entries.len(), 1);
    let entry = &inferred.entries[0];
    assert_eq!(entry.name, "index");
    assert_eq!(entry.input, dir.path().join("src/index.ts"));
    assert_eq!(entry.cjs, Some(true));
    assert_eq!(entry.esm, None);
    assert!(inferred.warnings.is_empty());
}

#[tokio::test]
async fn dual_package_with_environment_conditions() {
    let dir = fixture(&[
        "src/index.ts",
        "src/index.development.ts",
        "src/index.production.ts",
    ]);
    let package = json!({
        "exports": {
            "import": {
                "development": "./dist/index.development.mjs",
                "production": "./dist/index.production.mjs",
                "default": "./dist/index.mjs"
            }
        }
    });

    let inferred = infer(&dir, package, BuildOptions::default()).await.unwrap();

    assert_eq!(inferred.entries.len(), 3);
    assert!(inferred.entries.iter().all(|e| e.name == "index"));
    assert!(inferred.entries.iter().all(|e| e.esm == Some(true)));
    let mut environments: Vec<_> = inferred.entries.iter().map(|e| e.environment).collect();
    environments.sort();
    assert_eq!(
        environments,
        vec![
            None,
            Some(Environment::Development),
            Some(Environment::Production)
        ]
    );
    let development = inferred
        .entries
        .iter()
        .find(|e| e.environment == Some(Environment::Development))
        .unwrap();
    assert_eq!(development.input, dir.path().join("src/index.development.ts"));
}

#[tokio::test]
async fn wildcard_exports_expand_against_sources() {
    let dir = fixture(&["src/pages/a.ts", "src/pages/b.ts"]);
    let package = json!({
        "exports": { "./pages/*": { "import": "./dist/pages/*.mjs" } }
    });

    let inferred = infer(&dir, package, BuildOptions::default()).await.unwrap();

    let names: Vec<_> = inferred.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["pages/a", "pages/b"]);
    assert!(inferred.entries.iter().all(|e| e.esm == Some(true)));
    assert!(inferred.entries.iter().all(|e| e.cjs.is_none()));
}

#[tokio::test]
async fn main_and_module_on_one_file_conflict() {
    let dir = fixture(&["src/index.ts"]);
    let package = json!({ "main": "./dist/index.js", "module": "./dist/index.js" });

    let err = infer(&dir, package, BuildOptions::default()).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Conflicting field \"module\" with entry \"./dist/index.js\" detected. Please change one of the entries inside your \"package.json\"."
    );
}

#[tokio::test]
async fn import_condition_on_cjs_file_conflicts() {
    let dir = fixture(&["src/index.ts"]);
    let package = json!({ "exports": { ".": { "import": "./dist/index.cjs" } } });

    let err = infer(&dir, package, BuildOptions::default()).await.unwrap_err();
    assert!(err.to_string().starts_with("Conflicting field \"exports[\".\"].import\""));
}

#[tokio::test]
async fn import_and_require_merge_into_one_entry() {
    let dir = fixture(&["src/index.ts", "src/utils/index.ts"]);
    let package = json!({
        "main": "./dist/index.cjs",
        "types": "./dist/index.d.ts",
        "exports": {
            ".": { "import": "./dist/index.mjs", "require": "./dist/index.cjs" },
            "./utils": { "import": "./dist/utils.mjs" }
        }
    });

    let inferred = infer(&dir, package, BuildOptions::default()).await.unwrap();

    assert_eq!(inferred.entries.len(), 2);
    let index = &inferred.entries[0];
    assert_eq!(index.name, "index");
    assert!(index.wants(ModuleFormat::Cjs) && index.wants(ModuleFormat::Esm));
    assert_eq!(index.declaration, Some(true));
    let utils = &inferred.entries[1];
    assert_eq!(utils.name, "utils");
    assert_eq!(utils.input, dir.path().join("src/utils/index.ts"));
}

#[tokio::test]
async fn js_extension_follows_package_type() {
    let dir = fixture(&["src/index.ts"]);
    let inferred = infer(
        &dir,
        json!({ "type": "module", "main": "./dist/index.js" }),
        BuildOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(inferred.entries[0].esm, Some(true));
    assert_eq!(inferred.entries[0].cjs, None);
}

#[tokio::test]
async fn custom_condition_becomes_file_alias() {
    let dir = fixture(&["src/index.ts", "src/index.react-server.ts"]);
    let package = json!({
        "exports": {
            ".": {
                "react-server": "./dist/index.react-server.mjs",
                "default": "./dist/index.mjs"
            }
        }
    });

    let inferred = infer(&dir, package, BuildOptions::default()).await.unwrap();

    assert_eq!(inferred.entries.len(), 2);
    let alias = inferred
        .entries
        .iter()
        .find(|e| e.file_alias.is_some())
        .unwrap();
    assert_eq!(alias.name, "index");
    assert_eq!(alias.file_alias.as_deref(), Some("index.react-server"));
    assert_eq!(alias.input, dir.path().join("src/index.react-server.ts"));
}

#[tokio::test]
async fn runtime_conditions_split_entries() {
    let dir = fixture(&["src/index.ts"]);
    let package = json!({
        "exports": {
            ".": {
                "edge-light": "./dist/index.edge.mjs",
                "node": "./dist/index.mjs"
            }
        }
    });

    // `index.edge` is not a runtime suffix, so it needs a source of its own.
    let inferred = infer(&dir, package, BuildOptions::default()).await.unwrap();
    assert_eq!(inferred.entries.len(), 1);
    assert_eq!(inferred.warnings.len(), 1);

    let package = json!({
        "exports": {
            ".": {
                "edge-light": "./dist/index.edge-light.mjs",
                "node": "./dist/index.mjs"
            }
        }
    });
    let inferred = infer(&dir, package, BuildOptions::default()).await.unwrap();
    let runtimes: Vec<_> = inferred.entries.iter().map(|e| e.runtime).collect();
    assert_eq!(
        runtimes,
        vec![Some(TargetRuntime::EdgeLight), Some(TargetRuntime::Node)]
    );
}

#[tokio::test]
async fn unmappable_leaves_are_warnings() {
    let dir = fixture(&["src/index.ts"]);
    let package = json!({
        "main": "./dist/index.cjs",
        "exports": {
            ".": "./dist/index.cjs",
            "./package.json": "./package.json",
            "./missing": "./dist/missing.cjs",
            "./styles": "./dist/styles.css"
        }
    });

    let inferred = infer(&dir, package, BuildOptions::default()).await.unwrap();

    assert_eq!(inferred.entries.len(), 1);
    assert_eq!(inferred.warnings.len(), 3);
    assert!(inferred.warnings[0].contains("outside of the \"dist\" directory"));
    assert!(inferred.warnings[1].contains("Could not find a source file"));
    assert!(inferred.warnings[2].contains("unsupported file extension"));
}

#[tokio::test]
async fn bin_entries_are_executable() {
    let dir = fixture(&["src/index.ts", "src/cli.ts"]);
    let package = json!({
        "type": "module",
        "main": "./dist/index.js",
        "bin": { "tool": "./dist/cli.js" }
    });

    let inferred = infer(&dir, package, BuildOptions::default()).await.unwrap();
    let cli = inferred.entries.iter().find(|e| e.name == "cli").unwrap();
    assert!(cli.executable);
    assert_eq!(cli.esm, Some(true));
}

#[tokio::test]
async fn auto_detect_folds_environment_variants() {
    let dir = fixture(&["src/index.ts", "src/index.production.ts", "src/utils.ts"]);

    let inferred = infer(&dir, json!({ "name": "lib" }), BuildOptions::default())
        .await
        .unwrap();

    let summary: Vec<_> = inferred
        .entries
        .iter()
        .map(|e| (e.name.as_str(), e.environment))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("index", None),
            ("utils", None),
            ("index", Some(Environment::Production)),
        ]
    );
    let index = &inferred.entries[0];
    assert_eq!((index.cjs, index.esm), (Some(true), Some(true)));
}

#[tokio::test]
async fn auto_detect_module_package_skips_cjs() {
    let dir = fixture(&["src/index.ts"]);
    let inferred = infer(&dir, json!({ "type": "module" }), BuildOptions::default())
        .await
        .unwrap();
    assert_eq!(inferred.entries[0].cjs, Some(false));
    assert_eq!(inferred.entries[0].esm, Some(true));
}

#[tokio::test]
async fn missing_src_directory() {
    let dir = TempDir::new().unwrap();
    let err = infer(&dir, json!({ "main": "./dist/index.cjs" }), BuildOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert_eq!(err.to_string(), "No 'src' directory found.");
}

#[tokio::test]
async fn no_entries_detected() {
    let dir = fixture(&["src/index.ts"]);
    let err = infer(&dir, json!({ "main": "./lib/index.cjs" }), BuildOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No entries detected.");
}

#[tokio::test]
async fn same_source_same_file_different_environment_is_ambiguous() {
    let dir = fixture(&["src/index.ts"]);
    let package = json!({
        "exports": {
            ".": {
                "development": "./dist/index.mjs",
                "default": "./dist/index.mjs"
            }
        }
    });
    let err = infer(&dir, package, BuildOptions::default()).await.unwrap_err();
    assert!(err.to_string().starts_with("Ambiguous target"));
}

#[tokio::test]
async fn configured_entries_are_used_verbatim() {
    let dir = fixture(&["src/index.ts"]);
    let options = BuildOptions {
        entries: vec![EntryOption::Path("src/index.ts".to_string())],
        ..Default::default()
    };

    let inferred = infer(&dir, json!({ "main": "./dist/other.cjs" }), options)
        .await
        .unwrap();

    assert_eq!(inferred.entries.len(), 1);
    assert_eq!(inferred.entries[0].name, "index");
    assert_eq!(inferred.entries[0].cjs, None);
}

#[tokio::test]
async fn explicit_format_options_override_inference() {
    let dir = fixture(&["src/index.ts"]);
    let options = BuildOptions {
        emit_cjs: Some(false),
        declaration: Some(true),
        ..Default::default()
    };
    let inferred = infer(
        &dir,
        json!({ "main": "./dist/index.cjs", "module": "./dist/index.mjs" }),
        options,
    )
    .await
    .unwrap();

    let entry = &inferred.entries[0];
    assert_eq!(entry.cjs, Some(false));
    assert_eq!(entry.esm, Some(true));
    assert_eq!(entry.declaration, Some(true));
}

#[tokio::test]
async fn inference_is_idempotent() {
    let dir = fixture(&[
        "src/index.ts",
        "src/index.development.ts",
        "src/pages/a.ts",
        "src/pages/b.ts",
    ]);
    let package = json!({
        "main": "./dist/index.cjs",
        "exports": {
            ".": { "import": "./dist/index.mjs", "require": "./dist/index.cjs" },
            "./pages/*": "./dist/pages/*.mjs"
        }
    });

    let first = infer(&dir, package.clone(), BuildOptions::default())
        .await
        .unwrap();
    let second = infer(&dir, package, BuildOptions::default()).await.unwrap();

    assert_eq!(
        serde_json::to_vec(&first.entries).unwrap(),
        serde_json::to_vec(&second.entries).unwrap()
    );
}
