//! End-to-end tests that run the `packem` binary against temporary packages.

#![allow(clippy::disallowed_methods)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn package(manifest: &str, sources: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), manifest).unwrap();
    for (path, contents) in sources {
        let path = dir.path().join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

fn packem(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("packem").unwrap();
    cmd.env("NO_COLOR", "1")
        .env("PACKEM_FILE_CACHE", "false")
        .env_remove("RUST_LOG")
        .arg("--no-color")
        .current_dir(root);
    cmd
}

const MINIMAL: &str = r#"{ "name": "minimal", "version": "1.0.0", "main": "./dist/index.js" }"#;
const SOURCE: &str = "export const value = 1;\nexport default value;\n";

#[test]
fn schema_describes_the_config_file() {
    let dir = TempDir::new().unwrap();
    packem(dir.path())
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"outDir\""))
        .stdout(predicate::str::contains("\"emitCJS\""));
}

#[test]
fn build_writes_main_and_prints_a_summary() {
    let dir = package(MINIMAL, &[("src/index.ts", SOURCE)]);

    packem(dir.path())
        .arg("build")
        .assert()
        .success()
        .stderr(predicate::str::contains("index.js"))
        .stderr(predicate::str::contains("Built 1 entry"));

    assert!(dir.path().join("dist/index.js").is_file());
}

#[test]
fn build_json_reports_every_file() {
    let dir = package(MINIMAL, &[("src/index.ts", SOURCE)]);

    let output = packem(dir.path())
        .args(["build", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let record = &json["report"]["records"]["index.js"];
    assert_eq!(record["type"], "entry");
    assert!(record["bytes"].as_u64().unwrap() > 0);
    assert_eq!(json["warnings"], serde_json::json!([]));
    assert_eq!(json["tasks"][0]["label"], "default:cjs");
}

#[test]
fn root_flag_selects_the_package() {
    let dir = package(MINIMAL, &[("src/index.ts", SOURCE)]);
    let elsewhere = TempDir::new().unwrap();

    packem(elsewhere.path())
        .args(["build", "--root"])
        .arg(dir.path())
        .assert()
        .success();

    assert!(dir.path().join("dist/index.js").is_file());
    assert!(!elsewhere.path().join("dist").exists());
}

#[test]
fn entries_lists_inferred_entries_as_json() {
    let dir = package(
        r#"{ "name": "dual", "type": "module", "exports": { "import": "./dist/index.mjs", "require": "./dist/index.cjs" } }"#,
        &[("src/index.ts", SOURCE)],
    );

    let output = packem(dir.path())
        .args(["entries", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "index");
    assert_eq!(entries[0]["cjs"], true);
    assert_eq!(entries[0]["esm"], true);
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn entries_table_has_a_header() {
    let dir = package(MINIMAL, &[("src/index.ts", SOURCE)]);

    packem(dir.path())
        .arg("entries")
        .assert()
        .success()
        .stdout(predicate::str::contains("name"))
        .stdout(predicate::str::contains("src/index.ts"));
}

#[test]
fn missing_manifest_fails() {
    let dir = TempDir::new().unwrap();

    packem(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("package.json"));
}

#[test]
fn conflicting_fields_fail_without_output() {
    let dir = package(
        r#"{ "name": "conflict", "main": "./dist/index.js", "module": "./dist/index.js" }"#,
        &[("src/index.ts", SOURCE)],
    );

    packem(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Conflicting field \"module\""));

    assert!(!dir.path().join("dist").exists());
}

#[test]
fn unused_dependency_fails_unless_warnings_are_allowed() {
    let dir = package(
        r#"{ "name": "deps", "main": "./dist/index.js", "dependencies": { "left-pad": "^1.0.0" } }"#,
        &[("src/index.ts", SOURCE)],
    );

    packem(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 warning(s)"));

    packem(dir.path())
        .args(["build", "--no-fail-on-warn"])
        .assert()
        .success()
        .stderr(predicate::str::contains("left-pad"));
}

#[test]
fn unknown_config_fields_are_rejected() {
    let dir = package(MINIMAL, &[("src/index.ts", SOURCE)]);
    fs::write(dir.path().join("packem.config.json"), r#"{ "entry": "src/index.ts" }"#).unwrap();

    packem(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn on_success_requires_watch() {
    let dir = TempDir::new().unwrap();

    packem(dir.path())
        .args(["build", "--on-success", "echo done"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--watch"));
}

#[cfg(not(feature = "rolldown"))]
#[test]
fn rolldown_needs_the_feature() {
    let dir = package(MINIMAL, &[("src/index.ts", SOURCE)]);

    packem(dir.path())
        .args(["build", "--bundler", "rolldown"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid argument"));
}
