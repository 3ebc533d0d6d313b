//! Layered option loading.
//!
//! Priority, lowest to highest:
//!
//! 1. [`BuildOptions::default`]
//! 2. `packem.config.json` (or `--config`)
//! 3. the `"packem"` key of `package.json`
//! 4. `PACKEM_*` environment variables
//! 5. command-line flags
//!
//! Environment keys are snake case; `__` separates nested keys, so
//! `PACKEM_OUT_DIR=lib` sets `outDir` and
//! `PACKEM_VALIDATION__PACKAGE_JSON=false` sets `validation.packageJson`.

use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized},
};
use packem::BuildOptions;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::ProjectArgs;
use crate::error::{ConfigError, Result};

pub const CONFIG_FILE: &str = "packem.config.json";
pub const ENV_PREFIX: &str = "PACKEM_";

/// Command-line flags that override every other layer. Unset fields leave
/// the lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_on_warn: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,
}

/// Resolve the package root from `--root` and the working directory.
pub fn resolve_root(project: &ProjectArgs) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(match &project.root {
        Some(root) if root.is_absolute() => root.clone(),
        Some(root) => cwd.join(root),
        None => cwd,
    })
}

/// Load options for the package selected by `project`.
pub fn load(project: &ProjectArgs, overrides: &Overrides) -> Result<BuildOptions> {
    let root = resolve_root(project)?;
    let mut figment = Figment::new().merge(Serialized::defaults(BuildOptions::default()));

    if let Some(path) = config_file(project, &root)? {
        tracing::debug!(path = %path.display(), "loading config file");
        figment = figment.merge(Json::file(path));
    }

    if let Some(section) = package_section(&root)? {
        tracing::debug!("loading \"packem\" key of package.json");
        figment = figment.merge(Serialized::defaults(section));
    }

    figment = figment
        .merge(
            Env::prefixed(ENV_PREFIX)
                .map(|key| env_key(key.as_str()).into())
                .lowercase(false),
        )
        .merge(Serialized::defaults(overrides));

    let mut options: BuildOptions = figment
        .extract()
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    options.root_dir = Some(root);
    Ok(options)
}

/// `--config` relative to the working directory, or `packem.config.json`
/// in the root when it exists.
fn config_file(project: &ProjectArgs, root: &Path) -> Result<Option<PathBuf>> {
    match &project.config {
        Some(path) => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                std::env::current_dir()?.join(path)
            };
            if !path.is_file() {
                return Err(ConfigError::NotFound(path).into());
            }
            Ok(Some(path))
        }
        None => {
            let default = root.join(CONFIG_FILE);
            Ok(default.is_file().then_some(default))
        }
    }
}

/// The `"packem"` object of `package.json`, if any. A missing manifest is
/// left for the build to report.
#[allow(clippy::disallowed_methods)]
fn package_section(root: &Path) -> Result<Option<serde_json::Value>> {
    let path = root.join("package.json");
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ConfigError::Io(e).into()),
    };
    let mut manifest: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|source| ConfigError::InvalidJson { path, source })?;
    Ok(manifest
        .get_mut("packem")
        .map(serde_json::Value::take)
        .filter(serde_json::Value::is_object))
}

/// `OUT_DIR` -> `outDir`, `VALIDATION__PACKAGE_JSON` -> `validation.packageJson`.
fn env_key(key: &str) -> String {
    key.split("__")
        .map(|segment| {
            let mut out = String::with_capacity(segment.len());
            let mut upper = false;
            for c in segment.chars() {
                if c == '_' {
                    upper = true;
                } else if upper {
                    out.push(c.to_ascii_uppercase());
                    upper = false;
                } else {
                    out.push(c.to_ascii_lowercase());
                }
            }
            match out.as_str() {
                "emitCjs" => "emitCJS".to_string(),
                "emitEsm" => "emitESM".to_string(),
                _ => out,
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn project(dir: &TempDir) -> ProjectArgs {
        ProjectArgs {
            root: Some(dir.path().to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn env_keys_become_camel_case_paths() {
        assert_eq!(env_key("OUT_DIR"), "outDir");
        assert_eq!(env_key("minify"), "minify");
        assert_eq!(env_key("VALIDATION__PACKAGE_JSON"), "validation.packageJson");
        assert_eq!(env_key("EMIT_CJS"), "emitCJS");
    }

    #[test]
    #[serial]
    fn defaults_without_any_layer() {
        let dir = TempDir::new().unwrap();
        let options = load(&project(&dir), &Overrides::default()).unwrap();

        assert_eq!(options.out_dir, PathBuf::from("dist"));
        assert!(options.clean);
        assert!(options.fail_on_warn);
        assert_eq!(options.root_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    #[serial]
    fn layers_apply_in_priority_order() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "outDir": "file-dist", "sourceDir": "lib", "sourcemap": true }"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "x", "packem": { "sourceDir": "pkg-src", "cjsInterop": true } }"#,
        )
        .unwrap();

        let overrides = Overrides {
            out_dir: Some(PathBuf::from("cli-dist")),
            ..Default::default()
        };
        let options = load(&project(&dir), &overrides).unwrap();

        assert_eq!(options.out_dir, PathBuf::from("cli-dist"));
        assert_eq!(options.source_dir, PathBuf::from("pkg-src"));
        assert!(options.sourcemap);
        assert!(options.cjs_interop);
    }

    #[test]
    #[serial]
    fn environment_overrides_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{ "outDir": "file-dist" }"#).unwrap();

        // SAFETY: serialized with every other env-reading test.
        unsafe {
            std::env::set_var("PACKEM_OUT_DIR", "env-dist");
            std::env::set_var("PACKEM_VALIDATION__PACKAGE_JSON", "false");
        }
        let result = load(&project(&dir), &Overrides::default());
        unsafe {
            std::env::remove_var("PACKEM_OUT_DIR");
            std::env::remove_var("PACKEM_VALIDATION__PACKAGE_JSON");
        }

        let options = result.unwrap();
        assert_eq!(options.out_dir, PathBuf::from("env-dist"));
        assert!(!options.validation.package_json);
        assert!(options.validation.dependencies);
    }

    #[test]
    #[serial]
    fn explicit_config_must_exist() {
        let dir = TempDir::new().unwrap();
        let args = ProjectArgs {
            config: Some(dir.path().join("missing.json")),
            ..project(&dir)
        };

        let err = load(&args, &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    #[serial]
    fn unknown_fields_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{ "entry": ["src/index.ts"] }"#).unwrap();

        let err = load(&project(&dir), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("entry"), "{err}");
    }
}
