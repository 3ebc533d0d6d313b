//! `tsconfig.json` loading.
//!
//! Only the handful of compiler options the orchestrator cares about are
//! read. Files are JSONC; relative `extends` chains are followed.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::options::{BuildOptions, default_out_dir, default_source_dir};
use crate::runtime::Runtime;
use crate::{Error, Result};

const MAX_EXTENDS_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTsConfig {
    extends: Option<String>,
    #[serde(default)]
    compiler_options: CompilerOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    pub out_dir: Option<String>,
    pub root_dir: Option<String>,
    pub target: Option<String>,
    pub jsx: Option<String>,
    pub declaration: Option<bool>,
}

impl CompilerOptions {
    /// Fill unset fields from `base`.
    fn inherit(&mut self, base: CompilerOptions) {
        self.out_dir = self.out_dir.take().or(base.out_dir);
        self.root_dir = self.root_dir.take().or(base.root_dir);
        self.target = self.target.take().or(base.target);
        self.jsx = self.jsx.take().or(base.jsx);
        self.declaration = self.declaration.or(base.declaration);
    }
}

/// The resolved compiler options of one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsConfig {
    pub path: PathBuf,
    /// `outDir`, relative to the directory of `path`.
    pub out_dir: Option<String>,
    pub root_dir: Option<String>,
    /// Lowercased `target`, e.g. `es2022`.
    pub target: Option<String>,
    pub jsx: Option<String>,
    pub declaration: Option<bool>,
}

impl TsConfig {
    /// Load `explicit`, or `<root>/tsconfig.json` when it exists.
    pub async fn discover(
        runtime: &dyn Runtime,
        root: &Path,
        explicit: Option<&Path>,
    ) -> Result<Option<Self>> {
        let path = match explicit {
            Some(path) => root.join(path),
            None => {
                let default = root.join("tsconfig.json");
                if !runtime.is_file(&default) {
                    return Ok(None);
                }
                default
            }
        };
        Self::load(runtime, &path).await.map(Some)
    }

    pub async fn load(runtime: &dyn Runtime, path: &Path) -> Result<Self> {
        let mut options = CompilerOptions::default();
        let mut current = path.to_path_buf();

        for _ in 0..MAX_EXTENDS_DEPTH {
            let raw = read_raw(runtime, &current).await?;
            options.inherit(raw.compiler_options);

            let Some(extends) = raw.extends.filter(|e| e.starts_with('.')) else {
                break;
            };
            let parent = current.parent().unwrap_or(Path::new(""));
            let mut next = parent.join(&extends);
            if next.extension().is_none() {
                next.set_extension("json");
            }
            tracing::debug!(from = %current.display(), to = %next.display(), "following tsconfig extends");
            current = next;
        }

        Ok(Self {
            path: path.to_path_buf(),
            out_dir: options.out_dir,
            root_dir: options.root_dir,
            target: options.target.map(|t| t.to_ascii_lowercase()),
            jsx: options.jsx,
            declaration: options.declaration,
        })
    }

    /// Parse a single config file without following `extends`.
    pub fn parse(text: &str) -> Result<CompilerOptions> {
        parse_raw(text, Path::new("tsconfig.json")).map(|raw| raw.compiler_options)
    }

    /// Use `outDir`/`rootDir`/`declaration` where the options still hold
    /// their defaults.
    pub fn apply_defaults(&self, options: &mut BuildOptions) {
        let base = self.path.parent().unwrap_or(Path::new(""));
        let root = options.root_dir.clone().unwrap_or_default();

        if options.out_dir == default_out_dir() {
            if let Some(out_dir) = &self.out_dir {
                options.out_dir = relative_to(&root, &base.join(out_dir));
            }
        }
        if options.source_dir == default_source_dir() {
            if let Some(root_dir) = &self.root_dir {
                options.source_dir = relative_to(&root, &base.join(root_dir));
            }
        }
        if options.declaration.is_none() {
            options.declaration = self.declaration;
        }
    }
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    let cleaned = path_clean::clean(path);
    cleaned
        .strip_prefix(path_clean::clean(root))
        .map(Path::to_path_buf)
        .unwrap_or(cleaned)
}

async fn read_raw(runtime: &dyn Runtime, path: &Path) -> Result<RawTsConfig> {
    let bytes = runtime.read_file(path).await.map_err(|_| {
        Error::not_found(format!("Could not read \"{}\".", path.display()), path)
    })?;
    let text = String::from_utf8_lossy(&bytes);
    parse_raw(&text, path)
}

fn parse_raw(text: &str, path: &Path) -> Result<RawTsConfig> {
    let value = jsonc_parser::parse_to_serde_value::<Option<serde_json::Value>>(text, &Default::default())
        .map_err(|e| Error::config(format!("Invalid JSON in \"{}\": {e}", path.display())))?
        .unwrap_or(serde_json::Value::Object(Default::default()));
    serde_json::from_value(value)
        .map_err(|e| Error::config(format!("Invalid \"{}\": {e}", path.display())))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::runtime::NativeRuntime;
    use tempfile::TempDir;

    #[test]
    fn parses_jsonc_with_comments_and_trailing_commas() {
        let options = TsConfig::parse(
            r#"{
                // build output
                "compilerOptions": {
                    "outDir": "./lib",
                    "target": "ES2022",
                    "jsx": "react-jsx",
                },
            }"#,
        )
        .unwrap();
        assert_eq!(options.out_dir.as_deref(), Some("./lib"));
        assert_eq!(options.target.as_deref(), Some("ES2022"));
        assert_eq!(options.jsx.as_deref(), Some("react-jsx"));
    }

    #[test]
    fn invalid_jsonc_is_a_config_error() {
        let err = TsConfig::parse("{ \"compilerOptions\": ").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn follows_relative_extends() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("tsconfig.base.json"),
            r#"{ "compilerOptions": { "target": "ES2020", "jsx": "preserve" } }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("tsconfig.json"),
            r#"{ "extends": "./tsconfig.base", "compilerOptions": { "jsx": "react-jsx" } }"#,
        )
        .unwrap();

        let runtime = NativeRuntime::new();
        let config = TsConfig::discover(&runtime, dir.path(), None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(config.target.as_deref(), Some("es2020"));
        assert_eq!(config.jsx.as_deref(), Some("react-jsx"));
    }

    #[tokio::test]
    async fn missing_default_tsconfig_is_none() {
        let dir = TempDir::new().unwrap();
        let runtime = NativeRuntime::new();
        assert!(
            TsConfig::discover(&runtime, dir.path(), None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn out_dir_applies_only_over_defaults() {
        let config = TsConfig {
            path: PathBuf::from("/p/tsconfig.json"),
            out_dir: Some("./lib".to_string()),
            root_dir: Some("./source".to_string()),
            ..Default::default()
        };

        let mut options = BuildOptions {
            root_dir: Some(PathBuf::from("/p")),
            ..Default::default()
        };
        config.apply_defaults(&mut options);
        assert_eq!(options.out_dir, PathBuf::from("lib"));
        assert_eq!(options.source_dir, PathBuf::from("source"));

        let mut explicit = BuildOptions {
            root_dir: Some(PathBuf::from("/p")),
            out_dir: PathBuf::from("build"),
            ..Default::default()
        };
        config.apply_defaults(&mut explicit);
        assert_eq!(explicit.out_dir, PathBuf::from("build"));
    }
}
