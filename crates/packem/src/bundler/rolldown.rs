//! Full bundling through Rolldown.
//!
//! One Rolldown invocation per format of a task. Entry chunks are named
//! `[name]<ext>` so they land on the planned file names; shared chunks go to
//! `_chunks/`. Declarations are delegated to the transpile adapter.

use async_trait::async_trait;
use rolldown::{
    BundlerBuilder, BundlerOptions, InputItem, IsExternal, OutputFormat, Platform,
    RawMinifyOptions, ResolveOptions, SourceMapType,
};
use rolldown_common::Output;
use rustc_hash::FxHashSet;
use std::path::Path;

use super::{BundleOutput, Bundler, ModuleSize, OutputAsset, OutputChunk, TranspileBundler};
use crate::diagnostics::BundlerError;
use crate::entry::{ModuleFormat, TargetRuntime};
use crate::group::{BuildTask, NODE_BUILTINS};
use crate::options::relative_slash;

#[derive(Debug, Clone, Default)]
pub struct RolldownBundler {
    declarations: TranspileBundler,
}

impl RolldownBundler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter used for `.d.ts` emission.
    pub fn with_declarations(mut self, declarations: TranspileBundler) -> Self {
        self.declarations = declarations;
        self
    }
}

#[async_trait]
impl Bundler for RolldownBundler {
    fn name(&self) -> &str {
        "rolldown"
    }

    async fn bundle(&self, task: &BuildTask) -> Result<BundleOutput, BundlerError> {
        let mut output = BundleOutput::default();
        for format in task.formats() {
            let generated = generate(task, format).await?;
            output.chunks.extend(generated.chunks);
            output.assets.extend(generated.assets);
            output.warnings.extend(generated.warnings);
        }
        Ok(output)
    }

    async fn emit_declarations(&self, task: &BuildTask) -> Result<BundleOutput, BundlerError> {
        self.declarations.emit_declarations(task).await
    }
}

async fn generate(task: &BuildTask, format: ModuleFormat) -> Result<BundleOutput, BundlerError> {
    let label = task.label();
    let options = configure(task, format);

    let mut bundler = BundlerBuilder::default()
        .with_options(options)
        .build()
        .map_err(|e| BundlerError::from_message(&label, &format!("{e:?}")))?;
    let bundle = bundler
        .generate()
        .await
        .map_err(|e| BundlerError::from_message(&label, &format!("{e:?}")))?;

    let chunk_names: FxHashSet<String> = bundle
        .assets
        .iter()
        .filter_map(|output| match output {
            Output::Chunk(chunk) => Some(chunk.filename.to_string()),
            Output::Asset(_) => None,
        })
        .collect();

    let mut output = BundleOutput {
        warnings: bundle
            .warnings
            .iter()
            .map(|warning| first_line(&format!("{warning:?}")))
            .collect(),
        ..Default::default()
    };

    for item in &bundle.assets {
        match item {
            Output::Chunk(chunk) => {
                let (imports, external_imports): (Vec<String>, Vec<String>) = chunk
                    .imports
                    .iter()
                    .map(|import| import.to_string())
                    .partition(|import| chunk_names.contains(import));

                output.chunks.push(OutputChunk {
                    file_name: chunk.filename.to_string(),
                    code: chunk.code.clone(),
                    is_entry: chunk.is_entry,
                    name: Some(chunk.name.to_string()),
                    imports,
                    external_imports,
                    exports: chunk.exports.iter().map(|e| e.to_string()).collect(),
                    modules: chunk
                        .modules
                        .keys
                        .iter()
                        .zip(chunk.modules.values.iter())
                        .map(|(id, module)| ModuleSize {
                            id: relative_slash(&task.root_dir, Path::new(&id.to_string())),
                            bytes: module.code().map_or(0, |code| code.len() as u64),
                        })
                        .collect(),
                });
            }
            Output::Asset(asset) => {
                output.assets.push(OutputAsset::new(
                    asset.filename.to_string(),
                    asset.source.as_bytes().to_vec(),
                ));
            }
        }
    }

    tracing::debug!(
        task = %label,
        format = %format,
        chunks = output.chunks.len(),
        assets = output.assets.len(),
        "rolldown generated"
    );
    Ok(output)
}

fn configure(task: &BuildTask, format: ModuleFormat) -> BundlerOptions {
    // Entries of one bucket share an extension per format.
    let extension = task
        .entries
        .iter()
        .find_map(|e| e.output_for(format))
        .map(|planned| planned.extension.clone())
        .unwrap_or_else(|| ".js".to_string());

    let input = task
        .entries
        .iter()
        .filter(|e| e.output_for(format).is_some())
        .map(|e| InputItem {
            name: Some(e.entry.output_stem().to_string()),
            import: e.entry.input.to_string_lossy().into_owned(),
        })
        .collect();

    BundlerOptions {
        input: Some(input),
        cwd: Some(task.root_dir.clone()),
        format: Some(match format {
            ModuleFormat::Esm => OutputFormat::Esm,
            ModuleFormat::Cjs => OutputFormat::Cjs,
        }),
        platform: Some(match task.group.runtime {
            Some(TargetRuntime::EdgeLight) => Platform::Browser,
            Some(TargetRuntime::Node) | None => Platform::Node,
        }),
        external: Some(IsExternal::from(externals(task))),
        sourcemap: task.sourcemap.then_some(SourceMapType::File),
        minify: task.minify.then(|| RawMinifyOptions::from(true)),
        define: Some(
            task.define
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        entry_filenames: Some(format!("[name]{extension}").into()),
        chunk_filenames: Some(format!("_chunks/[name]-[hash]{extension}").into()),
        resolve: Some(ResolveOptions {
            alias: (!task.alias.is_empty()).then(|| {
                task.alias
                    .iter()
                    .map(|(key, target)| {
                        let target = task.root_dir.join(target);
                        (key.clone(), vec![Some(target.to_string_lossy().into_owned())])
                    })
                    .collect()
            }),
            condition_names: Some(task.conditions(format)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Exact specifiers Rolldown keeps external.
fn externals(task: &BuildTask) -> Vec<String> {
    let mut externals = task.externals.clone();
    for builtin in NODE_BUILTINS {
        externals.push(builtin.to_string());
        externals.push(format!("node:{builtin}"));
    }
    externals
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(text)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::BuildEntry;
    use crate::group::{PlanContext, plan_tasks};
    use crate::options::{BuildOptions, ResolvedPaths};
    use crate::package_json::PackageType;

    fn task(entries: Vec<BuildEntry>) -> BuildTask {
        let options = BuildOptions::default();
        let paths = ResolvedPaths::new(Path::new("/p"), &options);
        plan_tasks(
            &entries,
            &PlanContext {
                options: &options,
                paths: &paths,
                package_type: PackageType::Module,
                externals: vec!["react".to_string()],
                tsconfig: None,
            },
        )
        .remove(0)
    }

    #[test]
    fn entry_names_follow_planned_files() {
        let task = task(vec![
            BuildEntry::new("/p/src/index.ts", "index").with_esm(true),
            BuildEntry::new("/p/src/utils/index.ts", "utils/index").with_esm(true),
        ]);

        let options = configure(&task, ModuleFormat::Esm);

        let input = options.input.unwrap();
        assert_eq!(input.len(), 2);
        assert_eq!(input[1].name.as_deref(), Some("utils/index"));
        assert_eq!(input[1].import, "/p/src/utils/index.ts");
    }

    #[test]
    fn externals_include_builtins_and_dependencies() {
        let task = task(vec![BuildEntry::new("/p/src/index.ts", "index").with_esm(true)]);
        let externals = externals(&task);
        assert!(externals.contains(&"react".to_string()));
        assert!(externals.contains(&"node:fs".to_string()));
        assert!(externals.contains(&"path".to_string()));
    }
}
