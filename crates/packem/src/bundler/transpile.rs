//! Per-file transpilation through oxc.
//!
//! Every entry, and every relative module it reaches, is transpiled on its
//! own and written next to the entry. Bare imports stay external. ESM output
//! is the transformer's output with relative specifiers pointing at the
//! emitted files; CommonJS output rewrites the top-level module syntax into
//! `require` and `exports`.
//!
//! ```text
//! source -> parse -> semantic -> transform -> codegen -> defines
//!        -> link (rewrite specifiers, ESM or CJS) -> optional minify
//! ```
//!
//! Declarations go through `oxc_isolated_declarations`, so sources must
//! satisfy `isolatedDeclarations`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPatternKind, Declaration, ExportDefaultDeclarationKind, ImportDeclarationSpecifier,
    ModuleDeclaration, ModuleExportName, Program,
};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_isolated_declarations::{IsolatedDeclarations, IsolatedDeclarationsOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::{GetSpan, SourceType, Span};
use oxc_transformer::{JsxRuntime, TransformOptions, Transformer};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::runtime::Handle;

use super::{BundleOutput, Bundler, ModuleSize, OutputAsset, OutputChunk};
use crate::diagnostics::BundlerError;
use crate::entry::ModuleFormat;
use crate::group::{BuildTask, is_node_builtin};
use crate::options::relative_slash;
use crate::package_json::is_bare_specifier;
use crate::runtime::{NativeRuntime, Runtime};

/// Extensions tried, in order, for extensionless relative imports.
const RESOLVE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mts", ".cts", ".js", ".jsx", ".mjs", ".cjs"];

const INTEROP_DEFAULT: &str =
    "function __interopDefault(m) { return m && m.__esModule ? m.default : m; }\n";
const REEXPORT: &str = "function __reexport(target, m) { for (const k in m) if (k !== \"default\" && !Object.prototype.hasOwnProperty.call(target, k)) Object.defineProperty(target, k, { enumerable: true, get: () => m[k] }); }\n";

/// Transpile-only adapter. Fast, no tree shaking, no dependency inlining.
///
/// Sources are read through a [`Runtime`]; [`NativeRuntime`] unless
/// [`TranspileBundler::with_runtime`] says otherwise.
#[derive(Debug, Clone)]
pub struct TranspileBundler {
    strip_internal: bool,
    runtime: Arc<dyn Runtime>,
}

impl Default for TranspileBundler {
    fn default() -> Self {
        Self {
            strip_internal: false,
            runtime: Arc::new(NativeRuntime::new()),
        }
    }
}

impl TranspileBundler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read sources through `runtime`.
    pub fn with_runtime(mut self, runtime: Arc<dyn Runtime>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Drop declarations tagged `@internal` from emitted `.d.ts` files.
    pub fn strip_internal(mut self, strip: bool) -> Self {
        self.strip_internal = strip;
        self
    }
}

#[async_trait]
impl Bundler for TranspileBundler {
    fn name(&self) -> &str {
        "transpile"
    }

    async fn bundle(&self, task: &BuildTask) -> Result<BundleOutput, BundlerError> {
        let task = task.clone();
        let sources = self.sources();
        blocking(task.label(), move || transpile_task(&task, &sources)).await
    }

    async fn emit_declarations(&self, task: &BuildTask) -> Result<BundleOutput, BundlerError> {
        let task = task.clone();
        let sources = self.sources();
        let strip_internal = self.strip_internal;
        blocking(task.label(), move || {
            declaration_task(&task, &sources, strip_internal)
        })
        .await
    }
}

impl TranspileBundler {
    fn sources(&self) -> SourceReader {
        SourceReader {
            runtime: Arc::clone(&self.runtime),
            handle: Handle::current(),
        }
    }
}

/// Reads sources through the runtime from a blocking worker thread.
struct SourceReader {
    runtime: Arc<dyn Runtime>,
    handle: Handle,
}

impl SourceReader {
    fn read(&self, task: &BuildTask, path: &Path) -> Result<String, BundlerError> {
        let failed = |reason: String| {
            BundlerError::new(task.label(), format!("Failed to read {}: {reason}", path.display()))
        };
        let bytes = self
            .handle
            .block_on(self.runtime.read_file(path))
            .map_err(|e| failed(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| failed(e.to_string()))
    }
}

async fn blocking<F>(label: String, work: F) -> Result<BundleOutput, BundlerError>
where
    F: FnOnce() -> Result<BundleOutput, BundlerError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BundlerError::new(label, format!("Transpile worker failed: {e}")))?
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Esm,
    Cjs,
    Declaration,
}

/// One file to emit: a source module under an output name.
#[derive(Debug, Clone)]
struct Unit {
    path: PathBuf,
    file_name: String,
    entry_name: Option<String>,
}

#[derive(Debug, Default)]
struct Linked {
    code: String,
    imports: Vec<String>,
    external_imports: Vec<String>,
    exports: Vec<String>,
}

fn transpile_task(task: &BuildTask, sources: &SourceReader) -> Result<BundleOutput, BundlerError> {
    let mut output = BundleOutput::default();
    if task.sourcemap {
        output.warnings.push(format!(
            "Source maps are not emitted by the transpile adapter ({}).",
            task.label()
        ));
    }

    let defines = Defines::new(&task.define);
    let mut compiled: FxHashMap<PathBuf, (String, u64)> = FxHashMap::default();

    for format in task.formats() {
        let mode = match format {
            ModuleFormat::Esm => Mode::Esm,
            ModuleFormat::Cjs => Mode::Cjs,
        };
        let mut walker = Walker::new(task, mode, format);

        while let Some(unit) = walker.queue.pop_front() {
            let (code, source_bytes) = match compiled.get(&unit.path) {
                Some(cached) => cached.clone(),
                None => {
                    let source = sources.read(task, &unit.path)?;
                    let code = defines.apply(compile(task, &unit.path, &source)?);
                    let value = (code, source.len() as u64);
                    compiled.insert(unit.path.clone(), value.clone());
                    value
                }
            };

            let mut linked = walker.link(&unit, &code)?;
            if task.minify {
                linked.code = minify(task, &unit, mode, &linked.code)?;
            }

            output.chunks.push(OutputChunk {
                file_name: unit.file_name.clone(),
                code: linked.code,
                is_entry: unit.entry_name.is_some(),
                name: unit.entry_name.clone(),
                imports: linked.imports,
                external_imports: linked.external_imports,
                exports: linked.exports,
                modules: vec![ModuleSize {
                    id: module_id(task, &unit.path),
                    bytes: source_bytes,
                }],
            });
        }
        output.warnings.append(&mut walker.warnings);
    }

    Ok(output)
}

fn declaration_task(
    task: &BuildTask,
    sources: &SourceReader,
    strip_internal: bool,
) -> Result<BundleOutput, BundlerError> {
    let mut output = BundleOutput::default();
    let mut generated: FxHashMap<PathBuf, String> = FxHashMap::default();

    for format in task.formats() {
        let mut walker = Walker::new(task, Mode::Declaration, format);
        while let Some(unit) = walker.queue.pop_front() {
            if !is_typescript(&unit.path) {
                walker.warnings.push(format!(
                    "Cannot emit declarations for \"{}\": not a TypeScript source.",
                    module_id(task, &unit.path)
                ));
                continue;
            }
            let dts = match generated.get(&unit.path) {
                Some(dts) => dts.clone(),
                None => {
                    let source = sources.read(task, &unit.path)?;
                    let dts = isolated_declarations(task, &unit.path, &source, strip_internal)?;
                    generated.insert(unit.path.clone(), dts.clone());
                    dts
                }
            };
            let linked = walker.link(&unit, &dts)?;
            output
                .assets
                .push(OutputAsset::new(unit.file_name.clone(), linked.code));
        }
        output.warnings.append(&mut walker.warnings);
    }

    Ok(output)
}

fn module_id(task: &BuildTask, path: &Path) -> String {
    relative_slash(&task.root_dir, path)
}

fn is_typescript(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ts" | "tsx" | "mts" | "cts")
    )
}

fn source_type(task: &BuildTask, path: &Path) -> Result<SourceType, BundlerError> {
    SourceType::from_path(path).map_err(|_| {
        BundlerError::new(
            task.label(),
            format!("Unsupported source file \"{}\".", module_id(task, path)),
        )
    })
}

/// Error at a byte offset of `source`, with location and code frame.
fn located(task: &BuildTask, path: &Path, source: &str, message: String, offset: Option<usize>) -> BundlerError {
    let mut error = BundlerError::new(task.label(), message);
    error.file = Some(module_id(task, path));
    if let Some(offset) = offset.filter(|o| *o <= source.len()) {
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let column = before.rfind('\n').map_or(offset, |n| offset - n - 1) + 1;
        error.line = u32::try_from(line).ok();
        error.column = u32::try_from(column).ok();
        error.attach_code_frame(source);
    }
    error
}

fn transform_options(task: &BuildTask) -> Result<TransformOptions, BundlerError> {
    let mut options = match &task.target {
        Some(target) => TransformOptions::from_target(target).map_err(|e| {
            BundlerError::new(task.label(), format!("Unsupported target \"{target}\": {e}"))
        })?,
        None => TransformOptions::default(),
    };
    match task.jsx.as_deref() {
        Some("react") => options.jsx.runtime = JsxRuntime::Classic,
        Some("react-jsxdev") => {
            options.jsx.runtime = JsxRuntime::Automatic;
            options.jsx.development = true;
        }
        _ => options.jsx.runtime = JsxRuntime::Automatic,
    }
    Ok(options)
}

/// TypeScript and JSX to plain ESM.
fn compile(task: &BuildTask, path: &Path, source: &str) -> Result<String, BundlerError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, source_type(task, path)?).parse();
    if let Some(error) = parsed.errors.first() {
        let offset = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset());
        return Err(located(task, path, source, error.to_string(), offset));
    }

    let mut program = parsed.program;
    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    let options = transform_options(task)?;
    let transformed =
        Transformer::new(&allocator, path, &options).build_with_scoping(scoping, &mut program);
    if let Some(error) = transformed.errors.first() {
        let offset = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset());
        return Err(located(task, path, source, error.to_string(), offset));
    }

    Ok(Codegen::new().build(&program).code)
}

fn isolated_declarations(
    task: &BuildTask,
    path: &Path,
    source: &str,
    strip_internal: bool,
) -> Result<String, BundlerError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, source_type(task, path)?).parse();
    if let Some(error) = parsed.errors.first() {
        let offset = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset());
        return Err(located(task, path, source, error.to_string(), offset));
    }

    let declarations = IsolatedDeclarations::new(&allocator, IsolatedDeclarationsOptions { strip_internal })
        .build(&parsed.program);
    if let Some(error) = declarations.errors.first() {
        let offset = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset());
        return Err(located(task, path, source, error.to_string(), offset)
            .with_help("Declarations are generated per file; exported functions and values need explicit type annotations."));
    }

    Ok(Codegen::new().build(&declarations.program).code)
}

/// Whitespace-only minification: reprint the linked module compactly.
fn minify(task: &BuildTask, unit: &Unit, mode: Mode, code: &str) -> Result<String, BundlerError> {
    let allocator = Allocator::default();
    let source_type = match mode {
        Mode::Cjs => SourceType::cjs(),
        Mode::Esm | Mode::Declaration => SourceType::mjs(),
    };
    let parsed = Parser::new(&allocator, code, source_type).parse();
    if let Some(error) = parsed.errors.first() {
        return Err(BundlerError::new(
            task.label(),
            format!("Failed to minify \"{}\": {error}", unit.file_name),
        ));
    }
    Ok(Codegen::new()
        .with_options(CodegenOptions::minify())
        .build(&parsed.program)
        .code)
}

/// Compiled global replacements.
struct Defines(Vec<(Regex, String)>);

impl Defines {
    fn new(define: &IndexMap<String, String>) -> Self {
        Self(
            define
                .iter()
                .filter_map(|(key, value)| {
                    let pattern = format!(r"(^|[^\w$.]){}($|[^\w$])", regex::escape(key));
                    Regex::new(&pattern)
                        .ok()
                        .map(|re| (re, format!("${{1}}{value}${{2}}")))
                })
                .collect(),
        )
    }

    fn apply(&self, code: String) -> String {
        self.0.iter().fold(code, |code, (re, replacement)| {
            re.replace_all(&code, replacement.as_str()).into_owned()
        })
    }
}

enum Resolved {
    /// Another module of this task, under its output name.
    Module(String),
    External(String),
    Verbatim,
}

/// Walks the relative import graph of a task's entries for one format.
struct Walker<'t> {
    task: &'t BuildTask,
    mode: Mode,
    /// Extension for modules that are not entries themselves.
    extension: String,
    names: FxHashMap<PathBuf, String>,
    taken: FxHashSet<String>,
    queue: VecDeque<Unit>,
    warnings: Vec<String>,
}

impl<'t> Walker<'t> {
    fn new(task: &'t BuildTask, mode: Mode, format: ModuleFormat) -> Self {
        let mut walker = Self {
            task,
            mode,
            extension: String::new(),
            names: FxHashMap::default(),
            taken: FxHashSet::default(),
            queue: VecDeque::new(),
            warnings: Vec::new(),
        };

        for task_entry in &task.entries {
            let Some(planned) = task_entry.output_for(format) else {
                continue;
            };
            if walker.extension.is_empty() {
                walker.extension = planned.extension.clone();
            }
            let file_name = task_entry.file_name(planned);
            if !walker.taken.insert(file_name.clone()) {
                continue;
            }
            walker
                .names
                .entry(task_entry.entry.input.clone())
                .or_insert_with(|| file_name.clone());
            walker.queue.push_back(Unit {
                path: task_entry.entry.input.clone(),
                file_name,
                entry_name: Some(task_entry.entry.name.clone()),
            });
        }
        walker
    }

    /// Output name of `path`, queuing it the first time it is seen.
    fn name_for(&mut self, path: &Path) -> String {
        if let Some(name) = self.names.get(path) {
            return name.clone();
        }

        let stem = match path.strip_prefix(&self.task.source_dir) {
            Ok(relative) => strip_extension(&relative_slash(Path::new(""), relative)),
            Err(_) => format!(
                "_chunks/{}",
                path.file_stem().and_then(|s| s.to_str()).unwrap_or("module")
            ),
        };
        let mut candidate = format!("{stem}{}", self.extension);
        let mut counter = 1;
        while self.taken.contains(&candidate) {
            counter += 1;
            candidate = format!("{stem}-{counter}{}", self.extension);
        }

        self.taken.insert(candidate.clone());
        self.names.insert(path.to_path_buf(), candidate.clone());
        self.queue.push_back(Unit {
            path: path.to_path_buf(),
            file_name: candidate.clone(),
            entry_name: None,
        });
        candidate
    }

    fn resolve(&mut self, unit: &Unit, specifier: &str) -> Result<Resolved, BundlerError> {
        let base = if let Some(aliased) = self.alias(specifier) {
            aliased
        } else if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." {
            match unit.path.parent() {
                Some(dir) => dir.join(specifier),
                None => return Ok(Resolved::Verbatim),
            }
        } else if is_bare_specifier(specifier) || is_node_builtin(specifier) {
            return Ok(Resolved::External(specifier.to_string()));
        } else {
            return Ok(Resolved::Verbatim);
        };

        let base = path_clean::clean(base);
        match resolve_module(&base) {
            Some(path) => Ok(Resolved::Module(self.name_for(&path))),
            None if base.is_file() => {
                self.warnings.push(format!(
                    "Import \"{specifier}\" in \"{}\" is not a source module and was left as is.",
                    module_id(self.task, &unit.path)
                ));
                Ok(Resolved::Verbatim)
            }
            None => {
                let mut error = BundlerError::new(
                    self.task.label(),
                    format!("Could not resolve \"{specifier}\"."),
                );
                error.file = Some(module_id(self.task, &unit.path));
                Err(error)
            }
        }
    }

    fn alias(&self, specifier: &str) -> Option<PathBuf> {
        self.task.alias.iter().find_map(|(key, target)| {
            let rest = specifier.strip_prefix(key.as_str())?;
            if !rest.is_empty() && !rest.starts_with('/') {
                return None;
            }
            Some(
                self.task
                    .root_dir
                    .join(target)
                    .join(rest.trim_start_matches('/')),
            )
        })
    }

    /// The specifier to print for an import of `specifier` from `unit`.
    fn rewrite(
        &mut self,
        unit: &Unit,
        specifier: &str,
        linked: &mut Linked,
    ) -> Result<Option<String>, BundlerError> {
        match self.resolve(unit, specifier)? {
            Resolved::Module(file_name) => {
                let target = match self.mode {
                    Mode::Declaration => js_counterpart(&file_name),
                    Mode::Esm | Mode::Cjs => file_name.clone(),
                };
                if !linked.imports.contains(&file_name) {
                    linked.imports.push(file_name);
                }
                Ok(Some(relative_specifier(&unit.file_name, &target)))
            }
            Resolved::External(specifier) => {
                if self.mode != Mode::Declaration && !linked.external_imports.contains(&specifier) {
                    linked.external_imports.push(specifier);
                }
                Ok(None)
            }
            Resolved::Verbatim => Ok(None),
        }
    }

    fn link(&mut self, unit: &Unit, code: &str) -> Result<Linked, BundlerError> {
        let allocator = Allocator::default();
        let source_type = match self.mode {
            Mode::Declaration => SourceType::d_ts(),
            Mode::Esm | Mode::Cjs => SourceType::mjs(),
        };
        let parsed = Parser::new(&allocator, code, source_type).parse();
        if let Some(error) = parsed.errors.first() {
            return Err(BundlerError::new(
                self.task.label(),
                format!(
                    "Failed to link \"{}\": {error}",
                    module_id(self.task, &unit.path)
                ),
            ));
        }

        match self.mode {
            Mode::Esm | Mode::Declaration => self.link_esm(unit, code, &parsed.program),
            Mode::Cjs => self.link_cjs(unit, code, &parsed.program),
        }
    }

    fn link_esm(&mut self, unit: &Unit, code: &str, program: &Program<'_>) -> Result<Linked, BundlerError> {
        let mut linked = Linked::default();
        let mut edits: Vec<(Span, String)> = Vec::new();

        for statement in &program.body {
            let Some(declaration) = statement.as_module_declaration() else {
                continue;
            };
            let source = match declaration {
                ModuleDeclaration::ImportDeclaration(import) => Some(&import.source),
                ModuleDeclaration::ExportNamedDeclaration(export) => {
                    if let Some(declaration) = &export.declaration {
                        linked.exports.extend(declared_names(declaration));
                    }
                    linked
                        .exports
                        .extend(export.specifiers.iter().map(|s| export_name(&s.exported)));
                    export.source.as_ref()
                }
                ModuleDeclaration::ExportAllDeclaration(export) => {
                    if let Some(exported) = &export.exported {
                        linked.exports.push(export_name(exported));
                    }
                    Some(&export.source)
                }
                ModuleDeclaration::ExportDefaultDeclaration(_) => {
                    linked.exports.push("default".to_string());
                    None
                }
                _ => None,
            };

            if let Some(source) = source {
                if let Some(specifier) = self.rewrite(unit, source.value.as_str(), &mut linked)? {
                    edits.push((source.span, format!("\"{specifier}\"")));
                }
            }
        }

        linked.code = apply_edits(code, edits);
        Ok(linked)
    }

    fn link_cjs(&mut self, unit: &Unit, code: &str, program: &Program<'_>) -> Result<Linked, BundlerError> {
        let mut linked = Linked::default();
        let mut body = String::new();
        let mut trailing = String::new();
        let mut counter = 0usize;
        let mut uses_interop = false;
        let mut uses_reexport = false;

        for statement in &program.body {
            let Some(declaration) = statement.as_module_declaration() else {
                body.push_str(slice(code, statement.span()));
                body.push('\n');
                continue;
            };

            match declaration {
                ModuleDeclaration::ImportDeclaration(import) => {
                    if import.import_kind.is_type() {
                        continue;
                    }
                    let specifier = self.cjs_specifier(unit, import.source.value.as_str(), &mut linked)?;
                    let specifiers = import.specifiers.as_ref().filter(|s| !s.is_empty());
                    let Some(specifiers) = specifiers else {
                        body.push_str(&format!("require(\"{specifier}\");\n"));
                        continue;
                    };

                    counter += 1;
                    let module = format!("__m{counter}");
                    body.push_str(&format!("const {module} = require(\"{specifier}\");\n"));
                    for specifier in specifiers {
                        match specifier {
                            ImportDeclarationSpecifier::ImportDefaultSpecifier(default) => {
                                uses_interop = true;
                                body.push_str(&format!(
                                    "const {} = __interopDefault({module});\n",
                                    default.local.name
                                ));
                            }
                            ImportDeclarationSpecifier::ImportNamespaceSpecifier(namespace) => {
                                body.push_str(&format!("const {} = {module};\n", namespace.local.name));
                            }
                            ImportDeclarationSpecifier::ImportSpecifier(named) => {
                                if named.import_kind.is_type() {
                                    continue;
                                }
                                body.push_str(&format!(
                                    "const {} = {module}[{}];\n",
                                    named.local.name,
                                    quoted(&export_name(&named.imported))
                                ));
                            }
                        }
                    }
                }
                ModuleDeclaration::ExportNamedDeclaration(export) => {
                    if export.export_kind.is_type() {
                        continue;
                    }
                    if let Some(declaration) = &export.declaration {
                        body.push_str(slice(code, declaration.span()));
                        body.push('\n');
                        for name in declared_names(declaration) {
                            trailing.push_str(&format!("exports.{name} = {name};\n"));
                            linked.exports.push(name);
                        }
                        continue;
                    }

                    let module = match &export.source {
                        Some(source) => {
                            let specifier = self.cjs_specifier(unit, source.value.as_str(), &mut linked)?;
                            counter += 1;
                            let module = format!("__m{counter}");
                            body.push_str(&format!("const {module} = require(\"{specifier}\");\n"));
                            Some(module)
                        }
                        None => None,
                    };
                    for specifier in &export.specifiers {
                        if specifier.export_kind.is_type() {
                            continue;
                        }
                        let exported = export_name(&specifier.exported);
                        let local = export_name(&specifier.local);
                        match &module {
                            Some(module) => body.push_str(&format!(
                                "Object.defineProperty(exports, {}, {{ enumerable: true, get: () => {module}[{}] }});\n",
                                quoted(&exported),
                                quoted(&local)
                            )),
                            None => trailing.push_str(&format!("exports[{}] = {local};\n", quoted(&exported))),
                        }
                        linked.exports.push(exported);
                    }
                }
                ModuleDeclaration::ExportAllDeclaration(export) => {
                    let specifier = self.cjs_specifier(unit, export.source.value.as_str(), &mut linked)?;
                    match &export.exported {
                        Some(exported) => {
                            let exported = export_name(exported);
                            body.push_str(&format!(
                                "exports[{}] = require(\"{specifier}\");\n",
                                quoted(&exported)
                            ));
                            linked.exports.push(exported);
                        }
                        None => {
                            uses_reexport = true;
                            body.push_str(&format!("__reexport(exports, require(\"{specifier}\"));\n"));
                        }
                    }
                }
                ModuleDeclaration::ExportDefaultDeclaration(export) => {
                    let named = match &export.declaration {
                        ExportDefaultDeclarationKind::FunctionDeclaration(function) => {
                            function.id.as_ref().map(|id| id.name.to_string())
                        }
                        ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                            class.id.as_ref().map(|id| id.name.to_string())
                        }
                        _ => None,
                    };
                    let text = slice(code, export.declaration.span());
                    match named {
                        Some(name) => {
                            body.push_str(text);
                            body.push('\n');
                            trailing.push_str(&format!("exports.default = {name};\n"));
                        }
                        None => body.push_str(&format!("exports.default = {text};\n")),
                    }
                    linked.exports.push("default".to_string());
                }
                _ => {
                    body.push_str(slice(code, statement.span()));
                    body.push('\n');
                }
            }
        }

        let mut out = String::from("\"use strict\";\n");
        if !linked.exports.is_empty() || uses_reexport {
            out.push_str("Object.defineProperty(exports, \"__esModule\", { value: true });\n");
        }
        if uses_interop {
            out.push_str(INTEROP_DEFAULT);
        }
        if uses_reexport {
            out.push_str(REEXPORT);
        }
        out.push_str(&body);
        out.push_str(&trailing);
        if self.task.cjs_interop && linked.exports == ["default"] {
            out.push_str("module.exports = exports.default;\n");
        }

        linked.code = out;
        Ok(linked)
    }

    fn cjs_specifier(&mut self, unit: &Unit, specifier: &str, linked: &mut Linked) -> Result<String, BundlerError> {
        Ok(self
            .rewrite(unit, specifier, linked)?
            .unwrap_or_else(|| specifier.to_string()))
    }
}

fn resolve_module(base: &Path) -> Option<PathBuf> {
    if base.is_file() && is_source(base) {
        return Some(base.to_path_buf());
    }

    // `./util.js` written for `./util.ts`
    let mut stems = vec![base.to_path_buf()];
    if let Some(ext) = base.extension().and_then(|e| e.to_str()) {
        if matches!(ext, "js" | "mjs" | "cjs" | "jsx") {
            stems.insert(0, base.with_extension(""));
        }
    }

    for stem in &stems {
        for ext in RESOLVE_EXTENSIONS {
            let mut candidate = stem.as_os_str().to_os_string();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    RESOLVE_EXTENSIONS
        .iter()
        .map(|ext| base.join(format!("index{ext}")))
        .find(|candidate| candidate.is_file())
}

fn is_source(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| RESOLVE_EXTENSIONS.contains(&format!(".{ext}").as_str()))
        && !path.to_string_lossy().ends_with(".d.ts")
}

fn strip_extension(path: &str) -> String {
    match path.rfind('.') {
        Some(dot) if !path[dot..].contains('/') => path[..dot].to_string(),
        _ => path.to_string(),
    }
}

/// `utils.d.mts` -> `utils.mjs`
fn js_counterpart(declaration: &str) -> String {
    for (dts, js) in [(".d.mts", ".mjs"), (".d.cts", ".cjs"), (".d.ts", ".js")] {
        if let Some(stem) = declaration.strip_suffix(dts) {
            return format!("{stem}{js}");
        }
    }
    declaration.to_string()
}

/// Relative specifier from one output file to another, both `/`-separated.
fn relative_specifier(from_file: &str, to_file: &str) -> String {
    let mut from: Vec<&str> = from_file.split('/').collect();
    from.pop();
    let to: Vec<&str> = to_file.split('/').collect();

    let common = from
        .iter()
        .zip(&to[..to.len() - 1])
        .take_while(|(a, b)| a == b)
        .count();
    let ups = from.len() - common;

    let mut parts: Vec<&str> = vec![".."; ups];
    parts.extend(&to[common..]);
    let joined = parts.join("/");
    if ups == 0 { format!("./{joined}") } else { joined }
}

fn slice(code: &str, span: Span) -> &str {
    &code[span.start as usize..span.end as usize]
}

fn apply_edits(code: &str, mut edits: Vec<(Span, String)>) -> String {
    edits.sort_by_key(|(span, _)| span.start);
    let mut out = String::with_capacity(code.len());
    let mut cursor = 0usize;
    for (span, replacement) in edits {
        out.push_str(&code[cursor..span.start as usize]);
        out.push_str(&replacement);
        cursor = span.end as usize;
    }
    out.push_str(&code[cursor..]);
    out
}

fn quoted(name: &str) -> String {
    serde_json::Value::String(name.to_string()).to_string()
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(ident) => ident.name.to_string(),
        ModuleExportName::IdentifierReference(ident) => ident.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(variable) => variable
            .declarations
            .iter()
            .filter_map(|declarator| match &declarator.id.kind {
                BindingPatternKind::BindingIdentifier(ident) => Some(ident.name.to_string()),
                _ => None,
            })
            .collect(),
        Declaration::FunctionDeclaration(function) => {
            function.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => class.id.iter().map(|id| id.name.to_string()).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::entry::BuildEntry;
    use crate::group::{PlanContext, TaskKind, plan_tasks};
    use crate::options::{BuildOptions, ResolvedPaths};
    use crate::package_json::PackageType;
    use std::fs;

    fn tasks(root: &Path, entries: Vec<BuildEntry>, options: &BuildOptions) -> Vec<BuildTask> {
        let paths = ResolvedPaths::new(root, options);
        plan_tasks(
            &entries,
            &PlanContext {
                options,
                paths: &paths,
                package_type: PackageType::Commonjs,
                externals: vec!["react".to_string()],
                tsconfig: None,
            },
        )
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/lib")).unwrap();
        fs::write(
            dir.path().join("src/index.ts"),
            "import { twice } from './lib/math';\nimport React from 'react';\nexport const answer: number = twice(21);\nexport default React;\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("src/lib/math.ts"),
            "export function twice(n: number): number {\n  return n * 2;\n}\n",
        )
        .unwrap();
        dir
    }

    fn dual_entry(root: &Path) -> BuildEntry {
        BuildEntry::new(root.join("src/index.ts"), "index")
            .with_esm(true)
            .with_cjs(true)
            .with_declaration(true)
    }

    #[test]
    fn relative_specifiers() {
        assert_eq!(relative_specifier("index.mjs", "lib/math.mjs"), "./lib/math.mjs");
        assert_eq!(relative_specifier("lib/math.mjs", "index.mjs"), "../index.mjs");
        assert_eq!(relative_specifier("a/b.mjs", "a/c.mjs"), "./c.mjs");
        assert_eq!(relative_specifier("a/b/c.mjs", "a/d/e.mjs"), "../d/e.mjs");
    }

    #[test]
    fn defines_skip_member_access() {
        let mut map = IndexMap::new();
        map.insert("process.env.NODE_ENV".to_string(), "\"production\"".to_string());
        map.insert("EdgeRuntime".to_string(), "false".to_string());
        let defines = Defines::new(&map);

        let code = defines.apply(
            "if (process.env.NODE_ENV === 'x' && !globalThis.EdgeRuntime && EdgeRuntime) {}".to_string(),
        );

        assert_eq!(
            code,
            "if (\"production\" === 'x' && !globalThis.EdgeRuntime && false) {}"
        );
    }

    #[test]
    fn declaration_names_map_to_js_files() {
        assert_eq!(js_counterpart("lib/math.d.mts"), "lib/math.mjs");
        assert_eq!(js_counterpart("index.d.ts"), "index.js");
    }

    #[tokio::test]
    async fn esm_output_rewrites_relative_imports() {
        let dir = fixture();
        let options = BuildOptions::default();
        let tasks = tasks(dir.path(), vec![dual_entry(dir.path())], &options);
        let js = tasks.iter().find(|t| t.kind != TaskKind::Declaration).unwrap();

        let output = TranspileBundler::new().bundle(js).await.unwrap();

        let index = output
            .chunks
            .iter()
            .find(|c| c.file_name == "index.mjs")
            .unwrap();
        assert!(index.is_entry);
        assert!(index.code.contains("\"./lib/math.mjs\""));
        assert!(!index.code.contains(": number"));
        assert_eq!(index.imports, vec!["lib/math.mjs"]);
        assert_eq!(index.external_imports, vec!["react"]);
        assert_eq!(index.exports, vec!["answer", "default"]);

        let names: Vec<&str> = output.chunks.iter().map(|c| c.file_name.as_str()).collect();
        assert!(names.contains(&"lib/math.mjs"));
        assert!(names.contains(&"index.cjs"));
        assert!(names.contains(&"lib/math.cjs"));
    }

    #[tokio::test]
    async fn cjs_output_uses_require_and_exports() {
        let dir = fixture();
        let options = BuildOptions::default();
        let tasks = tasks(dir.path(), vec![dual_entry(dir.path())], &options);
        let js = tasks.iter().find(|t| t.kind != TaskKind::Declaration).unwrap();

        let output = TranspileBundler::new().bundle(js).await.unwrap();

        let index = output
            .chunks
            .iter()
            .find(|c| c.file_name == "index.cjs")
            .unwrap();
        assert!(index.code.starts_with("\"use strict\";"));
        assert!(index.code.contains("require(\"./lib/math.cjs\")"));
        assert!(index.code.contains("__interopDefault(__m2)"));
        assert!(index.code.contains("exports.answer = answer;"));
        assert!(!index.code.contains("import "));

        let math = output
            .chunks
            .iter()
            .find(|c| c.file_name == "lib/math.cjs")
            .unwrap();
        assert!(math.code.contains("exports.twice = twice;"));
        assert!(!math.is_entry);
    }

    #[tokio::test]
    async fn declarations_follow_relative_imports() {
        let dir = fixture();
        let options = BuildOptions::default();
        let tasks = tasks(dir.path(), vec![dual_entry(dir.path())], &options);
        let dts = tasks.iter().find(|t| t.kind == TaskKind::Declaration).unwrap();

        let output = TranspileBundler::new().emit_declarations(dts).await.unwrap();

        let names: Vec<&str> = output.assets.iter().map(|a| a.file_name.as_str()).collect();
        assert!(names.contains(&"index.d.mts"));
        assert!(names.contains(&"index.d.cts"));
        assert!(names.contains(&"lib/math.d.mts"));

        let index = output
            .assets
            .iter()
            .find(|a| a.file_name == "index.d.mts")
            .unwrap();
        let text = String::from_utf8(index.source.clone()).unwrap();
        assert!(text.contains("export declare const answer: number"));
    }

    /// Serves one file from memory and everything else from disk.
    #[derive(Debug)]
    struct OverlayRuntime {
        path: PathBuf,
        contents: &'static str,
    }

    #[async_trait]
    impl Runtime for OverlayRuntime {
        async fn read_file(&self, path: &Path) -> crate::runtime::RuntimeResult<Vec<u8>> {
            if path == self.path {
                return Ok(self.contents.as_bytes().to_vec());
            }
            NativeRuntime::new().read_file(path).await
        }

        async fn write_file(&self, path: &Path, content: &[u8]) -> crate::runtime::RuntimeResult<()> {
            NativeRuntime::new().write_file(path, content).await
        }

        async fn metadata(
            &self,
            path: &Path,
        ) -> crate::runtime::RuntimeResult<crate::runtime::FileMetadata> {
            NativeRuntime::new().metadata(path).await
        }

        fn exists(&self, path: &Path) -> bool {
            NativeRuntime::new().exists(path)
        }

        fn is_file(&self, path: &Path) -> bool {
            NativeRuntime::new().is_file(path)
        }

        async fn create_dir(&self, path: &Path, recursive: bool) -> crate::runtime::RuntimeResult<()> {
            NativeRuntime::new().create_dir(path, recursive).await
        }

        async fn remove_dir_all(&self, path: &Path) -> crate::runtime::RuntimeResult<()> {
            NativeRuntime::new().remove_dir_all(path).await
        }

        async fn read_dir(&self, path: &Path) -> crate::runtime::RuntimeResult<Vec<String>> {
            NativeRuntime::new().read_dir(path).await
        }

        fn get_cwd(&self) -> crate::runtime::RuntimeResult<PathBuf> {
            NativeRuntime::new().get_cwd()
        }
    }

    #[tokio::test]
    async fn sources_are_read_through_the_runtime() {
        let dir = fixture();
        let math = dir.path().join("src/lib/math.ts");
        let runtime = Arc::new(OverlayRuntime {
            path: math,
            contents: "export function twice(n: number): number {\n  return n + n;\n}\nexport const fromRuntime = true;\n",
        });
        let entry = BuildEntry::new(dir.path().join("src/index.ts"), "index").with_esm(true);
        let options = BuildOptions::default();
        let tasks = tasks(dir.path(), vec![entry], &options);

        let output = TranspileBundler::new()
            .with_runtime(runtime)
            .bundle(&tasks[0])
            .await
            .unwrap();

        let math = output
            .chunks
            .iter()
            .find(|c| c.file_name.starts_with("lib/math."))
            .unwrap();
        assert!(math.exports.contains(&"fromRuntime".to_string()), "{:?}", math.exports);
        assert!(math.code.contains("n + n"));
    }

    #[tokio::test]
    async fn syntax_errors_carry_a_location() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.ts"), "export const a = ;\n").unwrap();
        let entry = BuildEntry::new(dir.path().join("src/index.ts"), "index").with_esm(true);
        let options = BuildOptions::default();
        let tasks = tasks(dir.path(), vec![entry], &options);

        let err = TranspileBundler::new().bundle(&tasks[0]).await.unwrap_err();

        assert_eq!(err.file.as_deref(), Some("src/index.ts"));
        assert_eq!(err.line, Some(1));
        assert!(err.code_frame.is_some());
    }

    #[tokio::test]
    async fn unresolved_relative_import_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.ts"), "export * from './missing';\n").unwrap();
        let entry = BuildEntry::new(dir.path().join("src/index.ts"), "index").with_esm(true);
        let options = BuildOptions::default();
        let tasks = tasks(dir.path(), vec![entry], &options);

        let err = TranspileBundler::new().bundle(&tasks[0]).await.unwrap_err();

        assert_eq!(err.message, "Could not resolve \"./missing\".");
    }
}
