//! Output file extensions.

use serde::Serialize;

use crate::entry::ModuleFormat;
use crate::options::OutputExtensionMap;
use crate::package_json::PackageType;

/// Extensions for one format's JS output and its declaration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputExtensions {
    /// With a leading dot, e.g. `.mjs`.
    pub js: String,
    /// With a leading dot, e.g. `.d.mts`.
    pub dts: String,
}

/// Pick the JS and declaration extensions for `format`.
///
/// An explicit `extension_map` entry wins. Otherwise `.js` is used when the
/// format matches the package `type` and neither `node10` nor `dual` asks for
/// disambiguation; everything else gets `.cjs`/`.mjs`.
pub fn resolve(
    format: ModuleFormat,
    package_type: PackageType,
    extension_map: Option<&OutputExtensionMap>,
    node10: bool,
    dual: bool,
) -> OutputExtensions {
    let mapped = extension_map.and_then(|map| match format {
        ModuleFormat::Cjs => map.cjs.as_deref(),
        ModuleFormat::Esm => map.esm.as_deref(),
    });

    let js = match mapped {
        Some(ext) => normalize(ext),
        None => {
            let native = matches!(
                (format, package_type),
                (ModuleFormat::Esm, PackageType::Module) | (ModuleFormat::Cjs, PackageType::Commonjs)
            );
            if native && !node10 && !dual {
                ".js".to_string()
            } else {
                match format {
                    ModuleFormat::Cjs => ".cjs".to_string(),
                    ModuleFormat::Esm => ".mjs".to_string(),
                }
            }
        }
    };

    let dts = declaration_extension(&js);
    OutputExtensions { js, dts }
}

/// Declaration extension mirroring a JS extension.
pub fn declaration_extension(js: &str) -> String {
    match js {
        ".js" => ".d.ts".to_string(),
        ".cjs" => ".d.cts".to_string(),
        ".mjs" => ".d.mts".to_string(),
        other => format!(".d{other}.ts"),
    }
}

fn normalize(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

/// JS extensions recognized in declared package paths.
pub const JS_EXTENSIONS: [&str; 3] = [".mjs", ".cjs", ".js"];

/// Declaration extensions recognized in declared package paths.
pub const DTS_EXTENSIONS: [&str; 3] = [".d.mts", ".d.cts", ".d.ts"];

/// What a declared output path's extension says about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredKind {
    Js(Option<ModuleFormat>),
    Declaration,
}

/// Split a declared output path into its stem and extension kind.
///
/// `.js` carries no format of its own; the caller decides it from `type`.
pub fn split_declared(path: &str) -> Option<(&str, &'static str, DeclaredKind)> {
    for ext in DTS_EXTENSIONS {
        if let Some(stem) = path.strip_suffix(ext) {
            return Some((stem, ext, DeclaredKind::Declaration));
        }
    }
    for ext in JS_EXTENSIONS {
        if let Some(stem) = path.strip_suffix(ext) {
            let format = match ext {
                ".mjs" => Some(ModuleFormat::Esm),
                ".cjs" => Some(ModuleFormat::Cjs),
                _ => None,
            };
            return Some((stem, ext, DeclaredKind::Js(format)));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_type_uses_js() {
        let ext = resolve(ModuleFormat::Esm, PackageType::Module, None, false, false);
        assert_eq!(ext.js, ".js");
        assert_eq!(ext.dts, ".d.ts");

        let ext = resolve(ModuleFormat::Cjs, PackageType::Commonjs, None, false, false);
        assert_eq!(ext.js, ".js");
    }

    #[test]
    fn non_matching_format_is_disambiguated() {
        let ext = resolve(ModuleFormat::Esm, PackageType::Commonjs, None, false, false);
        assert_eq!(ext.js, ".mjs");
        assert_eq!(ext.dts, ".d.mts");

        let ext = resolve(ModuleFormat::Cjs, PackageType::Module, None, false, false);
        assert_eq!(ext.js, ".cjs");
        assert_eq!(ext.dts, ".d.cts");
    }

    #[test]
    fn dual_and_node10_force_explicit_extensions() {
        let dual = resolve(ModuleFormat::Cjs, PackageType::Commonjs, None, false, true);
        assert_eq!(dual.js, ".cjs");
        let node10 = resolve(ModuleFormat::Esm, PackageType::Module, None, true, false);
        assert_eq!(node10.js, ".mjs");
    }

    #[test]
    fn extension_map_wins() {
        let map = OutputExtensionMap {
            cjs: Some("cjs".to_string()),
            esm: Some(".es.js".to_string()),
        };
        let cjs = resolve(ModuleFormat::Cjs, PackageType::Commonjs, Some(&map), false, false);
        assert_eq!(cjs.js, ".cjs");
        let esm = resolve(ModuleFormat::Esm, PackageType::Module, Some(&map), false, false);
        assert_eq!(esm.js, ".es.js");
        assert_eq!(esm.dts, ".d.es.js.ts");
    }

    #[test]
    fn declaration_mirrors_js_for_every_combination() {
        for format in [ModuleFormat::Cjs, ModuleFormat::Esm] {
            for package_type in [PackageType::Commonjs, PackageType::Module] {
                for (node10, dual) in [(false, false), (true, false), (false, true)] {
                    let ext = resolve(format, package_type, None, node10, dual);
                    let expected = match ext.js.as_str() {
                        ".js" => ".d.ts",
                        ".cjs" => ".d.cts",
                        ".mjs" => ".d.mts",
                        other => panic!("unexpected extension {other}"),
                    };
                    assert_eq!(ext.dts, expected);
                }
            }
        }
    }

    #[test]
    fn split_declared_paths() {
        assert_eq!(
            split_declared("index.d.mts"),
            Some(("index", ".d.mts", DeclaredKind::Declaration))
        );
        assert_eq!(
            split_declared("index.cjs"),
            Some(("index", ".cjs", DeclaredKind::Js(Some(ModuleFormat::Cjs))))
        );
        assert_eq!(
            split_declared("index.js"),
            Some(("index", ".js", DeclaredKind::Js(None)))
        );
        assert_eq!(split_declared("style.css"), None);
    }
}
