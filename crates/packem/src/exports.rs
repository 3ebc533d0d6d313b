//! Conditional export maps.
//!
//! `exports`, `imports` and `bin` are parsed from raw JSON into tagged trees
//! once; everything downstream walks [`ExportNode`] with a single recursive
//! match instead of sniffing JSON shapes.

use indexmap::IndexMap;
use serde_json::Value;

use crate::{Error, Result};

/// One node of a conditional export tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportNode {
    /// A target path such as `./dist/index.mjs`.
    Leaf(String),
    /// Condition key to child node, in declaration order.
    Conditions(IndexMap<String, ExportNode>),
}

impl ExportNode {
    /// Parse one export value.
    ///
    /// Accepts a string, an array (first element wins), or a possibly nested
    /// condition object. `null` members of an object are skipped. `key_path`
    /// is used in error messages, e.g. `exports["."].import`.
    pub fn parse(value: &Value, key_path: &str) -> Result<Self> {
        match value {
            Value::String(path) => Ok(ExportNode::Leaf(path.clone())),
            Value::Array(items) => match items.first() {
                None => Err(shape_error(key_path, "an empty array")),
                Some(Value::Array(_)) => Err(shape_error(key_path, "a nested array")),
                Some(first) => Self::parse(first, &format!("{key_path}[0]")),
            },
            Value::Object(map) => {
                let mut conditions = IndexMap::with_capacity(map.len());
                for (key, child) in map {
                    if child.is_null() {
                        continue;
                    }
                    let child_path = format!("{key_path}[{key:?}]");
                    conditions.insert(key.clone(), Self::parse(child, &child_path)?);
                }
                Ok(ExportNode::Conditions(conditions))
            }
            Value::Number(_) => Err(shape_error(key_path, "a number")),
            Value::Bool(_) => Err(shape_error(key_path, "a boolean")),
            Value::Null => Err(shape_error(key_path, "null")),
        }
    }

    /// Every leaf with the condition keys leading to it, in declaration order.
    pub fn leaves(&self) -> Vec<(Vec<String>, &str)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, trail: &mut Vec<String>, out: &mut Vec<(Vec<String>, &'a str)>) {
        match self {
            ExportNode::Leaf(path) => out.push((trail.clone(), path.as_str())),
            ExportNode::Conditions(map) => {
                for (key, child) in map {
                    trail.push(key.clone());
                    child.collect_leaves(trail, out);
                    trail.pop();
                }
            }
        }
    }

    /// Resolve against an ordered set of active conditions the way Node does:
    /// the first key (in declaration order) that is active or `default` wins.
    pub fn resolve(&self, active: &[&str]) -> Option<&str> {
        match self {
            ExportNode::Leaf(path) => Some(path),
            ExportNode::Conditions(map) => map.iter().find_map(|(key, child)| {
                if key == "default" || active.contains(&key.as_str()) {
                    child.resolve(active)
                } else {
                    None
                }
            }),
        }
    }
}

fn shape_error(key_path: &str, found: &str) -> Error {
    Error::config(format!(
        "Invalid value at {key_path}: expected a string, an array of targets, or an object of conditions, found {found}."
    ))
}

/// One flattened leaf of an export map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    /// Subpath key, `.` for the package root.
    pub subpath: String,
    /// Condition keys from the subpath down to the leaf.
    pub conditions: Vec<String>,
    pub path: String,
}

impl ExportTarget {
    pub fn has_condition(&self, key: &str) -> bool {
        self.conditions.iter().any(|c| c == key)
    }

    /// Human-readable field name, e.g. `exports["./utils"].import`.
    pub fn field(&self, root: &str) -> String {
        let mut field = format!("{root}[{:?}]", self.subpath);
        for condition in &self.conditions {
            field.push('.');
            field.push_str(condition);
        }
        field
    }

    pub fn is_wildcard(&self) -> bool {
        self.subpath.contains('*') || self.path.contains('*')
    }
}

/// The `exports` field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportsField {
    subpaths: IndexMap<String, ExportNode>,
}

impl ExportsField {
    /// Parse `exports`.
    ///
    /// A string, array or root condition map is sugar for `{ ".": value }`.
    /// An object mixing `.`-prefixed subpaths with condition keys is rejected.
    pub fn parse(value: &Value) -> Result<Self> {
        let subpaths = parse_subpath_map(value, "exports", '.')?;
        Ok(Self { subpaths })
    }

    pub fn get(&self, subpath: &str) -> Option<&ExportNode> {
        self.subpaths.get(subpath)
    }

    pub fn subpaths(&self) -> impl Iterator<Item = (&str, &ExportNode)> {
        self.subpaths.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn flatten(&self) -> Vec<ExportTarget> {
        flatten_map(&self.subpaths)
    }
}

/// The `imports` field (`#`-prefixed private specifiers).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportsField {
    specifiers: IndexMap<String, ExportNode>,
}

impl ImportsField {
    pub fn parse(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::config(
                "Invalid value at imports: expected an object whose keys start with \"#\".",
            ));
        };
        let mut specifiers = IndexMap::with_capacity(map.len());
        for (key, child) in map {
            if !key.starts_with('#') || key == "#" || key.starts_with("#/") {
                return Err(Error::config(format!(
                    "Invalid key {key:?} in imports: keys must start with \"#\" followed by a name."
                )));
            }
            if child.is_null() {
                continue;
            }
            specifiers.insert(
                key.clone(),
                ExportNode::parse(child, &format!("imports[{key:?}]"))?,
            );
        }
        Ok(Self { specifiers })
    }

    pub fn flatten(&self) -> Vec<ExportTarget> {
        flatten_map(&self.specifiers)
    }

    /// Resolve a `#specifier` against active conditions, including
    /// wildcard keys.
    pub fn resolve(&self, specifier: &str, active: &[&str]) -> Option<String> {
        if let Some(node) = self.specifiers.get(specifier) {
            return node.resolve(active).map(str::to_string);
        }
        self.specifiers.iter().find_map(|(key, node)| {
            let capture = match_wildcard(key, specifier)?;
            node.resolve(active).map(|target| substitute(target, capture))
        })
    }
}

/// The `bin` field: a single path or a map from command name to path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinField {
    Single(String),
    Map(IndexMap<String, String>),
}

impl BinField {
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::String(path) => Ok(BinField::Single(path.clone())),
            Value::Object(map) => {
                let mut commands = IndexMap::with_capacity(map.len());
                for (name, path) in map {
                    let Value::String(path) = path else {
                        return Err(Error::config(format!(
                            "Invalid value at bin[{name:?}]: expected a string path."
                        )));
                    };
                    commands.insert(name.clone(), path.clone());
                }
                Ok(BinField::Map(commands))
            }
            _ => Err(Error::config(
                "Invalid value at bin: expected a string path or an object of command paths.",
            )),
        }
    }

    /// `(field, path)` pairs, e.g. `("bin.cli", "./dist/cli.mjs")`.
    pub fn targets(&self) -> Vec<(String, &str)> {
        match self {
            BinField::Single(path) => vec![("bin".to_string(), path.as_str())],
            BinField::Map(map) => map
                .iter()
                .map(|(name, path)| (format!("bin.{name}"), path.as_str()))
                .collect(),
        }
    }
}

fn parse_subpath_map(value: &Value, root: &str, marker: char) -> Result<IndexMap<String, ExportNode>> {
    let mut subpaths = IndexMap::new();
    let root_key = marker.to_string();

    let Value::Object(map) = value else {
        let node = ExportNode::parse(value, &format!("{root}[{root_key:?}]"))?;
        subpaths.insert(root_key, node);
        return Ok(subpaths);
    };

    let subpath_keys = map.keys().filter(|k| k.starts_with(marker)).count();
    if subpath_keys == 0 {
        let node = ExportNode::parse(value, &format!("{root}[{root_key:?}]"))?;
        subpaths.insert(root_key, node);
        return Ok(subpaths);
    }
    if subpath_keys != map.len() {
        return Err(Error::config(format!(
            "Invalid \"{root}\": an object cannot mix subpath keys starting with \"{marker}\" and condition keys."
        )));
    }

    for (key, child) in map {
        if child.is_null() {
            continue;
        }
        subpaths.insert(
            key.clone(),
            ExportNode::parse(child, &format!("{root}[{key:?}]"))?,
        );
    }
    Ok(subpaths)
}

fn flatten_map(map: &IndexMap<String, ExportNode>) -> Vec<ExportTarget> {
    map.iter()
        .flat_map(|(subpath, node)| {
            node.leaves()
                .into_iter()
                .map(|(conditions, path)| ExportTarget {
                    subpath: subpath.clone(),
                    conditions,
                    path: path.to_string(),
                })
        })
        .collect()
}

/// Match `value` against a pattern with a single `*`, returning the capture.
///
/// The capture must be non-empty.
pub fn match_wildcard<'a>(pattern: &str, value: &'a str) -> Option<&'a str> {
    let (prefix, suffix) = pattern.split_once('*')?;
    if value.len() <= prefix.len() + suffix.len() {
        return None;
    }
    value.strip_prefix(prefix)?.strip_suffix(suffix)
}

/// Replace every `*` in `template` with `capture`.
pub fn substitute(template: &str, capture: &str) -> String {
    template.replace('*', capture)
}
