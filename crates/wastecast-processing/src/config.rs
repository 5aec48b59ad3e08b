//! Configuration resolver for the pipeline document.
//!
//! The document is a YAML (or JSON) tree loaded once per run. Stages never
//! index into it ad hoc: they resolve dotted key paths through [`Config`] /
//! [`ConfigNode`] with a declared Rust type, and get a precise error when a key
//! is absent ([`PipelineError::ConfigMissingKey`]) or holds the wrong kind of
//! value ([`PipelineError::ConfigTypeMismatch`]).
//!
//! # Example
//!
//! ```rust
//! use wastecast_processing::config::Config;
//!
//! let config = Config::from_yaml_str(
//!     "data_ingestion:\n  test_size: 0.2\n  random_state: 42\n",
//! ).unwrap();
//!
//! let fraction: f64 = config.get(&["data_ingestion", "test_size"]).unwrap();
//! let seed: u64 = config.get(&["data_ingestion", "random_state"]).unwrap();
//! let depth: usize = config.get_or(&["model_training", "max_depth"], 6).unwrap();
//!
//! assert_eq!(fraction, 0.2);
//! assert_eq!(seed, 42);
//! assert_eq!(depth, 6);
//! ```

use crate::error::{PipelineError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Section holding values shared by several stages.
pub const BASE_SECTION: &str = "base";

/// A Rust type that can be read from a configuration value.
pub trait FromConfigValue: Sized {
    /// Human readable description used in type mismatch errors.
    const EXPECTED: &'static str;

    /// Convert the value, or `None` if it has the wrong shape.
    fn from_config_value(value: &Value) -> Option<Self>;
}

impl FromConfigValue for String {
    const EXPECTED: &'static str = "a string";

    fn from_config_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromConfigValue for PathBuf {
    const EXPECTED: &'static str = "a path string";

    fn from_config_value(value: &Value) -> Option<Self> {
        value.as_str().map(PathBuf::from)
    }
}

impl FromConfigValue for f64 {
    const EXPECTED: &'static str = "a number";

    fn from_config_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromConfigValue for u64 {
    const EXPECTED: &'static str = "a non-negative integer";

    fn from_config_value(value: &Value) -> Option<Self> {
        value.as_u64()
    }
}

impl FromConfigValue for usize {
    const EXPECTED: &'static str = "a non-negative integer";

    fn from_config_value(value: &Value) -> Option<Self> {
        value.as_u64().and_then(|v| usize::try_from(v).ok())
    }
}

impl FromConfigValue for i64 {
    const EXPECTED: &'static str = "an integer";

    fn from_config_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromConfigValue for bool {
    const EXPECTED: &'static str = "a boolean";

    fn from_config_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl<T: FromConfigValue> FromConfigValue for Vec<T> {
    const EXPECTED: &'static str = "a list";

    fn from_config_value(value: &Value) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(T::from_config_value)
            .collect()
    }
}

/// Any scalar (string, number or boolean) rendered as text.
///
/// Used where a document may list either labels or numeric codes, such as the
/// set of weekend days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarText(pub String);

impl FromConfigValue for ScalarText {
    const EXPECTED: &'static str = "a scalar";

    fn from_config_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            Value::Bool(b) => Some(Self(b.to_string())),
            _ => None,
        }
    }
}

/// Name of a value's kind, for diagnostics.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

fn join_path(prefix: &str, keys: &[&str]) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(keys.len() + 1);
    if !prefix.is_empty() {
        parts.push(prefix);
    }
    parts.extend_from_slice(keys);
    parts.join(".")
}

/// The loaded configuration document.
///
/// Immutable once loaded; stages borrow it through a
/// [`StageContext`](crate::pipeline::StageContext).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    root: Value,
    source: Option<PathBuf>,
}

impl Config {
    /// Load a document from a YAML or JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::ConfigLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut config = Self::from_yaml_str(&text).map_err(|e| PipelineError::ConfigLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse a document from YAML text (JSON is accepted as a YAML subset).
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(text)?;
        Self::from_value(root)
    }

    /// Wrap an already parsed tree. The root must be a mapping.
    pub fn from_value(root: Value) -> Result<Self> {
        let root = match root {
            Value::Null => Value::Object(serde_json::Map::new()),
            Value::Object(_) => root,
            other => {
                return Err(PipelineError::ConfigTypeMismatch {
                    path: "<root>".to_string(),
                    expected: "a mapping",
                    found: value_kind(&other),
                });
            }
        };
        Ok(Self { root, source: None })
    }

    /// File the document was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// View of the whole document.
    pub fn node(&self) -> ConfigNode<'_> {
        ConfigNode {
            path: "",
            value: &self.root,
        }
    }

    /// Resolve a key path to its raw value.
    pub fn resolve(&self, keys: &[&str]) -> Result<&Value> {
        self.node().resolve(keys)
    }

    /// Resolve a required value of type `T`.
    pub fn get<T: FromConfigValue>(&self, keys: &[&str]) -> Result<T> {
        self.node().get(keys)
    }

    /// Resolve an optional value of type `T`.
    pub fn get_opt<T: FromConfigValue>(&self, keys: &[&str]) -> Result<Option<T>> {
        self.node().get_opt(keys)
    }

    /// Resolve a secondary tuning value, falling back to `default` when absent.
    pub fn get_or<T: FromConfigValue>(&self, keys: &[&str], default: T) -> Result<T> {
        self.node().get_or(keys, default)
    }

    /// Resolve `section.key`, falling back to `base.key` when the stage does
    /// not override it. The error names the stage-level path.
    pub fn get_with_base<T: FromConfigValue>(&self, section: &str, key: &str) -> Result<T> {
        match self.get_opt::<T>(&[section, key])? {
            Some(value) => Ok(value),
            None => match self.get_opt::<T>(&[BASE_SECTION, key])? {
                Some(value) => Ok(value),
                None => Err(PipelineError::ConfigMissingKey {
                    path: join_path("", &[section, key]),
                }),
            },
        }
    }

    /// Sub-tree view rooted at `keys`.
    pub fn child(&self, keys: &[&str]) -> Result<OwnedNode<'_>> {
        self.node().child(keys)
    }
}

/// A borrowed view of one sub-tree of the document.
///
/// Keeps the dotted path of its root so errors raised from nested lookups name
/// the full location in the document.
#[derive(Debug, Clone, Copy)]
pub struct ConfigNode<'a> {
    path: &'a str,
    value: &'a Value,
}

impl<'a> ConfigNode<'a> {
    /// Dotted path of this node (empty for the document root).
    pub fn path(&self) -> &str {
        self.path
    }

    /// Raw value of this node.
    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Resolve a key path below this node.
    pub fn resolve(&self, keys: &[&str]) -> Result<&'a Value> {
        let mut current = self.value;
        for (depth, key) in keys.iter().enumerate() {
            current = match current {
                Value::Object(map) => map.get(*key),
                _ => None,
            }
            .ok_or_else(|| PipelineError::ConfigMissingKey {
                path: join_path(self.path, &keys[..=depth]),
            })?;
        }
        Ok(current)
    }

    /// Resolve a required value of type `T`.
    pub fn get<T: FromConfigValue>(&self, keys: &[&str]) -> Result<T> {
        let value = self.resolve(keys)?;
        T::from_config_value(value).ok_or_else(|| PipelineError::ConfigTypeMismatch {
            path: join_path(self.path, keys),
            expected: T::EXPECTED,
            found: value_kind(value),
        })
    }

    /// Resolve an optional value: absent or `null` gives `None`, a value of the
    /// wrong type is still an error.
    pub fn get_opt<T: FromConfigValue>(&self, keys: &[&str]) -> Result<Option<T>> {
        match self.resolve(keys) {
            Ok(Value::Null) => Ok(None),
            Ok(_) => self.get(keys).map(Some),
            Err(PipelineError::ConfigMissingKey { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve a secondary tuning value with a documented default.
    pub fn get_or<T: FromConfigValue>(&self, keys: &[&str], default: T) -> Result<T> {
        Ok(self.get_opt(keys)?.unwrap_or(default))
    }

    /// Sub-tree view rooted at `keys`.
    pub fn child(&self, keys: &[&str]) -> Result<OwnedNode<'a>> {
        let value = self.resolve(keys)?;
        Ok(OwnedNode {
            path: join_path(self.path, keys),
            value,
        })
    }
}

/// A sub-tree view that owns its dotted path.
#[derive(Debug, Clone)]
pub struct OwnedNode<'a> {
    path: String,
    value: &'a Value,
}

impl<'a> OwnedNode<'a> {
    /// Borrow as a [`ConfigNode`] for typed lookups.
    pub fn as_node(&self) -> ConfigNode<'_> {
        ConfigNode {
            path: &self.path,
            value: self.value,
        }
    }

    /// Dotted path of this node.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw value of this node.
    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Resolve a required value of type `T`.
    pub fn get<T: FromConfigValue>(&self, keys: &[&str]) -> Result<T> {
        self.as_node().get(keys)
    }

    /// Resolve an optional value of type `T`.
    pub fn get_opt<T: FromConfigValue>(&self, keys: &[&str]) -> Result<Option<T>> {
        self.as_node().get_opt(keys)
    }

    /// Resolve a secondary tuning value with a documented default.
    pub fn get_or<T: FromConfigValue>(&self, keys: &[&str], default: T) -> Result<T> {
        self.as_node().get_or(keys, default)
    }

    /// Entries of a mapping node, in document order. A `null` node has no entries.
    pub fn entries(&self) -> Result<Vec<(String, OwnedNode<'a>)>> {
        match self.value {
            Value::Null => Ok(Vec::new()),
            Value::Object(map) => Ok(map
                .iter()
                .map(|(key, value)| {
                    (
                        key.clone(),
                        OwnedNode {
                            path: join_path(&self.path, &[key.as_str()]),
                            value,
                        },
                    )
                })
                .collect()),
            other => Err(PipelineError::ConfigTypeMismatch {
                path: self.path.clone(),
                expected: "a mapping",
                found: value_kind(other),
            }),
        }
    }

    /// Items of a list node.
    pub fn list(&self) -> Result<Vec<OwnedNode<'a>>> {
        match self.value {
            Value::Array(items) => Ok(items
                .iter()
                .enumerate()
                .map(|(idx, value)| OwnedNode {
                    path: format!("{}[{}]", self.path, idx),
                    value,
                })
                .collect()),
            other => Err(PipelineError::ConfigTypeMismatch {
                path: self.path.clone(),
                expected: "a list",
                found: value_kind(other),
            }),
        }
    }
}

impl<'a> From<ConfigNode<'a>> for OwnedNode<'a> {
    fn from(node: ConfigNode<'a>) -> Self {
        Self {
            path: node.path.to_string(),
            value: node.value,
        }
    }
}

/// Check that a fraction lies strictly between 0 and 1.
pub fn validate_fraction(path: &str, value: f64) -> Result<f64> {
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(PipelineError::InvalidConfig {
            path: path.to_string(),
            reason: format!("{} is not strictly between 0.0 and 1.0", value),
        })
    }
}
