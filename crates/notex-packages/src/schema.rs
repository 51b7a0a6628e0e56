//! Package configuration schema.
//!
//! A package's `config.json` is validated against three key sets:
//! required keys (no default), defaults, and functional keys (at least one
//! must be non-empty or the package has no effect). Validation runs on the
//! raw JSON map so errors can name the exact offending keys; the merged map
//! is then deserialized into [`PackageConfig`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{PackageError, PackageResult};
use crate::resource::ResourceSpec;

/// Key sets a declared configuration is validated against.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSchema {
    pub required: BTreeSet<String>,
    pub defaults: Map<String, Value>,
    pub functional: BTreeSet<String>,
}

impl ConfigSchema {
    /// Schema for package `config.json` files.
    pub fn package() -> Self {
        let required = ["name", "version", "license"];
        let defaults = json!({
            "requirements": {},
            "pip_requirements": [],
            "external_requirements": [],
            "conflicts_with": {},
            "command_arguments": [],
            "pre_processors": [],
            "parser": null,
            "compilers": [],
            "linkers": [],
            "tags": {},
            "substitutions": null,
            "post_processors": [],
            "renderer": null,
            "config": null,
            "template": null,
            "static": [],
            "styles": [],
            "scripts": [],
            "readme": "readme.rst",
            "credits": "credits.txt",
            "final": [],
        });
        let functional = [
            "command_arguments",
            "pre_processors",
            "parser",
            "compilers",
            "linkers",
            "tags",
            "substitutions",
            "post_processors",
            "renderer",
            "config",
            "template",
            "static",
            "styles",
            "scripts",
        ];
        Self {
            required: required.iter().map(|k| k.to_string()).collect(),
            defaults: match defaults {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            functional: functional.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Python-style truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Add defaults for all keys that have them, after checking that there are no
/// unknown keys and that every required key is present.
///
/// Checks run in order and each failure names exactly the offending keys:
/// unknown keys, missing required keys, `substitutions` (unsupported), then
/// functional emptiness.
pub fn config_add_defaults(
    package: &str,
    declared: &Map<String, Value>,
    schema: &ConfigSchema,
) -> PackageResult<Map<String, Value>> {
    let unknown: Vec<&str> = declared
        .keys()
        .filter(|k| !schema.required.contains(*k) && !schema.defaults.contains_key(*k))
        .map(String::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !unknown.is_empty() {
        return Err(PackageError::invalid_config(
            package,
            format!(
                "unknown configuration parameter(s): {}",
                unknown.join(", ")
            ),
        ));
    }

    let missing: Vec<&str> = schema
        .required
        .iter()
        .filter(|k| !declared.contains_key(*k))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(PackageError::invalid_config(
            package,
            format!(
                "missing a value for configuration parameter(s): {}",
                missing.join(", ")
            ),
        ));
    }

    let mut merged = schema.defaults.clone();
    for (key, value) in declared {
        merged.insert(key.clone(), value.clone());
    }

    if merged.get("substitutions").is_some_and(|v| !is_empty_value(v)) {
        return Err(PackageError::Unsupported {
            package: package.to_string(),
            feature: "substitutions".to_string(),
        });
    }

    let functional = schema
        .functional
        .iter()
        .any(|k| merged.get(k).is_some_and(|v| !is_empty_value(v)));
    if !schema.functional.is_empty() && !functional {
        let keys: Vec<&str> = schema.functional.iter().map(String::as_str).collect();
        return Err(PackageError::invalid_config(
            package,
            format!(
                "does not have any functionality ({} are all empty)",
                keys.join(", ")
            ),
        ));
    }

    Ok(merged)
}

/// Slots a package can lock against later overrides via `final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalSlot {
    Parser,
    Renderer,
    Template,
    Config,
}

impl std::fmt::Display for FinalSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalSlot::Parser => write!(f, "parser"),
            FinalSlot::Renderer => write!(f, "renderer"),
            FinalSlot::Template => write!(f, "template"),
            FinalSlot::Config => write!(f, "config"),
        }
    }
}

/// A validated package configuration with all defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    pub name: String,
    pub version: String,
    pub license: String,

    /// Other packages this one requires (name -> version range). Not enforced.
    pub requirements: BTreeMap<String, String>,
    pub pip_requirements: Vec<String>,
    pub external_requirements: Vec<String>,
    /// Packages this one conflicts with (name -> version range). Not enforced.
    pub conflicts_with: BTreeMap<String, String>,
    pub command_arguments: Vec<Value>,

    pub pre_processors: Vec<String>,
    pub parser: Option<String>,
    pub compilers: Vec<String>,
    pub linkers: Vec<String>,
    /// Tag name -> import path.
    pub tags: BTreeMap<String, String>,
    pub substitutions: Option<Value>,
    pub post_processors: Vec<String>,
    pub renderer: Option<String>,
    /// Import path of the configuration class.
    pub config: Option<String>,

    pub template: Option<String>,
    #[serde(rename = "static")]
    pub static_files: Vec<ResourceSpec>,
    pub styles: Vec<ResourceSpec>,
    pub scripts: Vec<ResourceSpec>,

    pub readme: String,
    pub credits: String,

    #[serde(rename = "final")]
    pub final_slots: BTreeSet<FinalSlot>,
}

impl PackageConfig {
    /// Validate `declared` against the package schema and build the typed config.
    pub fn from_declared(package: &str, declared: &Map<String, Value>) -> PackageResult<Self> {
        let merged = config_add_defaults(package, declared, &ConfigSchema::package())?;
        serde_json::from_value(Value::Object(merged))
            .map_err(|e| PackageError::invalid_config(package, format!("invalid value: {}", e)))
    }

    pub fn is_final(&self, slot: FinalSlot) -> bool {
        self.final_slots.contains(&slot)
    }
}
