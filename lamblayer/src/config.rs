//! Layer metadata and package spec configuration files.
//!
//! Two JSON shapes drive a layer build. The layer config names the layer and
//! its compatible runtimes:
//!
//! ```json
//! {"LayerName": "numpy", "Description": "numpy 1.26", "CompatibleRuntimes": ["python3.12"], "LicenseInfo": "BSD"}
//! ```
//!
//! The package spec asks the remote build service for a dependency bundle:
//!
//! ```json
//! {"Arch": "x86_64", "Runtime": "python3.12", "Packages": ["numpy", "pandas"], "No_deps": 0}
//! ```
//!
//! Both are inspected as raw [`serde_json::Value`]s so that a field with the
//! wrong type is reported with its name, its actual value and JSON type, and
//! the types that would have been accepted.

use crate::error::{LamblayerError, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Separator used when a list of packages is folded into one URL segment.
pub const PACKAGE_SEPARATOR: &str = "&";

/// Layer metadata passed through to the publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerConfig {
    /// Layer name (`LayerName`).
    pub name: String,
    /// Free-form description (`Description`).
    pub description: Option<String>,
    /// Runtime identifiers the layer supports (`CompatibleRuntimes`).
    pub compatible_runtimes: Vec<String>,
    /// License identifier or URL (`LicenseInfo`).
    pub license_info: Option<String>,
}

impl LayerConfig {
    /// Load and validate a layer config file.
    ///
    /// # Errors
    ///
    /// Returns [`LamblayerError::ConfigRead`] or [`LamblayerError::ConfigParse`]
    /// when the file cannot be loaded, and [`LamblayerError::ParamValidation`]
    /// when a field is missing or has the wrong type.
    pub fn load(path: &Path) -> Result<Self> {
        let root = read_json_object(path)?;
        Self::from_json(&root)
    }

    /// Validate an already-parsed layer config object.
    ///
    /// # Errors
    ///
    /// Returns [`LamblayerError::ParamValidation`] for a missing or mistyped
    /// field.
    pub fn from_json(root: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            name: required_string(root, "LayerName")?,
            description: optional_string(root, "Description")?,
            compatible_runtimes: string_list(root, "CompatibleRuntimes")?,
            license_info: optional_string(root, "LicenseInfo")?,
        })
    }
}

/// Request parameters for a remote dependency bundle build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Target architecture (`Arch`), e.g. `x86_64` or `arm64`.
    pub arch: String,
    /// Target runtime (`Runtime`), e.g. `python3.12`.
    pub runtime: String,
    /// Package requirements joined with [`PACKAGE_SEPARATOR`] (`Packages`).
    pub packages: String,
    /// Build without transitive dependencies (`No_deps`).
    pub skip_dependencies: bool,
}

impl PackageSpec {
    /// Load and validate a package spec file.
    ///
    /// # Errors
    ///
    /// Returns [`LamblayerError::ConfigRead`] or [`LamblayerError::ConfigParse`]
    /// when the file cannot be loaded, and [`LamblayerError::ParamValidation`]
    /// when a field is missing or has the wrong type.
    pub fn load(path: &Path) -> Result<Self> {
        let root = read_json_object(path)?;
        Self::from_json(&root)
    }

    /// Validate an already-parsed package spec object.
    ///
    /// # Errors
    ///
    /// Returns [`LamblayerError::ParamValidation`] for a missing or mistyped
    /// field.
    ///
    /// # Examples
    ///
    /// ```
    /// use lamblayer::config::PackageSpec;
    ///
    /// let json = serde_json::json!({
    ///     "Arch": "x86_64",
    ///     "Runtime": "python3.12",
    ///     "Packages": ["a", "b", "c"],
    /// });
    /// let spec = PackageSpec::from_json(json.as_object().expect("object")).expect("valid");
    /// assert_eq!(spec.packages, "a&b&c");
    /// assert!(!spec.skip_dependencies);
    /// ```
    pub fn from_json(root: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            arch: required_string(root, "Arch")?,
            runtime: required_string(root, "Runtime")?,
            packages: joined_packages(root, "Packages")?,
            skip_dependencies: no_deps_flag(root, "No_deps")?,
        })
    }

    /// The `no-deps` query value understood by the build service.
    #[must_use]
    pub const fn no_deps_param(&self) -> &'static str {
        if self.skip_dependencies { "1" } else { "0" }
    }
}

fn read_json_object(path: &Path) -> Result<Map<String, Value>> {
    let contents =
        std::fs::read_to_string(path).map_err(|source| LamblayerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
    let value: Value =
        serde_json::from_str(&contents).map_err(|source| LamblayerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(invalid("<root>", Some(&other), "object")),
    }
}

fn required_string(root: &Map<String, Value>, key: &str) -> Result<String> {
    match root.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        other => Err(invalid(key, other, "string")),
    }
}

fn optional_string(root: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        other => Err(invalid(key, other, "string")),
    }
}

fn string_list(root: &Map<String, Value>, key: &str) -> Result<Vec<String>> {
    let value = root.get(key);
    let Some(Value::Array(items)) = value else {
        return Err(invalid(key, value, "list of string"));
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(text) => Ok(text.clone()),
            _ => Err(invalid(key, value, "list of string")),
        })
        .collect()
}

fn joined_packages(root: &Map<String, Value>, key: &str) -> Result<String> {
    const EXPECTED: &str = "string, list of string";
    let value = root.get(key);
    let joined = match value {
        Some(Value::String(single)) => single.clone(),
        Some(Value::Array(_)) => {
            let items = string_list(root, key).map_err(|_| invalid(key, value, EXPECTED))?;
            // A blank item would leave an empty segment between separators
            if items.iter().any(|item| item.trim().is_empty()) {
                return Err(invalid(key, value, EXPECTED));
            }
            items.join(PACKAGE_SEPARATOR)
        }
        _ => return Err(invalid(key, value, EXPECTED)),
    };
    if joined.trim().is_empty() {
        return Err(invalid(key, value, EXPECTED));
    }
    Ok(joined)
}

fn no_deps_flag(root: &Map<String, Value>, key: &str) -> Result<bool> {
    let value = root.get(key);
    match value {
        None => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(Value::Number(number)) if number.is_i64() || number.is_u64() => {
            Ok(number.as_i64() != Some(0))
        }
        _ => Err(invalid(key, value, "integer")),
    }
}

fn invalid(param: &str, value: Option<&Value>, expected: &'static str) -> LamblayerError {
    LamblayerError::ParamValidation {
        param: param.to_owned(),
        value: value.map_or_else(|| "None".to_owned(), Value::to_string),
        actual_type: value.map_or("missing", json_type_name),
        expected,
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
