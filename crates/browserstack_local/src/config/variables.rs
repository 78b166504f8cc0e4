//! Variables file schema: the `BrowserStackLocal` section of a YAML/JSON file

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level key holding the tunnel options in a variables file
pub const VARIABLES_SECTION: &str = "BrowserStackLocal";

/// Option values can be strings, booleans, or numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ConfigValue {
    /// Convert to string representation
    pub fn as_str(&self) -> String {
        match self {
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Int(i) => i.to_string(),
            ConfigValue::Float(f) => f.to_string(),
            ConfigValue::String(s) => s.clone(),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

/// Tunnel options read from variables files, in file order.
///
/// A `None` value (`~` in YAML, `null` in JSON) is a flag without a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(IndexMap<String, Option<ConfigValue>>);

impl Variables {
    /// Create empty variables
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an option
    pub fn with(mut self, key: impl Into<String>, value: Option<ConfigValue>) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Load the `BrowserStackLocal` section from a YAML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse the `BrowserStackLocal` section from a YAML (or JSON) string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(content)?;

        let section = match raw {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(ref map) => map.get(VARIABLES_SECTION),
            _ => {
                return Err(ConfigError::InvalidSection(
                    "variables file must contain a mapping".to_string(),
                ))
            }
        };

        match section {
            None | Some(serde_yaml::Value::Null) => Ok(Self::default()),
            Some(value @ serde_yaml::Value::Mapping(_)) => {
                Ok(serde_yaml::from_value(value.clone())?)
            }
            Some(_) => Err(ConfigError::InvalidSection(format!(
                "'{}' must be a mapping of options",
                VARIABLES_SECTION
            ))),
        }
    }

    /// Load and merge several variables files; later files take precedence
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut variables = Self::default();
        for path in paths {
            log::debug!("Loading variables file: {}", path.as_ref().display());
            variables.merge(Self::from_file(path)?);
        }
        Ok(variables)
    }

    /// Overwrite options with those from `other`, keeping first-seen order
    pub fn merge(&mut self, other: Variables) {
        self.0.extend(other.0);
    }

    /// Iterate options in file order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<ConfigValue>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Errors that can occur while reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read variables file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse variables file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid variables section: {0}")]
    InvalidSection(String),

    #[error("Option name '{0}' is empty after normalization")]
    EmptyKey(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
