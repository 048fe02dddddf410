//! Key/value configuration handed to extensions
//!
//! Settings are flat, dot-separated keys (`provider.local.state-file`)
//! holding JSON values. Extensions read them in `configure`, which is the
//! only place configuration errors are raised.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Configuration errors raised while configuring an extension
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required key is not set
    #[error("missing required setting '{0}'")]
    Missing(String),

    /// A key is set but its value is unusable
    #[error("invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Ordered key/value settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    values: BTreeMap<String, Value>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Read a string; numbers and booleans are rendered to text.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Some(true)),
                "false" | "no" | "0" => Ok(Some(false)),
                _ => Err(ConfigError::invalid(key, format!("'{s}' is not a boolean"))),
            },
            Some(other) => Err(ConfigError::invalid(key, format!("{other} is not a boolean"))),
        }
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| ConfigError::invalid(key, format!("{n} is not an integer"))),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::invalid(key, format!("'{s}' is not an integer"))),
            Some(other) => Err(ConfigError::invalid(key, format!("{other} is not an integer"))),
        }
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        match self.get_i64(key)? {
            None => Ok(None),
            Some(n) => u64::try_from(n)
                .map(Some)
                .map_err(|_| ConfigError::invalid(key, format!("{n} is negative"))),
        }
    }

    pub fn require_string(&self, key: &str) -> Result<String, ConfigError> {
        self.get_string(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    pub fn require_u64(&self, key: &str) -> Result<u64, ConfigError> {
        self.get_u64(key)?
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    /// Settings under `prefix.`, with the prefix stripped
    pub fn scoped(&self, prefix: &str) -> Self {
        let prefix = format!("{prefix}.");
        Self {
            values: self
                .values
                .iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix(&prefix)
                        .map(|rest| (rest.to_string(), v.clone()))
                })
                .collect(),
        }
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge(mut self, other: &Configuration) -> Self {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
        self
    }
}

impl FromIterator<(String, Value)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Typed access to a documented configuration key
#[derive(Debug, Clone)]
pub struct ConfigProperty<T> {
    pub key: &'static str,
    pub description: &'static str,
    pub default: Option<T>,
}

impl<T> ConfigProperty<T> {
    pub const fn new(key: &'static str, description: &'static str) -> Self {
        Self {
            key,
            description,
            default: None,
        }
    }

    pub fn default_value(mut self, value: T) -> Self {
        self.default = Some(value);
        self
    }
}

impl ConfigProperty<bool> {
    pub fn get(&self, config: &Configuration) -> Result<Option<bool>, ConfigError> {
        Ok(config.get_bool(self.key)?.or(self.default))
    }
}

impl ConfigProperty<u64> {
    pub fn get(&self, config: &Configuration) -> Result<Option<u64>, ConfigError> {
        Ok(config.get_u64(self.key)?.or(self.default))
    }
}

impl ConfigProperty<String> {
    pub fn get(&self, config: &Configuration) -> Option<String> {
        config.get_string(self.key).or_else(|| self.default.clone())
    }
}

/// Whether actual resources missing from the desired set are deleted
pub fn delete_orphans_property() -> ConfigProperty<bool> {
    ConfigProperty::new(
        "delete-orphans",
        "Delete resources present in the backend but absent from the desired set",
    )
    .default_value(false)
}
