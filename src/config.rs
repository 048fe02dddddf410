//! Configuration file loading
//!
//! The file is TOML; nested tables flatten to dotted keys, so
//!
//! ```toml
//! topic-min-partitions = 3
//!
//! [provider.local]
//! state-file = "~/kafka/cluster.json"
//! ```
//!
//! yields `topic-min-partitions` and `provider.local.state-file`.

use anyhow::{Context, Result, bail};
use declarative::Configuration;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATE_FILE: &str = "~/.local/state/streamform/cluster.json";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("streamform"))
}

/// Load configuration from `explicit`, or from the default location if it exists
pub fn load(explicit: Option<&Path>, overrides: &[String]) -> Result<Configuration> {
    let mut config = Configuration::new().with("provider.local.state-file", DEFAULT_STATE_FILE);

    match explicit {
        Some(path) => {
            config = config.merge(&load_file(path)?);
        }
        None => {
            let path = config_dir()?.join("config.toml");
            if path.exists() {
                config = config.merge(&load_file(&path)?);
            } else {
                log::debug!("No config file at {}", path.display());
            }
        }
    }

    for entry in overrides {
        let (key, value) = parse_override(entry)?;
        config.set(key, value);
    }
    Ok(config)
}

/// Read one TOML file into a flat configuration
pub fn load_file(path: &Path) -> Result<Configuration> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let table: toml::Table = toml::from_str(&content)
        .with_context(|| format!("Invalid TOML in {}", path.display()))?;
    let value = serde_json::to_value(table).context("Failed to convert configuration")?;

    let mut config = Configuration::new();
    flatten("", &value, &mut config);
    log::debug!("Loaded {} setting(s) from {}", config.iter().count(), path.display());
    Ok(config)
}

fn flatten(prefix: &str, value: &Value, config: &mut Configuration) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, config);
            }
        }
        other => config.set(prefix, other.clone()),
    }
}

/// Parse a `--set key=value` override.
///
/// Values that parse as JSON scalars (`3`, `true`) keep their type; anything
/// else is a string.
pub fn parse_override(entry: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = entry.split_once('=') else {
        bail!("Invalid override '{entry}', expected KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid override '{entry}', key is empty");
    }
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Bool(_) | Value::Number(_))) => v,
        _ => Value::String(raw.to_string()),
    };
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_nested_tables_flatten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
topic-min-partitions = 3
delete-orphans = true

[provider.local]
state-file = "/tmp/cluster.json"
"#,
        )
        .unwrap();

        let config = load(Some(&path), &["topic-name-regex=[a-z.]+".to_string()]).unwrap();
        assert_eq!(config.get_u64("topic-min-partitions").unwrap(), Some(3));
        assert_eq!(config.get_bool("delete-orphans").unwrap(), Some(true));
        assert_eq!(
            config.get_string("provider.local.state-file").as_deref(),
            Some("/tmp/cluster.json")
        );
        assert_eq!(config.get_string("topic-name-regex").as_deref(), Some("[a-z.]+"));
    }

    #[test]
    fn test_state_file_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.toml");
        fs::write(&path, "").unwrap();
        let config = load(Some(&path), &[]).unwrap();
        assert_eq!(
            config.get_string("provider.local.state-file").as_deref(),
            Some(DEFAULT_STATE_FILE)
        );
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(parse_override("a=3").unwrap(), ("a".into(), json!(3)));
        assert_eq!(parse_override("a=true").unwrap(), ("a".into(), json!(true)));
        assert_eq!(parse_override("a=x=y").unwrap(), ("a".into(), json!("x=y")));
        assert_eq!(parse_override("a=[1]").unwrap(), ("a".into(), json!("[1]")));
        assert!(parse_override("novalue").is_err());
        assert!(parse_override("=3").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml")), &[]).is_err());
    }
}
