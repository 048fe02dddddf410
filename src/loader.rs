//! Resource file loading
//!
//! JSON files hold one resource or an array of them. YAML files may hold
//! several `---` separated documents, each one resource or a sequence.
//! Directories are walked recursively for `.json`, `.yaml` and `.yml` files.

use anyhow::{Context, Result, bail};
use declarative::Resource;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Load every resource from `paths`, in argument then file-name order
pub fn load_resources(paths: &[PathBuf]) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for path in paths {
        for file in expand(path)? {
            let loaded = load_file(&file)?;
            log::debug!("Loaded {} resource(s) from {}", loaded.len(), file.display());
            resources.extend(loaded);
        }
    }
    Ok(resources)
}

fn expand(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("{} does not exist", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Could not walk {}", path.display()))?;
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| EXTENSIONS.contains(&e));
        if entry.file_type().is_file() && matches {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

pub fn load_file(path: &Path) -> Result<Vec<Resource>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    if is_json(path) {
        parse_json(&content).with_context(|| format!("Invalid resource file {}", path.display()))
    } else {
        parse_yaml(&content).with_context(|| format!("Invalid resource file {}", path.display()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Resource>),
    One(Box<Resource>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<Resource> {
        match self {
            Self::Many(resources) => resources,
            Self::One(resource) => vec![*resource],
        }
    }
}

pub fn parse_json(content: &str) -> Result<Vec<Resource>> {
    let parsed: OneOrMany = serde_json::from_str(content)?;
    Ok(parsed.into_vec())
}

pub fn parse_yaml(content: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for (i, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("document {}", i + 1))?;
        if value.is_null() {
            continue;
        }
        let parsed: OneOrMany =
            serde_yaml::from_value(value).with_context(|| format!("document {}", i + 1))?;
        resources.extend(parsed.into_vec());
    }
    Ok(resources)
}
