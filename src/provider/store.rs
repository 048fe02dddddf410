//! File-backed cluster state for the local provider
//!
//! The whole cluster (topics and ACL bindings) lives in one JSON document.
//! A [`LocalStore`] is a session on that document: every mutation re-reads
//! the file, applies the change and writes it back, so sessions opened by
//! different controllers never overwrite each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

// ============================================================================
// State Structures
// ============================================================================

/// Topic definition as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TopicSpec {
    pub partitions: u32,

    #[serde(default = "default_replicas")]
    pub replicas: u16,

    /// Topic-level configs (`retention.ms`, `cleanup.policy`, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configs: BTreeMap<String, Value>,
}

fn default_replicas() -> u16 {
    1
}

/// One ACL binding; every field is part of its identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AclBinding {
    /// e.g. `User:alice`
    pub principal: String,

    /// `type:name`, e.g. `topic:orders`
    pub resource: String,

    #[serde(default = "default_pattern_type")]
    pub pattern_type: String,

    pub operation: String,

    #[serde(default = "default_permission")]
    pub permission: String,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_pattern_type() -> String {
    "LITERAL".to_string()
}

fn default_permission() -> String {
    "ALLOW".to_string()
}

fn default_host() -> String {
    "*".to_string()
}

impl AclBinding {
    /// Composite identity of the binding
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.principal,
            self.resource,
            self.pattern_type,
            self.operation,
            self.permission,
            self.host
        )
    }

    /// Name given to collected bindings
    pub fn display_name(&self) -> String {
        format!(
            "{}-{}-{}",
            self.principal.replace(':', "-"),
            self.operation.to_lowercase(),
            self.resource.replace(':', "-")
        )
        .to_lowercase()
    }
}

/// Everything the local backend knows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterState {
    #[serde(default)]
    pub topics: BTreeMap<String, TopicSpec>,

    #[serde(default)]
    pub acls: Vec<AclBinding>,

    /// Last time the state was updated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),
}

// ============================================================================
// Store
// ============================================================================

/// Load state from disk, or return default if the file doesn't exist
pub fn read_state(path: &Path) -> Result<ClusterState, StoreError> {
    if !path.exists() {
        log::debug!("State file {} does not exist, using empty state", path.display());
        return Ok(ClusterState::default());
    }

    let content = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(ClusterState::default());
    }

    serde_json::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Serializes read-modify-write cycles of every session in the process
static WRITE_LOCK: Mutex<()> = Mutex::new(());

/// An open session on a state file
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    state: Mutex<ClusterState>,
}

impl LocalStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = read_state(&path)?;
        log::debug!(
            "Opened {} ({} topic(s), {} ACL binding(s))",
            path.display(),
            state.topics.len(),
            state.acls.len()
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// State as of the last read or write of this session
    pub fn snapshot(&self) -> ClusterState {
        self.lock().clone()
    }

    /// Apply `f` to the state currently on disk and persist the result.
    ///
    /// Nothing is written when `f` fails.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&mut ClusterState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _write = WRITE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.lock();
        let mut next = read_state(&self.path)?;
        *state = next.clone();
        let value = f(&mut next)?;
        next.last_updated = Some(Utc::now());
        self.persist(&next)?;
        *state = next;
        Ok(value)
    }

    /// Write to a sibling temp file then rename over the original
    fn persist(&self, state: &ClusterState) -> Result<(), StoreError> {
        let write_err = |source: std::io::Error| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let content = serde_json::to_string_pretty(state).map_err(|e| write_err(e.into()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}
