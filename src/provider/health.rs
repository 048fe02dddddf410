//! Health of the local state file

use super::state_file;
use super::store::read_state;
use declarative::{ConfigError, Configuration, Health, HealthIndicator, HealthStatus};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const NAME: &str = "local";

/// Reports `UP` when the state file is absent or parses, `DOWN` otherwise
#[derive(Debug, Default)]
pub struct LocalStoreHealthIndicator {
    state_file: Option<PathBuf>,
}

impl HealthIndicator for LocalStoreHealthIndicator {
    fn configure(&mut self, config: &Configuration) -> Result<(), ConfigError> {
        // Unset is reported as UNKNOWN rather than failing the registry
        self.state_file = state_file(config).ok();
        Ok(())
    }

    fn get_health(&self, timeout: Duration) -> Health {
        let Some(path) = self.state_file.clone() else {
            return Health {
                name: NAME.to_string(),
                status: HealthStatus::Unknown,
                details: BTreeMap::new(),
            }
            .with_detail("reason", "provider.local.state-file is not set");
        };

        let (tx, rx) = mpsc::channel();
        let probe = path.clone();
        thread::spawn(move || {
            // Receiver may be gone after a timeout
            let _ = tx.send(read_state(&probe));
        });

        let health = match rx.recv_timeout(timeout) {
            Ok(Ok(state)) => Health::up(NAME)
                .with_detail("topics", state.topics.len())
                .with_detail("acls", state.acls.len())
                .with_detail(
                    "last-updated",
                    state.last_updated.map(|t| t.to_rfc3339()),
                ),
            Ok(Err(e)) => Health::down(NAME).with_detail("error", e.to_string()),
            Err(_) => Health {
                name: NAME.to_string(),
                status: HealthStatus::Unknown,
                details: BTreeMap::new(),
            }
            .with_detail("reason", format!("no answer within {}ms", timeout.as_millis())),
        };
        health.with_detail("path", path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::fs;
    use tempfile::TempDir;

    fn indicator(path: &std::path::Path) -> LocalStoreHealthIndicator {
        let mut indicator = LocalStoreHealthIndicator::default();
        indicator
            .configure(&Configuration::new().with("provider.local.state-file", path.to_string_lossy().to_string()))
            .unwrap();
        indicator
    }

    #[test]
    fn test_up_with_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cluster.json");
        fs::write(&path, r#"{"topics": {"orders": {"partitions": 3}}}"#).unwrap();

        let health = indicator(&path).get_health(Duration::from_secs(5));
        assert_eq!(health.status, HealthStatus::Up);
        assert_eq!(health.details["topics"], json!(1));
        assert_eq!(health.details["last-updated"], Value::Null);
    }

    #[test]
    fn test_down_on_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cluster.json");
        fs::write(&path, "[1, 2").unwrap();

        let health = indicator(&path).get_health(Duration::from_secs(5));
        assert_eq!(health.status, HealthStatus::Down);
        assert!(health.details["error"].as_str().unwrap().contains("failed to parse"));
    }

    #[test]
    fn test_unknown_when_unconfigured() {
        let mut indicator = LocalStoreHealthIndicator::default();
        indicator.configure(&Configuration::new()).unwrap();
        let health = indicator.get_health(Duration::from_secs(1));
        assert_eq!(health.status, HealthStatus::Unknown);
    }
}
