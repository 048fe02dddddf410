//! Actions for the local provider

use super::acl::acl_resource;
use super::state_file;
use super::store::LocalStore;
use super::topic::topic_resource;
use anyhow::Result;
use declarative::{Action, ActionOutcome, Configuration};

/// Dumps the current cluster state as resources
///
/// The output can be saved and fed back to `apply` to reproduce the state.
#[derive(Debug, Default)]
pub struct LocalSnapshotAction;

impl Action for LocalSnapshotAction {
    fn execute(&self, config: &Configuration) -> Result<ActionOutcome> {
        let path = state_file(config)?;
        let state = LocalStore::open(&path)?.snapshot();

        let mut resources = Vec::with_capacity(state.topics.len() + state.acls.len());
        for (name, spec) in &state.topics {
            resources.push(topic_resource(name, spec)?);
        }
        for binding in &state.acls {
            resources.push(acl_resource(binding)?);
        }

        Ok(ActionOutcome {
            message: format!(
                "{} topic(s) and {} ACL binding(s) in {}",
                state.topics.len(),
                state.acls.len(),
                path.display()
            ),
            resources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_lists_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cluster.json");
        fs::write(
            &path,
            r#"{
                "topics": {"orders": {"partitions": 3}, "audit": {"partitions": 1}},
                "acls": [{"principal": "User:alice", "resource": "topic:orders", "operation": "READ"}]
            }"#,
        )
        .unwrap();

        let config = Configuration::new().with("provider.local.state-file", path.to_string_lossy().to_string());
        let outcome = LocalSnapshotAction.execute(&config).unwrap();
        assert!(outcome.message.starts_with("2 topic(s) and 1 ACL binding(s)"));
        let keys: Vec<_> = outcome.resources.iter().map(|r| r.key()).collect();
        assert_eq!(
            keys,
            ["KafkaTopic/audit", "KafkaTopic/orders", "KafkaAcl/user-alice-read-topic-orders"]
        );
    }

    #[test]
    fn test_snapshot_requires_state_file() {
        assert!(LocalSnapshotAction.execute(&Configuration::new()).is_err());
    }
}
