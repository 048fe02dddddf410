//! Change computation - diff actual and expected resource collections
//!
//! Resources are matched by a business key (topic name, or a composite for
//! ACL bindings), never by storage identity. Each key yields exactly one
//! [`ResourceChange`]:
//!
//! | expected | actual | result                                    |
//! |----------|--------|-------------------------------------------|
//! | present  | absent | `ADD`                                     |
//! | absent   | present| `DELETE` if orphans are deleted, else none|
//! | present  | present| `UPDATE`, or `NONE` when all fields match |
//! | marked for deletion | present | `DELETE`                     |
//! | marked for deletion | absent  | `NONE`                       |

use crate::resource::{Resource, ResourceType};
use crate::selector::SharedSelector;
use crate::types::{Operation, ResourceChange, StateChange};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Extracts the business key of a resource
pub type KeyFn = Arc<dyn Fn(&Resource) -> String + Send + Sync>;

/// Builds the [`ResourceChange`] for each diff classification
///
/// Kinds with non-trivial field semantics implement this to control which
/// fields appear as [`StateChange`]s.
pub trait ChangeFactory: Send + Sync {
    fn create_change_for_create(&self, expected: &Resource) -> ResourceChange;

    fn create_change_for_update(&self, actual: &Resource, expected: &Resource) -> ResourceChange;

    fn create_change_for_delete(&self, actual: &Resource) -> ResourceChange;

    /// Change for a deletion request whose target is already absent
    fn create_change_for_noop(&self, expected: &Resource) -> ResourceChange {
        ResourceChange {
            resource_type: expected.resource_type(),
            metadata: expected.metadata.clone(),
            operation: Operation::None,
            changes: Vec::new(),
        }
    }
}

/// Default factory: one state change per leaf field of the spec
///
/// Nested objects are flattened to dotted paths (`configs.retention.ms`);
/// arrays are compared as whole values; `null` leaves count as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecChangeFactory;

impl ChangeFactory for SpecChangeFactory {
    fn create_change_for_create(&self, expected: &Resource) -> ResourceChange {
        let changes = flatten_spec(&expected.spec)
            .into_iter()
            .map(|(name, value)| StateChange::added(name, value))
            .collect();
        ResourceChange {
            resource_type: expected.resource_type(),
            metadata: expected.metadata.clone(),
            operation: Operation::Add,
            changes,
        }
    }

    fn create_change_for_update(&self, actual: &Resource, expected: &Resource) -> ResourceChange {
        let mut before = flatten_spec(&actual.spec);
        let mut after = flatten_spec(&expected.spec);
        let fields: BTreeSet<String> = before.keys().chain(after.keys()).cloned().collect();
        let changes: Vec<StateChange> = fields
            .into_iter()
            .map(|name| {
                let b = before.remove(&name);
                let a = after.remove(&name);
                StateChange::new(name, b, a)
            })
            .collect();
        let operation = if changes.iter().any(StateChange::is_changed) {
            Operation::Update
        } else {
            Operation::None
        };
        ResourceChange {
            resource_type: expected.resource_type(),
            metadata: expected.metadata.clone(),
            operation,
            changes,
        }
    }

    fn create_change_for_delete(&self, actual: &Resource) -> ResourceChange {
        let changes = flatten_spec(&actual.spec)
            .into_iter()
            .map(|(name, value)| StateChange::removed(name, value))
            .collect();
        ResourceChange {
            resource_type: actual.resource_type(),
            metadata: actual.metadata.clone(),
            operation: Operation::Delete,
            changes,
        }
    }
}

/// Flatten a spec into dotted leaf paths
pub fn flatten_spec(spec: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into("", spec, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Null => {}
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_into(&path, v, out);
            }
        }
        // Scalars, arrays and empty objects are leaves; a bare scalar spec
        // is recorded under "spec".
        other => {
            let name = if prefix.is_empty() { "spec" } else { prefix };
            out.insert(name.to_string(), other.clone());
        }
    }
}

/// Computes changes between actual and expected resources of one kind
#[derive(Clone)]
pub struct ChangeComputer {
    key_fn: KeyFn,
    factory: Arc<dyn ChangeFactory>,
    delete_orphans: bool,
    orphan_selector: Option<SharedSelector>,
}

impl ChangeComputer {
    pub fn new(key_fn: impl Fn(&Resource) -> String + Send + Sync + 'static) -> Self {
        Self {
            key_fn: Arc::new(key_fn),
            factory: Arc::new(SpecChangeFactory),
            delete_orphans: false,
            orphan_selector: None,
        }
    }

    /// Computer keyed on `metadata.name`
    pub fn by_name() -> Self {
        Self::new(|r| r.metadata.name.clone())
    }

    pub fn with_factory(mut self, factory: impl ChangeFactory + 'static) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    pub fn delete_orphans(mut self, enabled: bool) -> Self {
        self.delete_orphans = enabled;
        self
    }

    /// Only delete orphans the selector accepts.
    ///
    /// `actual` is diffed unfiltered; the selector never turns a present
    /// resource into an `ADD`.
    pub fn select_orphans(mut self, selector: SharedSelector) -> Self {
        self.orphan_selector = Some(selector);
        self
    }

    pub fn key(&self, resource: &Resource) -> String {
        (self.key_fn)(resource)
    }

    /// Diff `actual` against `expected`.
    ///
    /// Output order follows `expected`, then orphans in `actual` order.
    pub fn compute_changes(&self, actual: &[Resource], expected: &[Resource]) -> Vec<ResourceChange> {
        let actual_by_key: HashMap<String, &Resource> =
            actual.iter().map(|r| (self.key(r), r)).collect();

        let mut order: Vec<String> = Vec::with_capacity(expected.len());
        let mut expected_by_key: HashMap<String, &Resource> = HashMap::with_capacity(expected.len());
        for resource in expected {
            let key = self.key(resource);
            if expected_by_key.insert(key.clone(), resource).is_some() {
                log::warn!("Duplicate resource key '{key}' in desired state; last definition wins");
            } else {
                order.push(key);
            }
        }

        let mut changes = Vec::with_capacity(order.len());
        for key in &order {
            let expected = expected_by_key[key];
            let change = match (actual_by_key.get(key), expected.is_marked_for_deletion()) {
                (Some(actual), true) => self.factory.create_change_for_delete(actual),
                (None, true) => self.factory.create_change_for_noop(expected),
                (Some(actual), false) => self.factory.create_change_for_update(actual, expected),
                (None, false) => self.factory.create_change_for_create(expected),
            };
            changes.push(change);
        }

        if self.delete_orphans {
            for resource in actual {
                let key = self.key(resource);
                let selected = self
                    .orphan_selector
                    .as_ref()
                    .is_none_or(|selector| selector.apply(resource));
                if !expected_by_key.contains_key(&key) && selected {
                    changes.push(self.factory.create_change_for_delete(resource));
                }
            }
        }

        changes
    }
}

impl std::fmt::Debug for ChangeComputer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeComputer")
            .field("delete_orphans", &self.delete_orphans)
            .field(
                "orphan_selector",
                &self.orphan_selector.as_ref().map(|s| s.name()),
            )
            .finish_non_exhaustive()
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub additions: usize,
    pub updates: usize,
    pub deletions: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    pub fn from_changes(changes: &[ResourceChange]) -> Self {
        let mut summary = Self::default();
        for change in changes {
            match change.operation {
                Operation::Add => summary.additions += 1,
                Operation::Update => summary.updates += 1,
                Operation::Delete => summary.deletions += 1,
                Operation::None => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Total number of changes (excluding unchanged resources)
    pub fn total(&self) -> usize {
        self.additions + self.updates + self.deletions
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group changes by resource type
pub fn group_by_type(changes: &[ResourceChange]) -> BTreeMap<ResourceType, Vec<&ResourceChange>> {
    let mut groups: BTreeMap<ResourceType, Vec<&ResourceChange>> = BTreeMap::new();
    for change in changes {
        groups
            .entry(change.resource_type.clone())
            .or_default()
            .push(change);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::annotations;
    use serde_json::json;

    fn topic(name: &str, partitions: u64) -> Resource {
        Resource::new(
            "kafka.streamform.io/v1",
            "KafkaTopic",
            name,
            json!({"partitions": partitions, "replicas": 1}),
        )
    }

    fn ops(changes: &[ResourceChange]) -> Vec<(&str, Operation)> {
        changes.iter().map(|c| (c.name(), c.operation)).collect()
    }

    #[test]
    fn test_classification_with_orphan_deletion() {
        let actual = vec![topic("both-same", 3), topic("both-diff", 3), topic("orphan", 1)];
        let expected = vec![topic("both-same", 3), topic("both-diff", 6), topic("new", 2)];
        let changes = ChangeComputer::by_name()
            .delete_orphans(true)
            .compute_changes(&actual, &expected);
        assert_eq!(
            ops(&changes),
            vec![
                ("both-same", Operation::None),
                ("both-diff", Operation::Update),
                ("new", Operation::Add),
                ("orphan", Operation::Delete),
            ]
        );
    }

    #[test]
    fn test_orphans_kept_by_default() {
        let actual = vec![topic("orphan", 1)];
        let changes = ChangeComputer::by_name().compute_changes(&actual, &[topic("t", 1)]);
        assert!(changes.iter().all(|c| c.operation != Operation::Delete));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_orphans_scoped_by_selector() {
        use crate::selector::LabelSelector;

        let actual = vec![
            topic("kept", 1).with_label("env", "dev"),
            topic("gone", 1).with_label("env", "prod"),
            topic("unlabeled", 1),
        ];
        let changes = ChangeComputer::by_name()
            .delete_orphans(true)
            .select_orphans(Arc::new(LabelSelector::parse("env=prod").unwrap()))
            .compute_changes(&actual, &[topic("t", 1)]);
        assert_eq!(
            ops(&changes),
            [("t", Operation::Add), ("gone", Operation::Delete)]
        );
    }

    #[test]
    fn test_idempotence() {
        let expected = vec![topic("a", 1), topic("b", 2), topic("c", 3)];
        let changes = ChangeComputer::by_name()
            .delete_orphans(true)
            .compute_changes(&expected, &expected);
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|c| c.operation == Operation::None));
    }

    #[test]
    fn test_update_field_level_changes() {
        let changes = ChangeComputer::by_name().compute_changes(&[topic("t1", 3)], &[topic("t1", 6)]);
        let change = &changes[0];
        assert_eq!(change.operation, Operation::Update);
        let partitions = change.change("partitions").unwrap();
        assert_eq!(partitions.before, Some(json!(3)));
        assert_eq!(partitions.after, Some(json!(6)));
        assert!(!change.change("replicas").unwrap().is_changed());
    }

    #[test]
    fn test_delete_annotation_overrides_update() {
        let expected = topic("t1", 6).with_annotation(annotations::DELETE, true);
        let changes = ChangeComputer::by_name().compute_changes(&[topic("t1", 3)], &[expected]);
        assert_eq!(ops(&changes), vec![("t1", Operation::Delete)]);
        assert_eq!(changes[0].change("partitions").unwrap().before, Some(json!(3)));
    }

    #[test]
    fn test_delete_annotation_without_actual_is_noop() {
        let expected = topic("gone", 1).with_annotation(annotations::DELETE, true);
        let changes = ChangeComputer::by_name().compute_changes(&[], &[expected]);
        assert_eq!(ops(&changes), vec![("gone", Operation::None)]);
    }

    #[test]
    fn test_integer_and_float_compare_equal() {
        let actual = Resource::new("g/v1", "K", "k", json!({"ratio": 1}));
        let expected = Resource::new("g/v1", "K", "k", json!({"ratio": 1.0}));
        let changes = ChangeComputer::by_name().compute_changes(&[actual], &[expected]);
        assert_eq!(changes[0].operation, Operation::None);
    }

    #[test]
    fn test_composite_key() {
        let acl = |principal: &str, op: &str| {
            Resource::new(
                "kafka.streamform.io/v1",
                "KafkaAcl",
                format!("{principal}-{op}"),
                json!({"principal": principal, "operation": op}),
            )
        };
        let computer = ChangeComputer::new(|r| {
            format!(
                "{}:{}",
                r.spec["principal"].as_str().unwrap_or_default(),
                r.spec["operation"].as_str().unwrap_or_default()
            )
        });
        // Same binding under a different display name is still the same key
        let actual = vec![acl("User:a", "READ").with_name("renamed")];
        let changes = computer.compute_changes(&actual, &[acl("User:a", "READ")]);
        assert_eq!(changes[0].operation, Operation::None);
    }

    #[test]
    fn test_flatten_nested_configs() {
        let flat = flatten_spec(&json!({
            "partitions": 3,
            "configs": {"retention.ms": 1000, "cleanup.policy": "delete"},
            "tags": ["a", "b"],
            "unset": null
        }));
        assert_eq!(flat["configs.retention.ms"], json!(1000));
        assert_eq!(flat["tags"], json!(["a", "b"]));
        assert!(!flat.contains_key("unset"));
    }

    #[test]
    fn test_diff_summary() {
        let changes = ChangeComputer::by_name()
            .delete_orphans(true)
            .compute_changes(&[topic("a", 1), topic("b", 1)], &[topic("a", 2), topic("c", 1)]);
        let summary = DiffSummary::from_changes(&changes);
        assert_eq!(summary.additions, 1);
        assert_eq!(summary.updates, 1);
        assert_eq!(summary.deletions, 1);
        assert!(summary.has_changes());
        assert_eq!(group_by_type(&changes).len(), 1);
    }
}
