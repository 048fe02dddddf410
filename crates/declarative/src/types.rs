//! Core types for change computation and execution

use crate::resource::{ObjectMeta, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Operation needed to converge one resource or one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Add,
    Update,
    Delete,
    None,
}

impl Operation {
    /// Derive an operation from the presence of a before/after pair
    pub fn from_presence(before: bool, after: bool) -> Self {
        match (before, after) {
            (false, true) => Self::Add,
            (true, false) => Self::Delete,
            (true, true) => Self::Update,
            (false, false) => Self::None,
        }
    }

    /// Whether applying this operation mutates the backend
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "ADD"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Before/after pair for one named field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

impl StateChange {
    pub fn new(name: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            name: name.into(),
            before,
            after,
        }
    }

    pub fn added(name: impl Into<String>, after: Value) -> Self {
        Self::new(name, None, Some(after))
    }

    pub fn removed(name: impl Into<String>, before: Value) -> Self {
        Self::new(name, Some(before), None)
    }

    /// Field-level operation: equal present values are `None`
    pub fn operation(&self) -> Operation {
        match (&self.before, &self.after) {
            (Some(before), Some(after)) if values_equal(before, after) => Operation::None,
            (before, after) => Operation::from_presence(before.is_some(), after.is_some()),
        }
    }

    pub fn is_changed(&self) -> bool {
        self.operation() != Operation::None
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<Value>| v.as_ref().map_or_else(|| "<none>".to_string(), Value::to_string);
        write!(f, "{}: {} -> {}", self.name, show(&self.before), show(&self.after))
    }
}

/// Exact value equality, with integers and floats of the same value equal.
///
/// No epsilon: configuration values are discrete, so `1.0 != 1.0000001`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x == y {
                return true;
            }
            match (x.as_i64(), y.as_i64(), x.as_u64(), y.as_u64()) {
                (Some(i), Some(j), _, _) => i == j,
                (_, _, Some(i), Some(j)) => i == j,
                _ => x.as_f64() == y.as_f64(),
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Diff output for one resource identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChange {
    pub resource_type: ResourceType,
    pub metadata: ObjectMeta,
    pub operation: Operation,
    #[serde(default)]
    pub changes: Vec<StateChange>,
}

impl ResourceChange {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Identity of the change (`Kind/name`), used to key results
    pub fn key(&self) -> String {
        format!("{}/{}", self.resource_type.kind, self.metadata.name)
    }

    pub fn change(&self, field: &str) -> Option<&StateChange> {
        self.changes.iter().find(|c| c.name == field)
    }

    /// Field values after the change; removed fields are omitted
    pub fn after_values(&self) -> BTreeMap<&str, &Value> {
        self.changes
            .iter()
            .filter_map(|c| c.after.as_ref().map(|v| (c.name.as_str(), v)))
            .collect()
    }

    /// Field changes that actually differ
    pub fn effective_changes(&self) -> impl Iterator<Item = &StateChange> {
        self.changes.iter().filter(|c| c.is_changed())
    }

    /// One-line text for plans and dry runs
    pub fn describe(&self) -> String {
        let verb = match self.operation {
            Operation::Add => "Create",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
            Operation::None => "Unchanged",
        };
        let fields: Vec<String> = self.effective_changes().map(ToString::to_string).collect();
        if fields.is_empty() || self.operation != Operation::Update {
            format!("{verb} {}", self.key())
        } else {
            format!("{verb} {} ({})", self.key(), fields.join(", "))
        }
    }
}

/// Terminal status of an attempted change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeStatus {
    /// The backend was (or in dry-run, would be) changed
    Changed,
    /// The change could not be applied
    Failed,
    /// Nothing needed to change
    Ok,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changed => write!(f, "CHANGED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Ok => write!(f, "OK"),
        }
    }
}

/// Response of a handler for one change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeResponse {
    /// Optional backend detail (e.g. the created resource id)
    pub message: Option<String>,
}

impl ChangeResponse {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

/// Outcome of applying one [`ResourceChange`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub change: ResourceChange,
    pub status: ChangeStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub description: String,
    #[serde(default)]
    pub dry_run: bool,
}

impl ChangeResult {
    pub fn changed(change: ResourceChange, description: String) -> Self {
        Self {
            change,
            status: ChangeStatus::Changed,
            errors: Vec::new(),
            description,
            dry_run: false,
        }
    }

    pub fn ok(change: ResourceChange, description: String) -> Self {
        Self {
            change,
            status: ChangeStatus::Ok,
            errors: Vec::new(),
            description,
            dry_run: false,
        }
    }

    pub fn failed(change: ResourceChange, description: String, error: impl Into<String>) -> Self {
        Self {
            change,
            status: ChangeStatus::Failed,
            errors: vec![error.into()],
            description,
            dry_run: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != ChangeStatus::Failed
    }

    pub fn is_change(&self) -> bool {
        self.status == ChangeStatus::Changed
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub ok: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    pub fn from_results(results: &[ChangeResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_result(result);
        }
        summary
    }

    /// Total number of changes applied
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn total(&self) -> usize {
        self.total_changes() + self.ok + self.failed
    }

    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.ok += other.ok;
        self.failed += other.failed;
    }

    pub fn add_result(&mut self, result: &ChangeResult) {
        match (result.status, result.change.operation) {
            (ChangeStatus::Failed, _) => self.failed += 1,
            (ChangeStatus::Ok, _) | (ChangeStatus::Changed, Operation::None) => self.ok += 1,
            (ChangeStatus::Changed, Operation::Add) => self.created += 1,
            (ChangeStatus::Changed, Operation::Update) => self.updated += 1,
            (ChangeStatus::Changed, Operation::Delete) => self.deleted += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Describe changes without applying them
    pub dry_run: bool,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Upper bound on waiting for outstanding changes
    pub timeout: Option<Duration>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_change_operations() {
        assert_eq!(StateChange::new("f", None, None).operation(), Operation::None);
        assert_eq!(StateChange::added("f", json!(1)).operation(), Operation::Add);
        assert_eq!(StateChange::removed("f", json!(1)).operation(), Operation::Delete);
        assert_eq!(
            StateChange::new("f", Some(json!(3)), Some(json!(6))).operation(),
            Operation::Update
        );
        assert_eq!(
            StateChange::new("f", Some(json!(3)), Some(json!(3))).operation(),
            Operation::None
        );
    }

    #[test]
    fn test_values_equal_numbers() {
        assert!(values_equal(&json!(3), &json!(3.0)));
        assert!(!values_equal(&json!(0.1), &json!(0.1000001)));
        assert!(values_equal(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2]})));
        assert!(!values_equal(&json!("3"), &json!(3)));
    }

    #[test]
    fn test_summary_counts() {
        let change = |op| ResourceChange {
            resource_type: ResourceType::new("g", "v1", "K"),
            metadata: ObjectMeta::default(),
            operation: op,
            changes: vec![],
        };
        let results = vec![
            ChangeResult::changed(change(Operation::Add), String::new()),
            ChangeResult::changed(change(Operation::Update), String::new()),
            ChangeResult::ok(change(Operation::None), String::new()),
            ChangeResult::failed(change(Operation::Delete), String::new(), "boom"),
        ];
        let summary = ExecuteSummary::from_results(&results);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_describe_update_lists_fields() {
        let change = ResourceChange {
            resource_type: ResourceType::new("g", "v1", "KafkaTopic"),
            metadata: ObjectMeta {
                name: "t1".into(),
                ..ObjectMeta::default()
            },
            operation: Operation::Update,
            changes: vec![
                StateChange::new("partitions", Some(json!(3)), Some(json!(6))),
                StateChange::new("replicas", Some(json!(1)), Some(json!(1))),
            ],
        };
        assert_eq!(change.describe(), "Update KafkaTopic/t1 (partitions: 3 -> 6)");
    }
}
