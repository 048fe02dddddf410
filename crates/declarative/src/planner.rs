//! Reconciliation planner - runs the pipeline and builds execution plans
//!
//! Desired resources flow through the converter and transformation chains,
//! are filtered by the selector and validated, then grouped per resource
//! type and handed to the controller resolved for that type.

use crate::chain::{ConverterChain, TransformationChain, ValidationChain};
use crate::context::ReconcileContext;
use crate::diff::DiffSummary;
use crate::error::{Error, Result};
use crate::extension::{Controller, ExtensionCategory};
use crate::registry::ExtensionRegistry;
use crate::resource::{Resource, ResourceList, ResourceType};
use crate::types::{ChangeResult, ResourceChange};
use std::sync::Arc;

/// Changes for one resource type, bound to the controller that planned them
pub struct PlannedGroup {
    pub resource_type: ResourceType,
    pub controller_name: String,
    controller: Arc<dyn Controller>,
    pub changes: Vec<ResourceChange>,
}

impl std::fmt::Debug for PlannedGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedGroup")
            .field("resource_type", &self.resource_type)
            .field("controller_name", &self.controller_name)
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}

/// An execution plan with changes grouped by resource type
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    pub groups: Vec<PlannedGroup>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// All changes, in plan order
    pub fn changes(&self) -> impl Iterator<Item = &ResourceChange> {
        self.groups.iter().flat_map(|g| g.changes.iter())
    }

    pub fn into_changes(self) -> Vec<ResourceChange> {
        self.groups.into_iter().flat_map(|g| g.changes).collect()
    }

    pub fn summary(&self) -> DiffSummary {
        let changes: Vec<ResourceChange> = self.changes().cloned().collect();
        DiffSummary::from_changes(&changes)
    }

    /// Total number of changes in the plan
    pub fn total_changes(&self) -> usize {
        self.groups.iter().map(|g| g.changes.len()).sum()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.changes.is_empty())
    }

    /// Filter plan to only include changes matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&ResourceChange) -> bool,
    {
        Self {
            groups: self
                .groups
                .into_iter()
                .map(|mut g| {
                    g.changes.retain(|c| predicate(c));
                    g
                })
                .filter(|g| !g.changes.is_empty())
                .collect(),
        }
    }

    /// Filter plan to only include changes matching a target pattern
    ///
    /// Target format: "Kind" or "Kind.name" (kind is case-insensitive)
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (kind, name) = parse_target(t);
                self.filter(|c| matches_filter(c, &kind, name.as_deref()))
            }
        }
    }
}

/// Parse a target string like "Kind.name" into (kind, name).
///
/// Only the first dot separates; topic names may contain dots.
fn parse_target(target: &str) -> (String, Option<String>) {
    match target.split_once('.') {
        Some((kind, name)) => (kind.to_string(), Some(name.to_string())),
        None => (target.to_string(), None),
    }
}

fn matches_filter(change: &ResourceChange, kind: &str, name: Option<&str>) -> bool {
    if !change.resource_type.kind.eq_ignore_ascii_case(kind) {
        return false;
    }
    name.is_none_or(|n| change.name() == n)
}

/// Drives the reconciliation pipeline against a registry
#[derive(Debug, Clone)]
pub struct Reconciler {
    registry: Arc<ExtensionRegistry>,
}

impl Reconciler {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// Run converters and transformations, apply the selector, then validate.
    ///
    /// Resources the selector excludes are never validated.
    pub fn prepare(&self, resources: Vec<Resource>, ctx: &ReconcileContext) -> Result<Vec<Resource>> {
        let config = &ctx.configuration;
        let count = resources.len();

        let converted = ConverterChain::from_registry(&self.registry, config)?.apply(resources)?;
        let transformed = TransformationChain::from_registry(&self.registry, config)?.apply(converted)?;

        let selected: Vec<Resource> = transformed
            .into_iter()
            .filter(|r| ctx.selector.apply(r))
            .collect();
        log::debug!(
            "Selected {} of {count} input resource(s) (selector: {})",
            selected.len(),
            ctx.selector.name()
        );

        ValidationChain::from_registry(&self.registry, config)?.apply(selected)
    }

    /// List the actual state of `resource_type` through its registered collector.
    pub fn collect(&self, resource_type: &ResourceType, ctx: &ReconcileContext) -> Result<Vec<Resource>> {
        let descriptor = self
            .registry
            .find_one(ExtensionCategory::Collector, resource_type)?;
        let collector = self
            .registry
            .instantiate(descriptor, &ctx.configuration)?
            .into_collector()
            .ok_or_else(|| Error::UnsupportedResource {
                resource_type: resource_type.clone(),
                category: ExtensionCategory::Collector.to_string(),
            })?;
        collector
            .list_all(&ctx.configuration, ctx.selector.as_ref())
            .map_err(|e| Error::extension(&descriptor.name, e))
    }

    /// Prepare `resources` and ask each type's controller for its changes.
    ///
    /// Every controller is resolved before any backend is contacted, so an
    /// unsupported type fails the run without side effects.
    pub fn build_plan(&self, resources: Vec<Resource>, ctx: &ReconcileContext) -> Result<ExecutionPlan> {
        let prepared = ResourceList::new(self.prepare(resources, ctx)?);

        let mut resolved = Vec::new();
        for (resource_type, items) in prepared.by_type() {
            let descriptor = self
                .registry
                .find_one(ExtensionCategory::Controller, &resource_type)?;
            let controller = self
                .registry
                .instantiate(descriptor, &ctx.configuration)?
                .into_controller()
                .ok_or_else(|| Error::UnsupportedResource {
                    resource_type: resource_type.clone(),
                    category: ExtensionCategory::Controller.to_string(),
                })?;
            let controller: Arc<dyn Controller> = Arc::from(controller);
            log::debug!("Resolved controller '{}' for {resource_type}", descriptor.name);
            resolved.push((resource_type, descriptor.name.clone(), controller, items));
        }

        let mut plan = ExecutionPlan::new();
        for (resource_type, controller_name, controller, items) in resolved {
            let changes = controller
                .plan(&items, ctx)
                .map_err(|e| Error::extension(&controller_name, e))?;
            plan.groups.push(PlannedGroup {
                resource_type,
                controller_name,
                controller,
                changes,
            });
        }
        Ok(plan)
    }

    /// Compute the changes needed to converge on `resources`.
    pub fn plan(&self, resources: Vec<Resource>, ctx: &ReconcileContext) -> Result<Vec<ResourceChange>> {
        Ok(self.build_plan(resources, ctx)?.into_changes())
    }

    /// Execute a plan group by group.
    ///
    /// A controller that cannot open its backend fails its own changes only.
    pub fn execute(&self, plan: ExecutionPlan, ctx: &ReconcileContext) -> Vec<ChangeResult> {
        let mut results = Vec::with_capacity(plan.total_changes());
        for group in plan.groups {
            if group.changes.is_empty() {
                continue;
            }
            match group.controller.execute(group.changes.clone(), ctx) {
                Ok(group_results) => results.extend(group_results),
                Err(e) => {
                    let error = Error::Backend(e).to_string();
                    log::warn!("Controller '{}' failed: {error}", group.controller_name);
                    results.extend(group.changes.into_iter().map(|change| {
                        let description = change.describe();
                        ChangeResult::failed(change, description, error.clone())
                    }));
                }
            }
        }
        results
    }

    /// Plan and execute in one step.
    pub fn reconcile(&self, resources: Vec<Resource>, ctx: &ReconcileContext) -> Result<Vec<ChangeResult>> {
        let plan = self.build_plan(resources, ctx)?;
        Ok(self.execute(plan, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::diff::ChangeComputer;
    use crate::executor::ChangeHandler;
    use crate::extension::{Accepts, Extension};
    use crate::registry::ExtensionDescriptor;
    use crate::selector::{LabelSelector, Selector};
    use crate::types::{ChangeResponse, ChangeStatus, ExecuteOptions, Operation};
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GROUP: &str = "kafka.streamform.io";

    type Cluster = Arc<Mutex<BTreeMap<String, Value>>>;

    fn topic(name: &str, partitions: u64) -> Resource {
        Resource::new(
            "kafka.streamform.io/v1",
            "KafkaTopic",
            name,
            json!({"partitions": partitions}),
        )
    }

    struct MemoryHandler {
        cluster: Cluster,
        calls: Arc<AtomicUsize>,
    }

    impl ChangeHandler for MemoryHandler {
        fn name(&self) -> String {
            "memory".into()
        }

        fn supported_operations(&self) -> Vec<Operation> {
            vec![Operation::Add, Operation::Update, Operation::Delete]
        }

        fn apply(&self, change: &ResourceChange) -> anyhow::Result<ChangeResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut cluster = self.cluster.lock().unwrap();
            match change.operation {
                Operation::Delete => {
                    cluster.remove(change.name());
                }
                _ => {
                    let spec: serde_json::Map<String, Value> = change
                        .after_values()
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v.clone()))
                        .collect();
                    cluster.insert(change.name().to_string(), Value::Object(spec));
                }
            }
            Ok(ChangeResponse::default())
        }
    }

    struct MemoryController {
        cluster: Cluster,
        calls: Arc<AtomicUsize>,
    }

    impl Controller for MemoryController {
        fn plan(&self, expected: &[Resource], ctx: &ReconcileContext) -> anyhow::Result<Vec<ResourceChange>> {
            let actual: Vec<Resource> = self
                .cluster
                .lock()
                .unwrap()
                .iter()
                .map(|(name, spec)| {
                    Resource::new("kafka.streamform.io/v1", "KafkaTopic", name, spec.clone())
                })
                .collect();
            Ok(ChangeComputer::by_name()
                .delete_orphans(ctx.delete_orphans)
                .select_orphans(ctx.selector.clone())
                .compute_changes(&actual, expected))
        }

        fn handlers(&self, _ctx: &ReconcileContext) -> anyhow::Result<Vec<Arc<dyn ChangeHandler>>> {
            Ok(vec![Arc::new(MemoryHandler {
                cluster: self.cluster.clone(),
                calls: self.calls.clone(),
            })])
        }
    }

    fn reconciler(cluster: &Cluster, calls: &Arc<AtomicUsize>) -> Reconciler {
        let mut registry = ExtensionRegistry::new();
        let (cluster, calls) = (cluster.clone(), calls.clone());
        registry
            .register(
                ExtensionDescriptor::new("MemoryTopicController", ExtensionCategory::Controller, move || {
                    Extension::Controller(Box::new(MemoryController {
                        cluster: cluster.clone(),
                        calls: calls.clone(),
                    }))
                })
                .accepts(Accepts::kind(GROUP, "KafkaTopic")),
            )
            .unwrap();
        crate::builtin::register(&mut registry).unwrap();
        Reconciler::new(Arc::new(registry))
    }

    fn setup() -> (Cluster, Arc<AtomicUsize>, Reconciler) {
        let cluster: Cluster = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let reconciler = reconciler(&cluster, &calls);
        (cluster, calls, reconciler)
    }

    #[test]
    fn test_end_to_end_add_then_update() {
        let (cluster, _calls, reconciler) = setup();
        let ctx = ReconcileContext::default();

        let results = reconciler.reconcile(vec![topic("t1", 3)], &ctx).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].change.operation, Operation::Add);
        assert_eq!(results[0].status, ChangeStatus::Changed);
        assert_eq!(cluster.lock().unwrap()["t1"], json!({"partitions": 3}));

        let changes = reconciler.plan(vec![topic("t1", 6)], &ctx).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].operation, Operation::Update);
        let partitions = changes[0].change("partitions").unwrap();
        assert_eq!(partitions.before, Some(json!(3)));
        assert_eq!(partitions.after, Some(json!(6)));

        let results = reconciler.reconcile(vec![topic("t1", 6)], &ctx).unwrap();
        assert_eq!(results[0].status, ChangeStatus::Changed);
        assert_eq!(cluster.lock().unwrap()["t1"], json!({"partitions": 6}));

        // Converged: replanning is a no-op
        let changes = reconciler.plan(vec![topic("t1", 6)], &ctx).unwrap();
        assert_eq!(changes[0].operation, Operation::None);
    }

    #[test]
    fn test_dry_run_does_not_touch_backend() {
        let (cluster, calls, reconciler) = setup();
        let ctx = ReconcileContext::default().with_options(ExecuteOptions {
            dry_run: true,
            ..ExecuteOptions::default()
        });

        let results = reconciler.reconcile(vec![topic("t1", 3)], &ctx).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].dry_run);
        assert_eq!(results[0].status, ChangeStatus::Changed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(cluster.lock().unwrap().is_empty());
    }

    #[test]
    fn test_orphans_only_deleted_when_enabled() {
        let (cluster, _calls, reconciler) = setup();
        cluster
            .lock()
            .unwrap()
            .insert("old".into(), json!({"partitions": 1}));

        let changes = reconciler
            .plan(vec![topic("t1", 3)], &ReconcileContext::default())
            .unwrap();
        assert_eq!(changes.len(), 1);

        let ctx = ReconcileContext::new(Configuration::new().with("delete-orphans", true)).unwrap();
        let changes = reconciler.plan(vec![topic("t1", 3)], &ctx).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].operation, Operation::Delete);
        assert_eq!(changes[1].name(), "old");
    }

    #[test]
    fn test_unsupported_type_fails_before_planning() {
        let (_cluster, calls, reconciler) = setup();
        let acl = Resource::new("kafka.streamform.io/v1", "KafkaAcl", "a", json!({}));
        let err = reconciler
            .plan(vec![topic("t1", 3), acl], &ReconcileContext::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedResource { ref resource_type, .. } if resource_type.kind == "KafkaAcl"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_selector_and_ignore_annotation() {
        let (_cluster, _calls, reconciler) = setup();
        let selector: Arc<dyn Selector> = Arc::new(LabelSelector::parse("env=prod").unwrap());
        let ctx = ReconcileContext::default().with_selector(selector);

        let resources = vec![
            topic("t1", 3).with_label("env", "prod"),
            topic("t2", 3).with_label("env", "dev"),
            topic("t3", 3)
                .with_label("env", "prod")
                .with_annotation(crate::resource::annotations::IGNORE, true),
        ];
        let changes = reconciler.plan(resources, &ctx).unwrap();
        let names: Vec<&str> = changes.iter().map(ResourceChange::name).collect();
        assert_eq!(names, ["t1"]);
    }

    #[test]
    fn test_label_selector_matches_existing_state() {
        let (cluster, _calls, reconciler) = setup();
        cluster
            .lock()
            .unwrap()
            .insert("t1".into(), json!({"partitions": 3}));
        cluster
            .lock()
            .unwrap()
            .insert("old".into(), json!({"partitions": 1}));

        let selector: Arc<dyn Selector> = Arc::new(LabelSelector::parse("env=prod").unwrap());
        let ctx = ReconcileContext::new(Configuration::new().with("delete-orphans", true))
            .unwrap()
            .with_selector(selector);

        // Stored resources carry no labels: t1 is unchanged and `old` is out of scope
        let changes = reconciler
            .plan(vec![topic("t1", 3).with_label("env", "prod")], &ctx)
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name(), "t1");
        assert_eq!(changes[0].operation, Operation::None);
    }

    #[test]
    fn test_selector_runs_before_validation() {
        struct RejectAll;

        impl crate::extension::Validation for RejectAll {
            fn validate(&self, resource: &Resource) -> crate::extension::ValidationOutcome {
                crate::extension::ValidationOutcome::invalid(format!("{} rejected", resource.name()))
            }
        }

        let cluster: Cluster = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = (*reconciler(&cluster, &calls).registry).clone();
        registry
            .register(
                ExtensionDescriptor::new("RejectAll", ExtensionCategory::Validation, || {
                    Extension::Validation(Box::new(RejectAll))
                })
                .accepts(Accepts::Any),
            )
            .unwrap();
        let reconciler = Reconciler::new(Arc::new(registry));

        let selector: Arc<dyn Selector> = Arc::new(LabelSelector::parse("env=prod").unwrap());
        let ctx = ReconcileContext::default().with_selector(selector);
        let prepared = reconciler
            .prepare(vec![topic("t2", 3).with_label("env", "dev")], &ctx)
            .unwrap();
        assert!(prepared.is_empty());

        let err = reconciler
            .prepare(vec![topic("t1", 3).with_label("env", "prod")], &ctx)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref errors) if errors.len() == 1));
    }

    #[test]
    fn test_collect_uses_registered_collector() {
        struct Fixed;

        impl crate::extension::Collector for Fixed {
            fn list_all(&self, _config: &Configuration, selector: &dyn Selector) -> anyhow::Result<Vec<Resource>> {
                Ok([topic("a", 1).with_label("env", "prod"), topic("b", 1)]
                    .into_iter()
                    .filter(|r| selector.apply(r))
                    .collect())
            }
        }

        let mut registry = ExtensionRegistry::new();
        registry
            .register(
                ExtensionDescriptor::new("FixedTopicCollector", ExtensionCategory::Collector, || {
                    Extension::Collector(Box::new(Fixed))
                })
                .accepts(Accepts::kind(GROUP, "KafkaTopic")),
            )
            .unwrap();
        let reconciler = Reconciler::new(Arc::new(registry));
        let topics = ResourceType::new(GROUP, "v1", "KafkaTopic");

        let all = reconciler.collect(&topics, &ReconcileContext::default()).unwrap();
        assert_eq!(all.len(), 2);

        let selector: Arc<dyn Selector> = Arc::new(LabelSelector::parse("env=prod").unwrap());
        let ctx = ReconcileContext::default().with_selector(selector);
        let prod = reconciler.collect(&topics, &ctx).unwrap();
        assert_eq!(prod.len(), 1);
        assert_eq!(prod[0].name(), "a");

        let acls = ResourceType::new(GROUP, "v1", "KafkaAcl");
        assert!(matches!(
            reconciler.collect(&acls, &ReconcileContext::default()),
            Err(Error::UnsupportedResource { .. })
        ));
    }

    #[test]
    fn test_filter_by_target() {
        let (_cluster, _calls, reconciler) = setup();
        let plan = reconciler
            .build_plan(
                vec![topic("orders.v1", 3), topic("payments", 3)],
                &ReconcileContext::default(),
            )
            .unwrap();
        assert_eq!(plan.total_changes(), 2);

        let plan = plan.filter_by_target(Some("kafkatopic.orders.v1"));
        let names: Vec<&str> = plan.changes().map(ResourceChange::name).collect();
        assert_eq!(names, ["orders.v1"]);
        assert_eq!(plan.summary().additions, 1);
    }
}
