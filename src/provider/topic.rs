//! `KafkaTopic` collector, controller and change handlers

use super::store::{LocalStore, StoreError, TopicSpec, read_state};
use super::{API_VERSION, KIND_TOPIC, PROVIDER, state_file};
use anyhow::{Context, Result, bail};
use declarative::{
    ChangeComputer, ChangeHandler, ChangeResponse, Collector, ConfigError, Configuration,
    Controller, NO_SELECTOR, Operation, ReconcileContext, Resource, ResourceChange, Selector, annotations,
};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Build a `KafkaTopic` resource from stored state
pub fn topic_resource(name: &str, spec: &TopicSpec) -> Result<Resource> {
    let spec = serde_json::to_value(spec).context("Failed to serialize topic spec")?;
    Ok(Resource::new(API_VERSION, KIND_TOPIC, name, spec).with_annotation(annotations::PROVIDER, PROVIDER))
}

pub fn parse_spec(resource: &Resource) -> Result<TopicSpec> {
    serde_json::from_value(resource.spec.clone())
        .with_context(|| format!("Invalid spec for topic '{}'", resource.name()))
}

/// Fill in defaults so desired and stored specs compare field by field
fn normalize(resource: Resource) -> Result<Resource> {
    if resource.is_marked_for_deletion() {
        return Ok(resource);
    }
    let spec = serde_json::to_value(parse_spec(&resource)?)?;
    Ok(resource.with_spec(spec))
}

/// Rebuild a topic spec from the after-values of a change
fn spec_from_change(change: &ResourceChange) -> Result<TopicSpec> {
    let mut fields = Map::new();
    let mut configs = Map::new();
    for (name, value) in change.after_values() {
        if let Some(config) = name.strip_prefix("configs.") {
            configs.insert(config.to_string(), value.clone());
        } else if name != "configs" {
            fields.insert(name.to_string(), value.clone());
        }
    }
    fields.insert("configs".to_string(), Value::Object(configs));
    serde_json::from_value(Value::Object(fields))
        .with_context(|| format!("Invalid spec for topic '{}'", change.name()))
}

// ============================================================================
// Collector
// ============================================================================

#[derive(Debug, Default)]
pub struct KafkaTopicCollector {
    state_file: Option<PathBuf>,
}

impl Collector for KafkaTopicCollector {
    fn configure(&mut self, config: &Configuration) -> Result<(), ConfigError> {
        self.state_file = Some(state_file(config)?);
        Ok(())
    }

    fn list_all(&self, config: &Configuration, selector: &dyn Selector) -> Result<Vec<Resource>> {
        let path = match &self.state_file {
            Some(path) => path.clone(),
            None => state_file(config)?,
        };
        let state = read_state(&path)?;

        let mut topics = Vec::with_capacity(state.topics.len());
        for (name, spec) in &state.topics {
            let resource = topic_resource(name, spec)?;
            if selector.apply(&resource) {
                topics.push(resource);
            }
        }
        log::debug!("Collected {} topic(s) from {}", topics.len(), path.display());
        Ok(topics)
    }
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug, Default)]
pub struct KafkaTopicController {
    collector: KafkaTopicCollector,
}

impl Controller for KafkaTopicController {
    fn configure(&mut self, config: &Configuration) -> Result<(), ConfigError> {
        self.collector.configure(config)
    }

    fn plan(&self, expected: &[Resource], ctx: &ReconcileContext) -> Result<Vec<ResourceChange>> {
        let actual = self
            .collector
            .list_all(&ctx.configuration, &NO_SELECTOR)?;
        let expected = expected
            .iter()
            .cloned()
            .map(normalize)
            .collect::<Result<Vec<_>>>()?;

        Ok(ChangeComputer::by_name()
            .delete_orphans(ctx.delete_orphans)
            .select_orphans(ctx.selector.clone())
            .compute_changes(&actual, &expected))
    }

    fn handlers(&self, ctx: &ReconcileContext) -> Result<Vec<Arc<dyn ChangeHandler>>> {
        let path = match &self.collector.state_file {
            Some(path) => path.clone(),
            None => state_file(&ctx.configuration)?,
        };
        let store = Arc::new(LocalStore::open(path)?);
        Ok(vec![
            Arc::new(CreateTopicHandler {
                store: Arc::clone(&store),
            }),
            Arc::new(UpdateTopicHandler {
                store: Arc::clone(&store),
            }),
            Arc::new(DeleteTopicHandler { store }),
        ])
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub struct CreateTopicHandler {
    store: Arc<LocalStore>,
}

impl ChangeHandler for CreateTopicHandler {
    fn name(&self) -> String {
        "create-topic".to_string()
    }

    fn supported_operations(&self) -> Vec<Operation> {
        vec![Operation::Add]
    }

    fn apply(&self, change: &ResourceChange) -> Result<ChangeResponse> {
        let spec = spec_from_change(change)?;
        if spec.partitions == 0 {
            bail!("topic '{}' needs at least one partition", change.name());
        }
        let name = change.name().to_string();
        self.store.update(|state| {
            if state.topics.contains_key(&name) {
                return Err(StoreError::Conflict(format!("topic '{name}' already exists")));
            }
            state.topics.insert(name.clone(), spec);
            Ok(())
        })?;
        Ok(ChangeResponse::default())
    }

    fn describe(&self, change: &ResourceChange) -> String {
        match spec_from_change(change) {
            Ok(spec) => format!(
                "Create topic '{}' (partitions: {}, replicas: {})",
                change.name(),
                spec.partitions,
                spec.replicas
            ),
            Err(_) => change.describe(),
        }
    }
}

pub struct UpdateTopicHandler {
    store: Arc<LocalStore>,
}

impl ChangeHandler for UpdateTopicHandler {
    fn name(&self) -> String {
        "update-topic".to_string()
    }

    fn supported_operations(&self) -> Vec<Operation> {
        vec![Operation::Update]
    }

    fn apply(&self, change: &ResourceChange) -> Result<ChangeResponse> {
        let desired = spec_from_change(change)?;
        let name = change.name().to_string();
        let changed_configs = change
            .effective_changes()
            .filter(|c| c.name.starts_with("configs."))
            .count();

        self.store.update(|state| {
            let current = state
                .topics
                .get_mut(&name)
                .ok_or_else(|| StoreError::NotFound(format!("topic '{name}' does not exist")))?;
            if desired.partitions < current.partitions {
                return Err(StoreError::Conflict(format!(
                    "cannot reduce partitions of '{name}' from {} to {}",
                    current.partitions, desired.partitions
                )));
            }
            *current = desired;
            Ok(())
        })?;

        if changed_configs > 0 {
            Ok(ChangeResponse::with_message(format!("{changed_configs} config(s) altered")))
        } else {
            Ok(ChangeResponse::default())
        }
    }
}

pub struct DeleteTopicHandler {
    store: Arc<LocalStore>,
}

impl ChangeHandler for DeleteTopicHandler {
    fn name(&self) -> String {
        "delete-topic".to_string()
    }

    fn supported_operations(&self) -> Vec<Operation> {
        vec![Operation::Delete]
    }

    fn apply(&self, change: &ResourceChange) -> Result<ChangeResponse> {
        let name = change.name().to_string();
        self.store.update(|state| {
            state
                .topics
                .remove(&name)
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(format!("topic '{name}' does not exist")))
        })?;
        Ok(ChangeResponse::default())
    }

    fn describe(&self, change: &ResourceChange) -> String {
        format!("Delete topic '{}'", change.name())
    }
}
