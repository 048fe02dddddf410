//! `KafkaAcl` collector, controller and change handlers
//!
//! Bindings have no name of their own: they are matched on every field,
//! so a changed binding shows up as one delete and one create.

use super::store::{AclBinding, LocalStore, StoreError, read_state};
use super::{API_VERSION, KIND_ACL, PROVIDER, state_file};
use anyhow::{Context, Result};
use declarative::{
    ChangeComputer, ChangeHandler, ChangeResponse, Collector, ConfigError, Configuration,
    Controller, NO_SELECTOR, Operation, ReconcileContext, Resource, ResourceChange, Selector, annotations,
};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

pub fn acl_resource(binding: &AclBinding) -> Result<Resource> {
    let spec = serde_json::to_value(binding).context("Failed to serialize ACL binding")?;
    Ok(Resource::new(API_VERSION, KIND_ACL, binding.display_name(), spec)
        .with_annotation(annotations::PROVIDER, PROVIDER))
}

pub fn parse_binding(resource: &Resource) -> Result<AclBinding> {
    serde_json::from_value(resource.spec.clone())
        .with_context(|| format!("Invalid spec for ACL '{}'", resource.name()))
}

/// Composite key of a binding resource, falling back to its name
fn binding_key(resource: &Resource) -> String {
    match parse_binding(resource) {
        Ok(binding) => binding.key(),
        Err(_) => resource.name().to_string(),
    }
}

fn normalize(resource: Resource) -> Result<Resource> {
    let spec = serde_json::to_value(parse_binding(&resource)?)?;
    Ok(resource.with_spec(spec))
}

/// Rebuild a binding from the field values on one side of a change
fn binding_from_change(change: &ResourceChange) -> Result<AclBinding> {
    let fields: Map<String, Value> = change
        .changes
        .iter()
        .filter_map(|c| {
            let value = match change.operation {
                Operation::Delete => c.before.as_ref(),
                _ => c.after.as_ref(),
            };
            value.map(|v| (c.name.clone(), v.clone()))
        })
        .collect();
    serde_json::from_value(Value::Object(fields))
        .with_context(|| format!("Invalid spec for ACL '{}'", change.name()))
}

// ============================================================================
// Collector
// ============================================================================

#[derive(Debug, Default)]
pub struct KafkaAclCollector {
    state_file: Option<PathBuf>,
}

impl KafkaAclCollector {
    fn path(&self, config: &Configuration) -> Result<PathBuf> {
        match &self.state_file {
            Some(path) => Ok(path.clone()),
            None => Ok(state_file(config)?),
        }
    }
}

impl Collector for KafkaAclCollector {
    fn configure(&mut self, config: &Configuration) -> Result<(), ConfigError> {
        self.state_file = Some(state_file(config)?);
        Ok(())
    }

    fn list_all(&self, config: &Configuration, selector: &dyn Selector) -> Result<Vec<Resource>> {
        let state = read_state(&self.path(config)?)?;
        let mut bindings = Vec::with_capacity(state.acls.len());
        for binding in &state.acls {
            let resource = acl_resource(binding)?;
            if selector.apply(&resource) {
                bindings.push(resource);
            }
        }
        Ok(bindings)
    }
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug, Default)]
pub struct KafkaAclController {
    collector: KafkaAclCollector,
}

impl Controller for KafkaAclController {
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

        Ok(ChangeComputer::new(binding_key)
            .delete_orphans(ctx.delete_orphans)
            .select_orphans(ctx.selector.clone())
            .compute_changes(&actual, &expected))
    }

    fn handlers(&self, ctx: &ReconcileContext) -> Result<Vec<Arc<dyn ChangeHandler>>> {
        let store = Arc::new(LocalStore::open(self.collector.path(&ctx.configuration)?)?);
        Ok(vec![
            Arc::new(CreateAclHandler {
                store: Arc::clone(&store),
            }),
            Arc::new(DeleteAclHandler { store }),
        ])
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub struct CreateAclHandler {
    store: Arc<LocalStore>,
}

impl ChangeHandler for CreateAclHandler {
    fn name(&self) -> String {
        "create-acl".to_string()
    }

    fn supported_operations(&self) -> Vec<Operation> {
        vec![Operation::Add]
    }

    fn apply(&self, change: &ResourceChange) -> Result<ChangeResponse> {
        let binding = binding_from_change(change)?;
        self.store.update(|state| {
            if state.acls.iter().any(|b| b.key() == binding.key()) {
                return Err(StoreError::Conflict(format!(
                    "ACL binding '{}' already exists",
                    binding.key()
                )));
            }
            state.acls.push(binding);
            state.acls.sort();
            Ok(())
        })?;
        Ok(ChangeResponse::default())
    }

    fn describe(&self, change: &ResourceChange) -> String {
        match binding_from_change(change) {
            Ok(b) => format!(
                "Create ACL {} {} {} on {}",
                b.permission, b.principal, b.operation, b.resource
            ),
            Err(_) => change.describe(),
        }
    }
}

pub struct DeleteAclHandler {
    store: Arc<LocalStore>,
}

impl ChangeHandler for DeleteAclHandler {
    fn name(&self) -> String {
        "delete-acl".to_string()
    }

    fn supported_operations(&self) -> Vec<Operation> {
        vec![Operation::Delete]
    }

    fn apply(&self, change: &ResourceChange) -> Result<ChangeResponse> {
        let key = binding_from_change(change)?.key();
        self.store.update(|state| {
            let before = state.acls.len();
            state.acls.retain(|b| b.key() != key);
            if state.acls.len() == before {
                return Err(StoreError::NotFound(format!("ACL binding '{key}' does not exist")));
            }
            Ok(())
        })?;
        Ok(ChangeResponse::default())
    }

    fn describe(&self, change: &ResourceChange) -> String {
        match binding_from_change(change) {
            Ok(b) => format!(
                "Delete ACL {} {} {} on {}",
                b.permission, b.principal, b.operation, b.resource
            ),
            Err(_) => change.describe(),
        }
    }
}
