//! Transformations for the local provider

use anyhow::Result;
use declarative::{
    ConfigError, ConfigProperty, Configuration, Resource, ResourceList, Transformation,
};
use serde_json::{Value, json};

const MIN_INSYNC_REPLICAS: &str = "min.insync.replicas";

pub fn min_insync_replicas_property() -> ConfigProperty<u64> {
    ConfigProperty::new(
        "min-insync-replicas",
        "Floor applied to every topic's min.insync.replicas",
    )
}

/// Raises `configs."min.insync.replicas"` to a configured floor
///
/// Topics already at or above the floor are left alone; without the setting
/// this transformation does nothing.
#[derive(Debug, Default)]
pub struct TopicMinInSyncReplicasTransformation {
    floor: Option<u64>,
}

impl Transformation for TopicMinInSyncReplicasTransformation {
    fn configure(&mut self, config: &Configuration) -> Result<(), ConfigError> {
        let property = min_insync_replicas_property();
        self.floor = property.get(config)?;
        if self.floor == Some(0) {
            return Err(ConfigError::invalid(property.key, "must be at least 1"));
        }
        Ok(())
    }

    fn transform(&self, resource: Resource, _candidates: &ResourceList) -> Result<Option<Resource>> {
        let Some(floor) = self.floor else {
            return Ok(Some(resource));
        };
        if resource.is_marked_for_deletion() {
            return Ok(Some(resource));
        }

        // Configs may be written as strings ("2") or numbers
        let current = resource
            .spec
            .get("configs")
            .and_then(|c| c.get(MIN_INSYNC_REPLICAS))
            .and_then(|v| match v {
                Value::String(s) => s.parse::<u64>().ok(),
                other => other.as_u64(),
            });
        if current.is_some_and(|c| c >= floor) {
            return Ok(Some(resource));
        }

        log::debug!(
            "Raising {MIN_INSYNC_REPLICAS} of {} from {} to {floor}",
            resource.key(),
            current.map_or_else(|| "unset".to_string(), |c| c.to_string())
        );
        let mut spec = resource.spec.clone();
        let Some(obj) = spec.as_object_mut() else {
            return Ok(Some(resource));
        };
        let configs = obj.entry("configs").or_insert_with(|| json!({}));
        if let Some(configs) = configs.as_object_mut() {
            configs.insert(MIN_INSYNC_REPLICAS.to_string(), json!(floor));
        }
        Ok(Some(resource.with_spec(spec)))
    }
}
