//! The `local` provider: Kafka-like resources backed by a JSON state file
//!
//! Extensions are registered explicitly through [`register`].

pub mod actions;
pub mod acl;
pub mod converters;
pub mod health;
pub mod store;
pub mod topic;
pub mod transformations;
pub mod validations;

use declarative::{
    Accepts, ConfigError, ConfigProperty, Configuration, Extension, ExtensionCategory,
    ExtensionDescriptor, ExtensionRegistry,
};
use std::path::PathBuf;

pub const PROVIDER: &str = "local";
pub const GROUP: &str = "kafka.streamform.io";
pub const API_VERSION: &str = "kafka.streamform.io/v1";

pub const KIND_TOPIC: &str = "KafkaTopic";
pub const KIND_TOPIC_LIST: &str = "KafkaTopicList";
pub const KIND_ACL: &str = "KafkaAcl";

/// Location of the cluster state file
pub fn state_file_property() -> ConfigProperty<String> {
    ConfigProperty::new(
        "provider.local.state-file",
        "JSON file holding the local cluster state",
    )
}

/// Resolve the state file, expanding `~`
pub fn state_file(config: &Configuration) -> Result<PathBuf, ConfigError> {
    let property = state_file_property();
    let raw = property
        .get(config)
        .ok_or_else(|| ConfigError::Missing(property.key.to_string()))?;
    let expanded = shellexpand::tilde(&raw);
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Register every extension of the local provider
pub fn register(registry: &mut ExtensionRegistry) -> declarative::Result<()> {
    let topics = Accepts::kind(GROUP, KIND_TOPIC);
    let acls = Accepts::kind(GROUP, KIND_ACL);

    let descriptors = [
        ExtensionDescriptor::new("KafkaTopicCollector", ExtensionCategory::Collector, || {
            Extension::Collector(Box::new(topic::KafkaTopicCollector::default()))
        })
        .accepts(topics.clone())
        .description("List topics from the state file (used by `get`)"),
        ExtensionDescriptor::new("KafkaTopicController", ExtensionCategory::Controller, || {
            Extension::Controller(Box::new(topic::KafkaTopicController::default()))
        })
        .accepts(topics.clone())
        .description("Create, update and delete topics"),
        ExtensionDescriptor::new("KafkaAclCollector", ExtensionCategory::Collector, || {
            Extension::Collector(Box::new(acl::KafkaAclCollector::default()))
        })
        .accepts(acls.clone())
        .description("List ACL bindings from the state file (used by `get`)"),
        ExtensionDescriptor::new("KafkaAclController", ExtensionCategory::Controller, || {
            Extension::Controller(Box::new(acl::KafkaAclController::default()))
        })
        .accepts(acls)
        .description("Create and delete ACL bindings"),
        ExtensionDescriptor::new("KafkaTopicListConverter", ExtensionCategory::Converter, || {
            Extension::Converter(Box::new(converters::KafkaTopicListConverter))
        })
        .accepts(Accepts::kind(GROUP, KIND_TOPIC_LIST))
        .description("Explode topic lists into topics"),
        ExtensionDescriptor::new(
            "TopicMinInSyncReplicasTransformation",
            ExtensionCategory::Transformation,
            || {
                Extension::Transformation(Box::new(
                    transformations::TopicMinInSyncReplicasTransformation::default(),
                ))
            },
        )
        .accepts(topics.clone())
        .priority(100)
        .description("Raise min.insync.replicas to the configured floor"),
        ExtensionDescriptor::new("TopicNameRegexValidation", ExtensionCategory::Validation, || {
            Extension::Validation(Box::new(validations::TopicNameRegexValidation::default()))
        })
        .accepts(topics.clone())
        .description("Topic names must match topic-name-regex"),
        ExtensionDescriptor::new("TopicMinPartitionsValidation", ExtensionCategory::Validation, || {
            Extension::Validation(Box::new(validations::TopicMinPartitionsValidation::default()))
        })
        .accepts(topics)
        .description("Topics need at least topic-min-partitions partitions"),
        ExtensionDescriptor::new("LocalStoreHealthIndicator", ExtensionCategory::HealthIndicator, || {
            Extension::HealthIndicator(Box::new(health::LocalStoreHealthIndicator::default()))
        })
        .description("State file is readable and parseable"),
        ExtensionDescriptor::new("local-snapshot", ExtensionCategory::Action, || {
            Extension::Action(Box::new(actions::LocalSnapshotAction::default()))
        })
        .description("Print the current cluster state as resources"),
    ];

    for descriptor in descriptors {
        registry.register(descriptor.provider(PROVIDER))?;
    }
    Ok(())
}
