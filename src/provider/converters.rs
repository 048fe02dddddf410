//! Converters for the local provider

use super::KIND_TOPIC;
use anyhow::{Context, Result, bail};
use declarative::{Converter, ObjectMeta, Resource};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct TopicListSpec {
    #[serde(default)]
    items: Vec<TopicListItem>,
}

#[derive(Debug, Deserialize)]
struct TopicListItem {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: Value,
}

/// Explodes a `KafkaTopicList` into one `KafkaTopic` per item
///
/// Items inherit the list's labels and annotations; their own win on conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct KafkaTopicListConverter;

impl Converter for KafkaTopicListConverter {
    fn convert(&self, resource: Resource) -> Result<Vec<Resource>> {
        let list: TopicListSpec = serde_json::from_value(resource.spec.clone())
            .with_context(|| format!("Invalid spec for {}", resource.key()))?;

        let mut topics = Vec::with_capacity(list.items.len());
        for (i, item) in list.items.into_iter().enumerate() {
            if item.metadata.name.is_empty() {
                bail!("{} item {i} has no metadata.name", resource.key());
            }
            let mut metadata = resource.metadata.clone();
            metadata.name = item.metadata.name;
            metadata.labels.extend(item.metadata.labels);
            metadata.annotations.extend(item.metadata.annotations);

            topics.push(Resource {
                api_version: resource.api_version.clone(),
                kind: KIND_TOPIC.to_string(),
                metadata,
                spec: item.spec,
            });
        }
        log::debug!("Converted {} into {} topic(s)", resource.key(), topics.len());
        Ok(topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{API_VERSION, KIND_TOPIC_LIST};
    use serde_json::json;

    #[test]
    fn test_list_explodes_with_inherited_labels() {
        let list = Resource::new(
            API_VERSION,
            KIND_TOPIC_LIST,
            "payments",
            json!({"items": [
                {"metadata": {"name": "orders", "labels": {"tier": "gold"}}, "spec": {"partitions": 3}},
                {"metadata": {"name": "refunds"}, "spec": {"partitions": 1}}
            ]}),
        )
        .with_label("team", "payments")
        .with_label("tier", "silver");

        let topics = KafkaTopicListConverter.convert(list).unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].kind, KIND_TOPIC);
        assert_eq!(topics[0].name(), "orders");
        assert_eq!(topics[0].metadata.labels["team"], "payments");
        assert_eq!(topics[0].metadata.labels["tier"], "gold");
        assert_eq!(topics[1].metadata.labels["tier"], "silver");
        assert_eq!(topics[1].spec, json!({"partitions": 1}));
    }

    #[test]
    fn test_item_without_name_is_rejected() {
        let list = Resource::new(
            API_VERSION,
            KIND_TOPIC_LIST,
            "broken",
            json!({"items": [{"metadata": {"name": ""}}]}),
        );
        let err = KafkaTopicListConverter.convert(list).unwrap_err();
        assert!(err.to_string().contains("no metadata.name"));
    }
}
