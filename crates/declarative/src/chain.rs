//! Interceptor chains applied to desired resources before diffing
//!
//! Converters normalize shape, transformations mutate or drop, validations
//! check. Each chain runs its members in ascending priority, ties broken by
//! name, and only on resource types they accept.

use crate::config::Configuration;
use crate::error::{Error, Result, ValidationError};
use crate::extension::{
    Accepts, Converter, Extension, ExtensionCategory, FailurePolicy, Transformation, Validation,
    ValidationOutcome,
};
use crate::registry::{ExtensionDescriptor, ExtensionRegistry};
use crate::resource::{Resource, ResourceList, ResourceType};

/// A configured chain member
pub struct Interceptor<T: ?Sized> {
    pub name: String,
    pub priority: i32,
    pub accepts: Accepts,
    inner: Box<T>,
}

impl<T: ?Sized> Interceptor<T> {
    pub fn new(name: impl Into<String>, priority: i32, accepts: Accepts, inner: Box<T>) -> Self {
        Self {
            name: name.into(),
            priority,
            accepts,
            inner,
        }
    }

    fn from_descriptor(descriptor: &ExtensionDescriptor, inner: Box<T>) -> Self {
        Self::new(
            descriptor.name.clone(),
            descriptor.priority,
            descriptor.accepts.clone(),
            inner,
        )
    }

    fn accepts(&self, rt: &ResourceType) -> bool {
        self.accepts.accepts(rt)
    }
}

fn sorted<T: ?Sized>(mut items: Vec<Interceptor<T>>) -> Vec<Interceptor<T>> {
    items.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
    items
}

/// Instantiate every registered extension of a category
fn instantiate_all<T: ?Sized>(
    registry: &ExtensionRegistry,
    config: &Configuration,
    category: ExtensionCategory,
    unwrap: fn(Extension) -> Option<Box<T>>,
) -> Result<Vec<Interceptor<T>>> {
    let mut items = Vec::new();
    for descriptor in registry.all(category) {
        let extension = registry.instantiate(descriptor, config)?;
        if let Some(inner) = unwrap(extension) {
            items.push(Interceptor::from_descriptor(descriptor, inner));
        }
    }
    Ok(items)
}

/// First-match converter chain
pub struct ConverterChain {
    converters: Vec<Interceptor<dyn Converter>>,
}

impl ConverterChain {
    pub fn new(converters: Vec<Interceptor<dyn Converter>>) -> Self {
        Self {
            converters: sorted(converters),
        }
    }

    pub fn from_registry(registry: &ExtensionRegistry, config: &Configuration) -> Result<Self> {
        let converters = instantiate_all(
            registry,
            config,
            ExtensionCategory::Converter,
            Extension::into_converter,
        )?;
        Ok(Self::new(converters))
    }

    pub fn names(&self) -> Vec<&str> {
        self.converters.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn apply(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        let chain: Vec<&Interceptor<dyn Converter>> = self.converters.iter().collect();
        let mut out = Vec::with_capacity(resources.len());
        for resource in resources {
            out.extend(convert(&chain, resource)?);
        }
        Ok(out)
    }
}

/// Apply the first accepting converter, then the rest of the chain to its
/// outputs. A converter never sees its own output.
fn convert(chain: &[&Interceptor<dyn Converter>], resource: Resource) -> Result<Vec<Resource>> {
    let rt = resource.resource_type();
    let Some(idx) = chain.iter().position(|c| c.accepts(&rt)) else {
        return Ok(vec![resource]);
    };
    let converter = chain[idx];

    let ignored: Vec<&str> = chain[idx + 1..]
        .iter()
        .filter(|c| c.accepts(&rt))
        .map(|c| c.name.as_str())
        .collect();
    if !ignored.is_empty() {
        log::warn!(
            "Converter '{}' handles {rt}; ignoring {}",
            converter.name,
            ignored.join(", ")
        );
    }

    log::debug!("Converting {} with '{}'", resource.key(), converter.name);
    let outputs = converter
        .inner
        .convert(resource)
        .map_err(|e| Error::extension(&converter.name, e))?;

    let remaining: Vec<&Interceptor<dyn Converter>> = chain
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != idx)
        .map(|(_, c)| *c)
        .collect();
    let mut converted = Vec::with_capacity(outputs.len());
    for output in outputs {
        converted.extend(convert(&remaining, output)?);
    }
    Ok(converted)
}

/// Apply-all transformation chain
pub struct TransformationChain {
    transformations: Vec<Interceptor<dyn Transformation>>,
}

impl TransformationChain {
    pub fn new(transformations: Vec<Interceptor<dyn Transformation>>) -> Self {
        Self {
            transformations: sorted(transformations),
        }
    }

    pub fn from_registry(registry: &ExtensionRegistry, config: &Configuration) -> Result<Self> {
        let transformations = instantiate_all(
            registry,
            config,
            ExtensionCategory::Transformation,
            Extension::into_transformation,
        )?;
        Ok(Self::new(transformations))
    }

    pub fn names(&self) -> Vec<&str> {
        self.transformations.iter().map(|t| t.name.as_str()).collect()
    }

    /// Transform every resource; dropped resources are omitted.
    ///
    /// All transformations see the input set as it was before this pass.
    pub fn apply(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        let candidates = ResourceList::new(resources.clone());
        let mut out = Vec::with_capacity(resources.len());

        'resources: for resource in resources {
            let rt = resource.resource_type();
            let mut current = resource;
            for transformation in self.transformations.iter().filter(|t| t.accepts(&rt)) {
                let key = current.key();
                match transformation
                    .inner
                    .transform(current, &candidates)
                    .map_err(|e| Error::extension(&transformation.name, e))?
                {
                    Some(next) => current = next,
                    None => {
                        log::debug!("Transformation '{}' dropped {key}", transformation.name);
                        continue 'resources;
                    }
                }
            }
            out.push(current);
        }
        Ok(out)
    }
}

/// Validation chain with per-validation failure policy
pub struct ValidationChain {
    validations: Vec<Interceptor<dyn Validation>>,
}

impl ValidationChain {
    pub fn new(validations: Vec<Interceptor<dyn Validation>>) -> Self {
        Self {
            validations: sorted(validations),
        }
    }

    pub fn from_registry(registry: &ExtensionRegistry, config: &Configuration) -> Result<Self> {
        let validations = instantiate_all(
            registry,
            config,
            ExtensionCategory::Validation,
            Extension::into_validation,
        )?;
        Ok(Self::new(validations))
    }

    pub fn names(&self) -> Vec<&str> {
        self.validations.iter().map(|v| v.name.as_str()).collect()
    }

    /// Validate every resource.
    ///
    /// Failures under `FAIL` are accumulated across all resources and
    /// returned together; `FILTER` failures drop the resource.
    pub fn apply(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        let mut errors = Vec::new();
        let mut out = Vec::with_capacity(resources.len());

        'resources: for resource in resources {
            let rt = resource.resource_type();
            for validation in self.validations.iter().filter(|v| v.accepts(&rt)) {
                let ValidationOutcome::Invalid(messages) = validation.inner.validate(&resource) else {
                    continue;
                };
                match validation.inner.failure_policy() {
                    FailurePolicy::Fail => {
                        errors.extend(messages.into_iter().map(|message| ValidationError {
                            validation: validation.name.clone(),
                            resource: resource.key(),
                            message,
                        }));
                    }
                    FailurePolicy::Continue => {
                        for message in messages {
                            log::warn!("[{}] {}: {message}", validation.name, resource.key());
                        }
                    }
                    FailurePolicy::Filter => {
                        log::debug!(
                            "Validation '{}' filtered {}: {}",
                            validation.name,
                            resource.key(),
                            messages.join("; ")
                        );
                        continue 'resources;
                    }
                }
            }
            out.push(resource);
        }

        if errors.is_empty() {
            Ok(out)
        } else {
            Err(Error::Validation(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use serde_json::{Value, json};

    fn topic(name: &str) -> Resource {
        Resource::new("kafka.streamform.io/v1", "KafkaTopic", name, json!({"partitions": 3}))
    }

    fn topic_list(names: &[&str]) -> Resource {
        let items: Vec<Value> = names.iter().map(|n| json!({"name": n})).collect();
        Resource::new(
            "kafka.streamform.io/v1",
            "KafkaTopicList",
            "list",
            json!({"items": items}),
        )
    }

    /// Appends its priority to `spec.trace`
    struct Trace(i32);

    impl Transformation for Trace {
        fn transform(&self, resource: Resource, _candidates: &ResourceList) -> anyhow::Result<Option<Resource>> {
            let mut spec = resource.spec.clone();
            let trace = spec
                .as_object_mut()
                .map(|o| o.entry("trace").or_insert_with(|| json!([])));
            if let Some(Value::Array(items)) = trace {
                items.push(json!(self.0));
            }
            Ok(Some(resource.with_spec(spec)))
        }
    }

    struct DropNamed(&'static str);

    impl Transformation for DropNamed {
        fn transform(&self, resource: Resource, _candidates: &ResourceList) -> anyhow::Result<Option<Resource>> {
            Ok((resource.name() != self.0).then_some(resource))
        }
    }

    /// Records how many candidates it was shown
    struct CountCandidates;

    impl Transformation for CountCandidates {
        fn transform(&self, resource: Resource, candidates: &ResourceList) -> anyhow::Result<Option<Resource>> {
            Ok(Some(resource.with_label("candidates", candidates.len().to_string())))
        }
    }

    fn transformation(
        name: &str,
        priority: i32,
        accepts: Accepts,
        inner: impl Transformation + 'static,
    ) -> Interceptor<dyn Transformation> {
        Interceptor::new(name, priority, accepts, Box::new(inner) as Box<dyn Transformation>)
    }

    fn converter(
        name: &str,
        priority: i32,
        accepts: Accepts,
        inner: impl Converter + 'static,
    ) -> Interceptor<dyn Converter> {
        Interceptor::new(name, priority, accepts, Box::new(inner) as Box<dyn Converter>)
    }

    fn trace(priority: i32) -> Interceptor<dyn Transformation> {
        transformation(&format!("trace-{priority}"), priority, Accepts::Any, Trace(priority))
    }

    #[test]
    fn test_transformations_run_in_priority_order() {
        let chain = TransformationChain::new(vec![trace(3), trace(0), trace(2), trace(1)]);
        assert_eq!(chain.names(), ["trace-0", "trace-1", "trace-2", "trace-3"]);

        let out = chain.apply(vec![topic("t1")]).unwrap();
        assert_eq!(out[0].spec["trace"], json!([0, 1, 2, 3]));
    }

    #[test]
    fn test_transformation_drop_short_circuits() {
        let chain = TransformationChain::new(vec![
            transformation("drop", 0, Accepts::Any, DropNamed("t2")),
            trace(1),
            transformation("count", 2, Accepts::Any, CountCandidates),
        ]);

        let out = chain.apply(vec![topic("t1"), topic("t2")]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), "t1");
        // Candidates are the input set, including the dropped resource
        assert_eq!(out[0].metadata.labels["candidates"], "2");
    }

    #[test]
    fn test_transformation_respects_accepts() {
        let chain = TransformationChain::new(vec![transformation(
            "acl-only",
            0,
            Accepts::kind("kafka.streamform.io", "KafkaAcl"),
            Trace(0),
        )]);
        let out = chain.apply(vec![topic("t1")]).unwrap();
        assert!(out[0].spec.get("trace").is_none());
    }

    struct Explode;

    impl Converter for Explode {
        fn convert(&self, resource: Resource) -> anyhow::Result<Vec<Resource>> {
            let items = resource.spec["items"].as_array().cloned().unwrap_or_default();
            Ok(items
                .iter()
                .filter_map(|i| i["name"].as_str())
                .map(topic)
                .collect())
        }
    }

    /// Suffixes the resource name
    struct Rename(&'static str);

    impl Converter for Rename {
        fn convert(&self, resource: Resource) -> anyhow::Result<Vec<Resource>> {
            let name = format!("{}-{}", resource.name(), self.0);
            Ok(vec![resource.with_name(name)])
        }
    }

    #[test]
    fn test_converter_chain_explodes_then_continues() {
        let list_kind = Accepts::kind("kafka.streamform.io", "KafkaTopicList");
        let topic_kind = Accepts::kind("kafka.streamform.io", "KafkaTopic");
        let chain = ConverterChain::new(vec![
            converter("rename", 1, topic_kind, Rename("v2")),
            converter("explode", 0, list_kind, Explode),
        ]);

        let out = chain.apply(vec![topic_list(&["a", "b"]), topic("c")]).unwrap();
        let names: Vec<&str> = out.iter().map(Resource::name).collect();
        assert_eq!(names, ["a-v2", "b-v2", "c-v2"]);
    }

    #[test]
    fn test_converter_not_reapplied_and_ambiguity_ignored() {
        let topic_kind = Accepts::kind("kafka.streamform.io", "KafkaTopic");
        let chain = ConverterChain::new(vec![
            converter("first", 0, topic_kind.clone(), Rename("x")),
            converter("second", 1, topic_kind, Rename("y")),
        ]);

        // "second" is skipped for the input but still sees the output of "first"
        let out = chain.apply(vec![topic("t")]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), "t-x-y");
    }

    #[test]
    fn test_unmatched_resources_pass_through() {
        let chain = ConverterChain::new(vec![]);
        let out = chain.apply(vec![topic("t")]).unwrap();
        assert_eq!(out, vec![topic("t")]);
    }

    struct MinPartitions {
        min: u64,
        policy: FailurePolicy,
    }

    impl Validation for MinPartitions {
        fn validate(&self, resource: &Resource) -> ValidationOutcome {
            match resource.spec["partitions"].as_u64() {
                Some(p) if p >= self.min => ValidationOutcome::Valid,
                _ => ValidationOutcome::invalid(format!("fewer than {} partitions", self.min)),
            }
        }

        fn failure_policy(&self) -> FailurePolicy {
            self.policy
        }
    }

    fn min_partitions(min: u64, policy: FailurePolicy) -> ValidationChain {
        let inner: Box<dyn Validation> = Box::new(MinPartitions { min, policy });
        ValidationChain::new(vec![Interceptor::new("min-partitions", 0, Accepts::Any, inner)])
    }

    #[test]
    fn test_validation_fail_accumulates() {
        let chain = min_partitions(6, FailurePolicy::Fail);
        let err = chain.apply(vec![topic("a"), topic("b")]).unwrap_err();
        match err {
            Error::Validation(errors) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].resource, "KafkaTopic/a");
                assert_eq!(errors[1].validation, "min-partitions");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validation_continue_and_filter() {
        let kept = min_partitions(6, FailurePolicy::Continue)
            .apply(vec![topic("a")])
            .unwrap();
        assert_eq!(kept.len(), 1);

        let filtered = min_partitions(6, FailurePolicy::Filter)
            .apply(vec![topic("a")])
            .unwrap();
        assert!(filtered.is_empty());

        let valid = min_partitions(1, FailurePolicy::Fail)
            .apply(vec![topic("a")])
            .unwrap();
        assert_eq!(valid.len(), 1);
    }

    #[test]
    fn test_from_registry_orders_members() {
        let mut registry = ExtensionRegistry::new();
        for p in [3, 0, 2, 1] {
            registry
                .register(
                    ExtensionDescriptor::new(format!("trace-{p}"), ExtensionCategory::Transformation, move || {
                        Extension::Transformation(Box::new(Trace(p)))
                    })
                    .priority(p),
                )
                .unwrap();
        }
        let chain = TransformationChain::from_registry(&registry, &Configuration::new()).unwrap();
        let out = chain.apply(vec![topic("t")]).unwrap();
        assert_eq!(out[0].spec["trace"], json!([0, 1, 2, 3]));
    }
}
