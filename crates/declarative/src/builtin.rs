//! Extensions every registry starts with

use crate::error::Result;
use crate::extension::{Accepts, Extension, ExtensionCategory, Transformation};
use crate::registry::{ExtensionDescriptor, ExtensionRegistry};
use crate::resource::{Resource, ResourceList, annotations};

/// Drops resources annotated `declarative.io/ignore: true`
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreAnnotationTransformation;

impl Transformation for IgnoreAnnotationTransformation {
    fn transform(&self, resource: Resource, _candidates: &ResourceList) -> anyhow::Result<Option<Resource>> {
        if resource.is_ignored() {
            log::debug!("Ignoring {} ({})", resource.key(), annotations::IGNORE);
            return Ok(None);
        }
        Ok(Some(resource))
    }
}

/// Register the built-in extensions
pub fn register(registry: &mut ExtensionRegistry) -> Result<()> {
    registry.register(
        ExtensionDescriptor::new(
            "IgnoreAnnotationTransformation",
            ExtensionCategory::Transformation,
            || Extension::Transformation(Box::new(IgnoreAnnotationTransformation)),
        )
        .accepts(Accepts::Any)
        .priority(0)
        .provider("core")
        .description("Drop resources annotated declarative.io/ignore"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ignore_annotation() {
        let resource = Resource::new("kafka.streamform.io/v1", "KafkaTopic", "t", json!({}));
        let candidates = ResourceList::default();

        let kept = IgnoreAnnotationTransformation
            .transform(resource.clone(), &candidates)
            .unwrap();
        assert!(kept.is_some());

        let ignored = resource.with_annotation(annotations::IGNORE, "true");
        assert!(
            IgnoreAnnotationTransformation
                .transform(ignored, &candidates)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = ExtensionRegistry::new();
        register(&mut registry).unwrap();
        register(&mut registry).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("core-ignore-annotation-transformation").is_ok());
    }
}
