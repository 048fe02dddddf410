//! Error types for the reconciliation pipeline
//!
//! Only errors that make a plan impossible surface here. Failures local to a
//! single change are reported as [`ChangeResult`](crate::ChangeResult)s.

use crate::config::ConfigError;
use crate::resource::ResourceType;
use crate::selector::SelectorError;
use thiserror::Error;

/// A single validation failure attached to a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Name of the validation that rejected the resource
    pub validation: String,
    /// Resource identity (`kind/name`)
    pub resource: String,
    /// Human-readable reason
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.validation, self.resource, self.message)
    }
}

/// Errors that abort a reconciliation run
#[derive(Debug, Error)]
pub enum Error {
    /// An extension could not be configured
    #[error("configuration error in extension '{extension}': {source}")]
    Configuration {
        extension: String,
        #[source]
        source: ConfigError,
    },

    /// Malformed selector expression
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// No extension of the required category accepts the resource type
    #[error("unsupported resource type {resource_type}: no {category} registered")]
    UnsupportedResource {
        resource_type: ResourceType,
        category: String,
    },

    /// Two incompatible registrations share a name
    #[error("extension '{0}' is already registered with a different definition")]
    DuplicateExtension(String),

    /// Lookup by name or alias found nothing
    #[error("no extension named '{0}'")]
    UnknownExtension(String),

    /// One or more validations failed under the FAIL policy
    #[error("{} validation error(s):\n{}", .0.len(), format_validation_errors(.0))]
    Validation(Vec<ValidationError>),

    /// A plug-in raised an error while producing the plan
    #[error("extension '{name}' failed: {source}")]
    Extension {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Backend session could not be opened
    #[error("backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl Error {
    /// Wrap a plug-in failure with the name of the extension that raised it.
    pub fn extension(name: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Extension {
            name: name.into(),
            source,
        }
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_failure() {
        let err = Error::Validation(vec![
            ValidationError {
                validation: "TopicNameRegexValidation".into(),
                resource: "KafkaTopic/Bad".into(),
                message: "name does not match".into(),
            },
            ValidationError {
                validation: "TopicMinPartitionsValidation".into(),
                resource: "KafkaTopic/tiny".into(),
                message: "1 < 3".into(),
            },
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 validation error(s)"));
        assert!(text.contains("KafkaTopic/Bad"));
        assert!(text.contains("KafkaTopic/tiny"));
    }

    #[test]
    fn test_unsupported_resource_names_type() {
        let err = Error::UnsupportedResource {
            resource_type: ResourceType::new("kafka.streamform.io", "v1", "KafkaQuota"),
            category: "controller".into(),
        };
        assert_eq!(
            err.to_string(),
            "unsupported resource type kafka.streamform.io/v1/KafkaQuota: no controller registered"
        );
    }
}
