//! Extension traits and their tagged union
//!
//! Every pluggable piece of the pipeline implements one of the category
//! traits below. The registry stores factories producing an [`Extension`],
//! so dispatch happens on the variant tag rather than on runtime type
//! introspection.

use crate::config::{ConfigError, Configuration};
use crate::context::ReconcileContext;
use crate::executor::{ChangeExecutor, ChangeHandler};
use crate::resource::{Resource, ResourceList, ResourceType};
use crate::selector::Selector;
use crate::types::{ChangeResult, ResourceChange};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Category an extension belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtensionCategory {
    Controller,
    Collector,
    Transformation,
    Validation,
    Converter,
    Action,
    HealthIndicator,
}

impl ExtensionCategory {
    pub const ALL: [Self; 7] = [
        Self::Controller,
        Self::Collector,
        Self::Transformation,
        Self::Validation,
        Self::Converter,
        Self::Action,
        Self::HealthIndicator,
    ];
}

impl fmt::Display for ExtensionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Controller => "controller",
            Self::Collector => "collector",
            Self::Transformation => "transformation",
            Self::Validation => "validation",
            Self::Converter => "converter",
            Self::Action => "action",
            Self::HealthIndicator => "health-indicator",
        };
        f.write_str(s)
    }
}

impl FromStr for ExtensionCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown extension category '{s}'"))
    }
}

/// One accepted `(group, kind)` with an optional pinned version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMatcher {
    pub group: String,
    pub kind: String,
    /// `None` accepts every version of the kind
    pub version: Option<String>,
}

impl TypeMatcher {
    pub fn matches(&self, rt: &ResourceType) -> bool {
        self.group == rt.group
            && self.kind == rt.kind
            && self.version.as_ref().is_none_or(|v| *v == rt.version)
    }
}

impl fmt::Display for TypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = self.version.as_deref().unwrap_or("*");
        if self.group.is_empty() {
            write!(f, "{version}/{}", self.kind)
        } else {
            write!(f, "{}/{version}/{}", self.group, self.kind)
        }
    }
}

/// Resource types an extension accepts
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Accepts {
    /// Every resource type
    #[default]
    Any,
    Types(Vec<TypeMatcher>),
}

impl Accepts {
    /// Every version of `group/kind`
    pub fn kind(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::Types(vec![TypeMatcher {
            group: group.into(),
            kind: kind.into(),
            version: None,
        }])
    }

    /// Exactly one resource type
    pub fn exact(rt: &ResourceType) -> Self {
        Self::Types(vec![TypeMatcher {
            group: rt.group.clone(),
            kind: rt.kind.clone(),
            version: Some(rt.version.clone()),
        }])
    }

    /// Add another every-version kind
    pub fn or_kind(self, group: impl Into<String>, kind: impl Into<String>) -> Self {
        let matcher = TypeMatcher {
            group: group.into(),
            kind: kind.into(),
            version: None,
        };
        match self {
            Self::Any => Self::Any,
            Self::Types(mut types) => {
                types.push(matcher);
                Self::Types(types)
            }
        }
    }

    pub fn accepts(&self, rt: &ResourceType) -> bool {
        match self {
            Self::Any => true,
            Self::Types(types) => types.iter().any(|t| t.matches(rt)),
        }
    }
}

impl fmt::Display for Accepts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Types(types) => {
                let names: Vec<String> = types.iter().map(ToString::to_string).collect();
                f.write_str(&names.join(", "))
            }
        }
    }
}

/// Fetches the actual state of one resource kind from a backend
///
/// Must be idempotent and free of side effects.
pub trait Collector: Send + Sync {
    fn configure(&mut self, _config: &Configuration) -> std::result::Result<(), ConfigError> {
        Ok(())
    }

    fn list_all(&self, config: &Configuration, selector: &dyn Selector) -> Result<Vec<Resource>>;
}

/// Plans and executes changes for one resource kind
pub trait Controller: Send + Sync {
    fn configure(&mut self, _config: &Configuration) -> std::result::Result<(), ConfigError> {
        Ok(())
    }

    /// Collect actual state and diff it against `expected`.
    fn plan(&self, expected: &[Resource], ctx: &ReconcileContext) -> Result<Vec<ResourceChange>>;

    /// Open a backend session and return the handlers bound to it.
    ///
    /// The session lives as long as the returned handlers.
    fn handlers(&self, ctx: &ReconcileContext) -> Result<Vec<Arc<dyn ChangeHandler>>>;

    fn execute(&self, changes: Vec<ResourceChange>, ctx: &ReconcileContext) -> Result<Vec<ChangeResult>> {
        let handlers = self.handlers(ctx)?;
        let executor = ChangeExecutor::new(handlers);
        Ok(executor.execute(changes, &ctx.options, ctx.progress.as_ref()))
    }
}

/// Mutates or drops a resource before diffing
pub trait Transformation: Send + Sync {
    fn configure(&mut self, _config: &Configuration) -> std::result::Result<(), ConfigError> {
        Ok(())
    }

    /// Return `None` to drop the resource from the run.
    ///
    /// `candidates` is the full input set, for cross-resource lookups.
    fn transform(&self, resource: Resource, candidates: &ResourceList) -> Result<Option<Resource>>;
}

/// What to do with a resource that fails a validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FailurePolicy {
    /// Abort the run, reporting every failure
    #[default]
    Fail,
    /// Log the failure and keep the resource
    Continue,
    /// Silently remove the resource
    Filter,
}

impl FailurePolicy {
    /// Read a policy from `key`, defaulting to `Fail`.
    pub fn from_config(config: &Configuration, key: &str) -> std::result::Result<Self, ConfigError> {
        match config.get_string(key) {
            None => Ok(Self::Fail),
            Some(s) => s.parse().map_err(|e: String| ConfigError::invalid(key, e)),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "continue" => Ok(Self::Continue),
            "filter" => Ok(Self::Filter),
            _ => Err(format!("unknown failure policy '{s}'")),
        }
    }
}

/// Verdict of one validation on one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(Vec<String>),
}

impl ValidationOutcome {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(vec![message.into()])
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Checks a resource before diffing
pub trait Validation: Send + Sync {
    fn configure(&mut self, _config: &Configuration) -> std::result::Result<(), ConfigError> {
        Ok(())
    }

    fn validate(&self, resource: &Resource) -> ValidationOutcome;

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Fail
    }
}

/// Normalizes resource shape, one input to many outputs
pub trait Converter: Send + Sync {
    fn configure(&mut self, _config: &Configuration) -> std::result::Result<(), ConfigError> {
        Ok(())
    }

    fn convert(&self, resource: Resource) -> Result<Vec<Resource>>;
}

/// Result of running an action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub message: String,
    pub resources: Vec<Resource>,
}

/// An imperative operation invoked by name
pub trait Action: Send + Sync {
    fn configure(&mut self, _config: &Configuration) -> std::result::Result<(), ConfigError> {
        Ok(())
    }

    fn execute(&self, config: &Configuration) -> Result<ActionOutcome>;
}

/// Health of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub name: String,
    pub status: HealthStatus,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

impl Health {
    pub fn up(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Up,
            details: BTreeMap::new(),
        }
    }

    pub fn down(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Down,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Reports backend health within a time budget
pub trait HealthIndicator: Send + Sync {
    fn configure(&mut self, _config: &Configuration) -> std::result::Result<(), ConfigError> {
        Ok(())
    }

    fn get_health(&self, timeout: Duration) -> Health;
}

/// A constructed extension, tagged by category
pub enum Extension {
    Controller(Box<dyn Controller>),
    Collector(Box<dyn Collector>),
    Transformation(Box<dyn Transformation>),
    Validation(Box<dyn Validation>),
    Converter(Box<dyn Converter>),
    Action(Box<dyn Action>),
    HealthIndicator(Box<dyn HealthIndicator>),
}

impl Extension {
    pub fn category(&self) -> ExtensionCategory {
        match self {
            Self::Controller(_) => ExtensionCategory::Controller,
            Self::Collector(_) => ExtensionCategory::Collector,
            Self::Transformation(_) => ExtensionCategory::Transformation,
            Self::Validation(_) => ExtensionCategory::Validation,
            Self::Converter(_) => ExtensionCategory::Converter,
            Self::Action(_) => ExtensionCategory::Action,
            Self::HealthIndicator(_) => ExtensionCategory::HealthIndicator,
        }
    }

    pub fn configure(&mut self, config: &Configuration) -> std::result::Result<(), ConfigError> {
        match self {
            Self::Controller(e) => e.configure(config),
            Self::Collector(e) => e.configure(config),
            Self::Transformation(e) => e.configure(config),
            Self::Validation(e) => e.configure(config),
            Self::Converter(e) => e.configure(config),
            Self::Action(e) => e.configure(config),
            Self::HealthIndicator(e) => e.configure(config),
        }
    }

    pub fn into_controller(self) -> Option<Box<dyn Controller>> {
        match self {
            Self::Controller(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_collector(self) -> Option<Box<dyn Collector>> {
        match self {
            Self::Collector(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_transformation(self) -> Option<Box<dyn Transformation>> {
        match self {
            Self::Transformation(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_validation(self) -> Option<Box<dyn Validation>> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_converter(self) -> Option<Box<dyn Converter>> {
        match self {
            Self::Converter(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_action(self) -> Option<Box<dyn Action>> {
        match self {
            Self::Action(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_health_indicator(self) -> Option<Box<dyn HealthIndicator>> {
        match self {
            Self::HealthIndicator(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extension({})", self.category())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_any_version() {
        let accepts = Accepts::kind("kafka.streamform.io", "KafkaTopic");
        assert!(accepts.accepts(&ResourceType::new("kafka.streamform.io", "v1", "KafkaTopic")));
        assert!(accepts.accepts(&ResourceType::new("kafka.streamform.io", "v2", "KafkaTopic")));
        assert!(!accepts.accepts(&ResourceType::new("other.io", "v1", "KafkaTopic")));
    }

    #[test]
    fn test_accepts_exact_version() {
        let rt = ResourceType::new("kafka.streamform.io", "v1", "KafkaTopic");
        let accepts = Accepts::exact(&rt);
        assert!(accepts.accepts(&rt));
        assert!(!accepts.accepts(&ResourceType::new("kafka.streamform.io", "v2", "KafkaTopic")));
    }

    #[test]
    fn test_or_kind() {
        let accepts = Accepts::kind("g", "A").or_kind("g", "B");
        assert!(accepts.accepts(&ResourceType::new("g", "v1", "B")));
        assert_eq!(accepts.to_string(), "g/*/A, g/*/B");
    }

    #[test]
    fn test_failure_policy_from_config() {
        let config = Configuration::new().with("policy", "filter");
        assert_eq!(FailurePolicy::from_config(&config, "policy").unwrap(), FailurePolicy::Filter);
        assert_eq!(FailurePolicy::from_config(&config, "missing").unwrap(), FailurePolicy::Fail);
        let bad = Configuration::new().with("policy", "explode");
        assert!(FailurePolicy::from_config(&bad, "policy").is_err());
    }

    #[test]
    fn test_category_round_trip() {
        for category in ExtensionCategory::ALL {
            assert_eq!(category.to_string().parse::<ExtensionCategory>().unwrap(), category);
        }
    }
}
