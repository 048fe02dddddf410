//! Selector engine - predicates over resources
//!
//! Selectors decide which resources take part in a run. They are pure and
//! `Send + Sync`, so a single instance can be shared across threads and
//! evaluated any number of times.
//!
//! Expression syntax:
//!
//! ```text
//! kind == KafkaTopic
//! metadata.name != scratch
//! metadata.labels.env in (prod, staging)
//! metadata.labels.team notin (sandbox)
//! metadata.annotations.owner exists
//! metadata.labels.tmp !exists
//! spec.partitions == 3
//! metadata.name matches ^orders-.*
//! ```

use crate::resource::{Resource, lookup_path};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Malformed selector expressions, raised at construction time
#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("empty selector expression")]
    Empty,

    #[error("unknown selector key '{key}' in '{expression}'")]
    UnknownKey { expression: String, key: String },

    #[error("unknown selector operator '{operator}' in '{expression}'")]
    UnknownOperator {
        expression: String,
        operator: String,
    },

    #[error("malformed selector '{expression}': {message}")]
    Malformed { expression: String, message: String },

    #[error("invalid regex in selector '{expression}': {source}")]
    InvalidRegex {
        expression: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown matching strategy '{0}' (expected all, any or none)")]
    UnknownStrategy(String),
}

/// A named predicate over a resource
pub trait Selector: Send + Sync + fmt::Debug {
    /// Short description used in logs
    fn name(&self) -> String;

    /// Whether the resource is selected
    fn apply(&self, resource: &Resource) -> bool;
}

/// Shared, type-erased selector
pub type SharedSelector = Arc<dyn Selector>;

/// Selector that accepts every resource
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSelector;

/// The default selector when no filtering is configured
pub const NO_SELECTOR: NoSelector = NoSelector;

impl Selector for NoSelector {
    fn name(&self) -> String {
        "*".to_string()
    }

    fn apply(&self, _resource: &Resource) -> bool {
        true
    }
}

/// How child selector verdicts combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorMatchingStrategy {
    /// Every child must match (vacuously true when empty)
    #[default]
    All,
    /// At least one child must match (false when empty)
    Any,
    /// No child may match (true when empty)
    None,
}

impl fmt::Display for SelectorMatchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::Any => write!(f, "ANY"),
            Self::None => write!(f, "NONE"),
        }
    }
}

impl FromStr for SelectorMatchingStrategy {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "any" => Ok(Self::Any),
            "none" => Ok(Self::None),
            _ => Err(SelectorError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Combines child selectors with a matching strategy
#[derive(Debug, Clone)]
pub struct AggregateSelector {
    strategy: SelectorMatchingStrategy,
    selectors: Vec<SharedSelector>,
}

impl AggregateSelector {
    pub fn new(strategy: SelectorMatchingStrategy, selectors: Vec<SharedSelector>) -> Self {
        Self {
            strategy,
            selectors,
        }
    }

    pub fn all(selectors: Vec<SharedSelector>) -> Self {
        Self::new(SelectorMatchingStrategy::All, selectors)
    }

    pub fn any(selectors: Vec<SharedSelector>) -> Self {
        Self::new(SelectorMatchingStrategy::Any, selectors)
    }

    pub fn none(selectors: Vec<SharedSelector>) -> Self {
        Self::new(SelectorMatchingStrategy::None, selectors)
    }
}

impl Selector for AggregateSelector {
    fn name(&self) -> String {
        let names: Vec<String> = self.selectors.iter().map(|s| s.name()).collect();
        format!("{}({})", self.strategy, names.join(", "))
    }

    fn apply(&self, resource: &Resource) -> bool {
        match self.strategy {
            SelectorMatchingStrategy::All => self.selectors.iter().all(|s| s.apply(resource)),
            SelectorMatchingStrategy::Any => self.selectors.iter().any(|s| s.apply(resource)),
            SelectorMatchingStrategy::None => !self.selectors.iter().any(|s| s.apply(resource)),
        }
    }
}

/// Matches resources carrying every given label with the given value
#[derive(Debug, Clone, Default)]
pub struct LabelSelector {
    labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }

    /// Parse `k1=v1,k2=v2`
    pub fn parse(spec: &str) -> Result<Self, SelectorError> {
        let mut labels = BTreeMap::new();
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').ok_or_else(|| SelectorError::Malformed {
                expression: spec.to_string(),
                message: format!("'{pair}' is not key=value"),
            })?;
            labels.insert(k.trim().to_string(), v.trim().to_string());
        }
        Ok(Self { labels })
    }
}

impl Selector for LabelSelector {
    fn name(&self) -> String {
        let pairs: Vec<String> = self.labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("labels({})", pairs.join(","))
    }

    fn apply(&self, resource: &Resource) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| resource.metadata.labels.get(k) == Some(v))
    }
}

/// Wraps an opaque predicate (e.g. an externally compiled expression)
pub struct PredicateSelector {
    name: String,
    predicate: Box<dyn Fn(&Resource) -> bool + Send + Sync>,
}

impl PredicateSelector {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&Resource) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl fmt::Debug for PredicateSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateSelector")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Selector for PredicateSelector {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn apply(&self, resource: &Resource) -> bool {
        (self.predicate)(resource)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SelectorKey {
    Kind,
    ApiVersion,
    Name,
    Label(String),
    Annotation(String),
    Spec(String),
}

impl SelectorKey {
    fn parse(expression: &str, key: &str) -> Result<Self, SelectorError> {
        let unknown = || SelectorError::UnknownKey {
            expression: expression.to_string(),
            key: key.to_string(),
        };
        match key {
            "kind" => Ok(Self::Kind),
            "apiVersion" => Ok(Self::ApiVersion),
            "metadata.name" | "name" => Ok(Self::Name),
            _ => {
                if let Some(label) = key.strip_prefix("metadata.labels.") {
                    Ok(Self::Label(label.to_string()))
                } else if let Some(annotation) = key.strip_prefix("metadata.annotations.") {
                    Ok(Self::Annotation(annotation.to_string()))
                } else if let Some(path) = key.strip_prefix("spec.") {
                    Ok(Self::Spec(path.to_string()))
                } else {
                    Err(unknown())
                }
            }
        }
    }

    fn resolve(&self, resource: &Resource) -> Option<String> {
        match self {
            Self::Kind => Some(resource.kind.clone()),
            Self::ApiVersion => Some(resource.api_version.clone()),
            Self::Name => Some(resource.metadata.name.clone()),
            Self::Label(k) => resource.metadata.labels.get(k).cloned(),
            Self::Annotation(k) => resource.metadata.annotations.get(k).map(render),
            Self::Spec(path) => lookup_path(&resource.spec, path).map(render),
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
enum Operator {
    Eq(String),
    NotEq(String),
    In(Vec<String>),
    NotIn(Vec<String>),
    Exists,
    NotExists,
    Matches(Regex),
}

/// Selector compiled from a `<key> <operator> [value]` expression
#[derive(Debug, Clone)]
pub struct ExpressionSelector {
    expression: String,
    key: SelectorKey,
    operator: Operator,
}

impl ExpressionSelector {
    /// Compile an expression, failing on any syntax problem.
    pub fn parse(expression: &str) -> Result<Self, SelectorError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::Empty);
        }
        let malformed = |message: &str| SelectorError::Malformed {
            expression: trimmed.to_string(),
            message: message.to_string(),
        };

        let key_end = trimmed
            .find(|c: char| c.is_whitespace() || c == '=' || c == '!')
            .unwrap_or(trimmed.len());
        let (key_str, rest) = trimmed.split_at(key_end);
        if key_str.is_empty() {
            return Err(malformed("missing key"));
        }
        let key = SelectorKey::parse(trimmed, key_str)?;
        let rest = rest.trim_start();

        let operator = if let Some(value) = rest.strip_prefix("==") {
            Operator::Eq(single_value(value).ok_or_else(|| malformed("missing value"))?)
        } else if let Some(value) = rest.strip_prefix("!=") {
            Operator::NotEq(single_value(value).ok_or_else(|| malformed("missing value"))?)
        } else if let Some(value) = rest.strip_prefix('=') {
            Operator::Eq(single_value(value).ok_or_else(|| malformed("missing value"))?)
        } else {
            let (word, args) = match rest.split_once(char::is_whitespace) {
                Some((w, a)) => (w, a.trim()),
                None => (rest, ""),
            };
            match word.to_ascii_lowercase().as_str() {
                "in" => Operator::In(value_list(args).ok_or_else(|| malformed("expected (a, b, ...)"))?),
                "notin" => {
                    Operator::NotIn(value_list(args).ok_or_else(|| malformed("expected (a, b, ...)"))?)
                }
                "exists" if args.is_empty() => Operator::Exists,
                "!exists" if args.is_empty() => Operator::NotExists,
                "exists" | "!exists" => return Err(malformed("exists takes no value")),
                "matches" => {
                    if args.is_empty() {
                        return Err(malformed("missing pattern"));
                    }
                    let regex = Regex::new(&unquote(args)).map_err(|source| {
                        SelectorError::InvalidRegex {
                            expression: trimmed.to_string(),
                            source,
                        }
                    })?;
                    Operator::Matches(regex)
                }
                "" => return Err(malformed("missing operator")),
                other => {
                    return Err(SelectorError::UnknownOperator {
                        expression: trimmed.to_string(),
                        operator: other.to_string(),
                    });
                }
            }
        };

        Ok(Self {
            expression: trimmed.to_string(),
            key,
            operator,
        })
    }
}

impl Selector for ExpressionSelector {
    fn name(&self) -> String {
        self.expression.clone()
    }

    fn apply(&self, resource: &Resource) -> bool {
        let value = self.key.resolve(resource);
        match &self.operator {
            Operator::Eq(expected) => value.as_deref() == Some(expected.as_str()),
            Operator::NotEq(expected) => value.as_deref() != Some(expected.as_str()),
            Operator::In(values) => value.is_some_and(|v| values.contains(&v)),
            Operator::NotIn(values) => !value.is_some_and(|v| values.contains(&v)),
            Operator::Exists => value.is_some(),
            Operator::NotExists => value.is_none(),
            Operator::Matches(regex) => value.is_some_and(|v| regex.is_match(&v)),
        }
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    let stripped = s
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')));
    stripped.unwrap_or(s).to_string()
}

fn single_value(s: &str) -> Option<String> {
    let value = unquote(s);
    (!value.is_empty()).then_some(value)
}

fn value_list(s: &str) -> Option<Vec<String>> {
    let inner = s.trim().strip_prefix('(')?.strip_suffix(')')?;
    let values: Vec<String> = inner
        .split(',')
        .map(unquote)
        .filter(|v| !v.is_empty())
        .collect();
    (!values.is_empty()).then_some(values)
}

/// Compile expressions into one selector combined with `strategy`.
///
/// No expressions yields [`NO_SELECTOR`].
pub fn parse_expressions<S: AsRef<str>>(
    expressions: &[S],
    strategy: SelectorMatchingStrategy,
) -> Result<SharedSelector, SelectorError> {
    if expressions.is_empty() {
        return Ok(Arc::new(NO_SELECTOR));
    }
    let selectors = expressions
        .iter()
        .map(|e| ExpressionSelector::parse(e.as_ref()).map(|s| Arc::new(s) as SharedSelector))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Arc::new(AggregateSelector::new(strategy, selectors)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn topic(name: &str, env: &str, partitions: u64) -> Resource {
        Resource::new(
            "kafka.streamform.io/v1",
            "KafkaTopic",
            name,
            json!({"partitions": partitions}),
        )
        .with_label("env", env)
    }

    fn expr(s: &str) -> SharedSelector {
        Arc::new(ExpressionSelector::parse(s).unwrap())
    }

    #[test]
    fn test_empty_aggregates() {
        let r = topic("t1", "prod", 3);
        assert!(AggregateSelector::all(vec![]).apply(&r));
        assert!(!AggregateSelector::any(vec![]).apply(&r));
        assert!(AggregateSelector::none(vec![]).apply(&r));
    }

    #[test]
    fn test_single_selector_identity() {
        let matching = topic("t1", "prod", 3);
        let other = topic("t2", "dev", 3);
        let s = expr("metadata.labels.env == prod");
        for r in [&matching, &other] {
            assert_eq!(AggregateSelector::all(vec![s.clone()]).apply(r), s.apply(r));
            assert_eq!(AggregateSelector::any(vec![s.clone()]).apply(r), s.apply(r));
        }
    }

    #[test]
    fn test_all_equals_none_of_negations() {
        let list = vec![expr("kind == KafkaTopic"), expr("spec.partitions == 3")];
        let negated: Vec<SharedSelector> = list
            .iter()
            .map(|s| Arc::new(AggregateSelector::none(vec![s.clone()])) as SharedSelector)
            .collect();
        for r in [topic("a", "prod", 3), topic("b", "prod", 6)] {
            assert_eq!(
                AggregateSelector::all(list.clone()).apply(&r),
                AggregateSelector::none(negated.clone()).apply(&r)
            );
        }
    }

    #[test]
    fn test_no_selector_accepts_everything() {
        assert!(NO_SELECTOR.apply(&topic("t", "x", 1)));
    }

    #[test]
    fn test_operators() {
        let r = topic("orders-v1", "prod", 3).with_annotation("owner", "payments");
        assert!(expr("metadata.name==orders-v1").apply(&r));
        assert!(expr("metadata.name != other").apply(&r));
        assert!(expr("metadata.labels.env in (prod, staging)").apply(&r));
        assert!(!expr("metadata.labels.env notin (prod)").apply(&r));
        assert!(expr("metadata.labels.team notin (sandbox)").apply(&r));
        assert!(expr("metadata.annotations.owner exists").apply(&r));
        assert!(expr("metadata.labels.tmp !exists").apply(&r));
        assert!(expr("spec.partitions = 3").apply(&r));
        assert!(expr("metadata.name matches ^orders-.*").apply(&r));
        assert!(!expr("kind == KafkaAcl").apply(&r));
    }

    #[test]
    fn test_malformed_expressions_fail_fast() {
        assert!(matches!(ExpressionSelector::parse("  "), Err(SelectorError::Empty)));
        assert!(matches!(
            ExpressionSelector::parse("color == red"),
            Err(SelectorError::UnknownKey { .. })
        ));
        assert!(matches!(
            ExpressionSelector::parse("kind like Topic"),
            Err(SelectorError::UnknownOperator { .. })
        ));
        assert!(matches!(
            ExpressionSelector::parse("kind in prod"),
            Err(SelectorError::Malformed { .. })
        ));
        assert!(matches!(
            ExpressionSelector::parse("metadata.name matches ([a-z"),
            Err(SelectorError::InvalidRegex { .. })
        ));
        assert!(matches!(
            ExpressionSelector::parse("kind =="),
            Err(SelectorError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_expressions_strategy() {
        let any = parse_expressions(
            &["metadata.name == a", "metadata.name == b"],
            SelectorMatchingStrategy::Any,
        )
        .unwrap();
        assert!(any.apply(&topic("a", "x", 1)));
        assert!(any.apply(&topic("b", "x", 1)));
        assert!(!any.apply(&topic("c", "x", 1)));

        let none: Vec<&str> = Vec::new();
        let default = parse_expressions(&none, SelectorMatchingStrategy::All).unwrap();
        assert!(default.apply(&topic("c", "x", 1)));
    }

    #[test]
    fn test_label_selector() {
        let s = LabelSelector::parse("env=prod").unwrap();
        assert!(s.apply(&topic("a", "prod", 1)));
        assert!(!s.apply(&topic("a", "dev", 1)));
        assert!(LabelSelector::parse("env").is_err());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("ANY".parse::<SelectorMatchingStrategy>().unwrap(), SelectorMatchingStrategy::Any);
        assert!("some".parse::<SelectorMatchingStrategy>().is_err());
    }
}
