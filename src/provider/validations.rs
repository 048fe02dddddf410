//! Validations for the local provider
//!
//! Both validations are inactive until their setting is present, and read
//! their failure policy from `<setting>-policy` (`fail`, `continue` or
//! `filter`).

use declarative::{
    ConfigError, ConfigProperty, Configuration, FailurePolicy, Resource, Validation,
    ValidationOutcome,
};
use regex::Regex;

pub fn topic_name_regex_property() -> ConfigProperty<String> {
    ConfigProperty::new("topic-name-regex", "Pattern every topic name must match")
}

pub fn topic_min_partitions_property() -> ConfigProperty<u64> {
    ConfigProperty::new("topic-min-partitions", "Smallest partition count allowed")
}

fn policy_key(key: &str) -> String {
    format!("{key}-policy")
}

/// Topic names must fully match `topic-name-regex`
#[derive(Debug, Default)]
pub struct TopicNameRegexValidation {
    pattern: Option<Regex>,
    policy: FailurePolicy,
}

impl Validation for TopicNameRegexValidation {
    fn configure(&mut self, config: &Configuration) -> Result<(), ConfigError> {
        let property = topic_name_regex_property();
        self.pattern = match property.get(config) {
            None => None,
            Some(raw) => {
                let anchored = format!("^(?:{raw})$");
                let regex = Regex::new(&anchored)
                    .map_err(|e| ConfigError::invalid(property.key, e.to_string()))?;
                Some(regex)
            }
        };
        self.policy = FailurePolicy::from_config(config, &policy_key(property.key))?;
        Ok(())
    }

    fn validate(&self, resource: &Resource) -> ValidationOutcome {
        match &self.pattern {
            Some(regex) if !regex.is_match(resource.name()) => ValidationOutcome::invalid(format!(
                "name '{}' does not match {}",
                resource.name(),
                regex.as_str()
            )),
            _ => ValidationOutcome::Valid,
        }
    }

    fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }
}

/// Topics need at least `topic-min-partitions` partitions
#[derive(Debug, Default)]
pub struct TopicMinPartitionsValidation {
    min: Option<u64>,
    policy: FailurePolicy,
}

impl Validation for TopicMinPartitionsValidation {
    fn configure(&mut self, config: &Configuration) -> Result<(), ConfigError> {
        let property = topic_min_partitions_property();
        self.min = property.get(config)?;
        self.policy = FailurePolicy::from_config(config, &policy_key(property.key))?;
        Ok(())
    }

    fn validate(&self, resource: &Resource) -> ValidationOutcome {
        let Some(min) = self.min else {
            return ValidationOutcome::Valid;
        };
        if resource.is_marked_for_deletion() {
            return ValidationOutcome::Valid;
        }
        match resource.spec_field("partitions").and_then(|v| v.as_u64()) {
            Some(partitions) if partitions >= min => ValidationOutcome::Valid,
            Some(partitions) => ValidationOutcome::invalid(format!(
                "{partitions} partition(s), at least {min} required"
            )),
            None => ValidationOutcome::invalid("partitions is missing or not a number"),
        }
    }

    fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }
}
