//! Extension registry and factory
//!
//! Providers call [`ExtensionRegistry::register`] explicitly at startup;
//! nothing is discovered implicitly. Once built, the registry is shared
//! read-only (typically behind an `Arc`).

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::extension::{Accepts, Extension, ExtensionCategory};
use crate::resource::ResourceType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a fresh, unconfigured extension instance
pub type ExtensionFactory = Arc<dyn Fn() -> Extension + Send + Sync>;

pub const HIGHEST_PRIORITY: i32 = i32::MIN;
pub const DEFAULT_PRIORITY: i32 = 0;
pub const LOWEST_PRIORITY: i32 = i32::MAX;

/// Registry entry for one extension
#[derive(Clone)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub category: ExtensionCategory,
    pub accepts: Accepts,
    /// Lower values are evaluated first
    pub priority: i32,
    pub provider: Option<String>,
    pub description: String,
    factory: ExtensionFactory,
}

impl ExtensionDescriptor {
    pub fn new(
        name: impl Into<String>,
        category: ExtensionCategory,
        factory: impl Fn() -> Extension + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            accepts: Accepts::Any,
            priority: DEFAULT_PRIORITY,
            provider: None,
            description: String::new(),
            factory: Arc::new(factory),
        }
    }

    pub fn accepts(mut self, accepts: Accepts) -> Self {
        self.accepts = accepts;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Names this extension can be looked up by
    pub fn aliases(&self) -> Vec<String> {
        derive_aliases(&self.name, self.provider.as_deref())
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.aliases().iter().any(|a| a == name)
    }

    /// Same identity and dispatch-relevant fields
    fn is_compatible(&self, other: &Self) -> bool {
        self.name == other.name
            && self.category == other.category
            && self.accepts == other.accepts
            && self.priority == other.priority
            && self.provider == other.provider
    }
}

impl fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("accepts", &self.accepts)
            .field("priority", &self.priority)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

/// Derive lookup names: canonical, kebab-case, provider-prefixed kebab-case.
pub fn derive_aliases(name: &str, provider: Option<&str>) -> Vec<String> {
    let mut aliases = vec![name.to_string()];
    let kebab = to_kebab_case(name);
    if !aliases.contains(&kebab) {
        aliases.push(kebab.clone());
    }
    if let Some(provider) = provider {
        let prefix = format!("{}-", to_kebab_case(provider));
        let qualified = if kebab.starts_with(&prefix) {
            kebab
        } else {
            format!("{prefix}{kebab}")
        };
        if !aliases.contains(&qualified) {
            aliases.push(qualified);
        }
    }
    aliases
}

/// `KafkaTopicCollector` -> `kafka-topic-collector`, `ACLCollector` -> `acl-collector`
pub fn to_kebab_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '_' | '-' | ' ' | '.') {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            continue;
        }
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|j| chars[j]);
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Table of registered extensions
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    descriptors: Vec<ExtensionDescriptor>,
    by_name: HashMap<String, usize>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor.
    ///
    /// Re-registering an identical descriptor is a no-op; a different
    /// definition under an existing name is an error.
    pub fn register(&mut self, descriptor: ExtensionDescriptor) -> Result<()> {
        if let Some(&idx) = self.by_name.get(&descriptor.name) {
            if self.descriptors[idx].is_compatible(&descriptor) {
                log::debug!("Extension '{}' already registered", descriptor.name);
                return Ok(());
            }
            return Err(Error::DuplicateExtension(descriptor.name));
        }
        log::debug!(
            "Registered {} '{}' (accepts: {}, priority: {})",
            descriptor.category,
            descriptor.name,
            descriptor.accepts,
            descriptor.priority
        );
        self.by_name
            .insert(descriptor.name.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// All descriptors of a category in evaluation order
    pub fn all(&self, category: ExtensionCategory) -> Vec<&ExtensionDescriptor> {
        let mut found: Vec<&ExtensionDescriptor> = self
            .descriptors
            .iter()
            .filter(|d| d.category == category)
            .collect();
        sort_by_priority(&mut found);
        found
    }

    /// Descriptors of `category` accepting `rt`, in evaluation order
    pub fn find(&self, category: ExtensionCategory, rt: &ResourceType) -> Vec<&ExtensionDescriptor> {
        let mut found: Vec<&ExtensionDescriptor> = self
            .descriptors
            .iter()
            .filter(|d| d.category == category && d.accepts.accepts(rt))
            .collect();
        sort_by_priority(&mut found);
        found
    }

    /// The authoritative descriptor of `category` for `rt`.
    ///
    /// Several matches resolve to the first in evaluation order and are
    /// logged rather than rejected.
    pub fn find_one(&self, category: ExtensionCategory, rt: &ResourceType) -> Result<&ExtensionDescriptor> {
        let found = self.find(category, rt);
        match found.as_slice() {
            [] => Err(Error::UnsupportedResource {
                resource_type: rt.clone(),
                category: category.to_string(),
            }),
            [only] => Ok(only),
            [first, rest @ ..] => {
                let ignored: Vec<&str> = rest.iter().map(|d| d.name.as_str()).collect();
                log::warn!(
                    "Several {category}s accept {rt}; using '{}' and ignoring {}",
                    first.name,
                    ignored.join(", ")
                );
                Ok(first)
            }
        }
    }

    /// Look up a descriptor by canonical name or alias
    pub fn get(&self, name: &str) -> Result<&ExtensionDescriptor> {
        if let Some(&idx) = self.by_name.get(name) {
            return Ok(&self.descriptors[idx]);
        }
        self.descriptors
            .iter()
            .find(|d| d.matches_name(name))
            .ok_or_else(|| Error::UnknownExtension(name.to_string()))
    }

    /// Construct and configure an instance of `descriptor`.
    pub fn instantiate(&self, descriptor: &ExtensionDescriptor, config: &Configuration) -> Result<Extension> {
        let mut extension = (descriptor.factory)();
        if extension.category() != descriptor.category {
            return Err(Error::extension(
                &descriptor.name,
                anyhow::anyhow!(
                    "factory produced a {} instead of a {}",
                    extension.category(),
                    descriptor.category
                ),
            ));
        }
        extension
            .configure(config)
            .map_err(|source| Error::Configuration {
                extension: descriptor.name.clone(),
                source,
            })?;
        Ok(extension)
    }
}

fn sort_by_priority(descriptors: &mut [&ExtensionDescriptor]) {
    descriptors.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.descriptors).finish()
    }
}
