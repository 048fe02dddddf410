//! Resource model for declarative reconciliation
//!
//! A [`Resource`] is an immutable value: a typed, versioned and named
//! configuration object with an opaque, kind-specific `spec` payload.
//! Every "mutation" helper consumes the value and returns a new one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Well-known annotation keys understood by the core
pub mod annotations {
    /// Force deletion of the matching actual resource
    pub const DELETE: &str = "declarative.io/delete";
    /// Drop the resource from the run entirely
    pub const IGNORE: &str = "declarative.io/ignore";
    /// Provider that produced the resource (set by collectors)
    pub const PROVIDER: &str = "declarative.io/provider";
}

/// Dispatch identity of a resource: `(group, apiVersion, kind)`
///
/// The group is empty for resources declared with a bare version
/// (`apiVersion: v1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceType {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Resolve the type of a resource from its declared `apiVersion` and `kind`.
    pub fn of(resource: &Resource) -> Self {
        Self::from_api_version(&resource.api_version, resource.kind.clone())
    }

    /// Build a type from an `apiVersion` string (`group/version` or `version`)
    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Self {
        let (group, version) = split_api_version(api_version);
        Self::new(group, version, kind)
    }

    /// Render the `apiVersion` string (`group/version` or `version`)
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// Split `group/version` at the last separator.
fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.rsplit_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Resource metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Business name of the resource
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Value>,
}

/// A typed, versioned, named configuration object under reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Value,
}

impl Resource {
    /// Create a resource with empty labels and annotations
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        spec: Value,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata: ObjectMeta {
                name: name.into(),
                ..ObjectMeta::default()
            },
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn resource_type(&self) -> ResourceType {
        ResourceType::of(self)
    }

    /// Identity used in logs and results (`Kind/name`)
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind, self.metadata.name)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&Value> {
        self.metadata.annotations.get(key)
    }

    /// Read an annotation as a boolean flag
    ///
    /// Accepts both `true` and the string `"true"` (case-insensitive), since
    /// annotations frequently come from untyped sources.
    pub fn annotation_flag(&self, key: &str) -> bool {
        match self.annotation(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.annotation_flag(annotations::DELETE)
    }

    pub fn is_ignored(&self) -> bool {
        self.annotation_flag(annotations::IGNORE)
    }

    /// Look up a spec field by dotted path (`configs.retention.ms` is tried
    /// as a literal key first, then descended segment by segment).
    pub fn spec_field(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.spec, path)
    }
}

/// Resolve a dotted path inside a JSON value.
///
/// Keys that themselves contain dots (Kafka config names) are matched
/// greedily: at each level the longest existing key prefix wins.
pub(crate) fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let obj = value.as_object()?;
    if let Some(v) = obj.get(path) {
        return Some(v);
    }
    let mut split = path.len();
    while let Some(idx) = path[..split].rfind('.') {
        let (head, tail) = (&path[..idx], &path[idx + 1..]);
        if let Some(child) = obj.get(head)
            && let Some(found) = lookup_path(child, tail)
        {
            return Some(found);
        }
        split = idx;
    }
    None
}

/// An ordered collection of resources
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceList {
    items: Vec<Resource>,
}

impl ResourceList {
    pub fn new(items: Vec<Resource>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Resource] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Resource> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Resource> {
        self.items.iter()
    }

    /// Find a resource by kind and name
    pub fn find(&self, kind: &str, name: &str) -> Option<&Resource> {
        self.items
            .iter()
            .find(|r| r.kind == kind && r.metadata.name == name)
    }

    /// Group resources by type, preserving first-seen type order and the
    /// relative order of resources within each group.
    pub fn by_type(&self) -> Vec<(ResourceType, Vec<Resource>)> {
        let mut index: HashMap<ResourceType, usize> = HashMap::new();
        let mut groups: Vec<(ResourceType, Vec<Resource>)> = Vec::new();
        for resource in &self.items {
            let rt = resource.resource_type();
            match index.get(&rt) {
                Some(&i) => groups[i].1.push(resource.clone()),
                None => {
                    index.insert(rt.clone(), groups.len());
                    groups.push((rt, vec![resource.clone()]));
                }
            }
        }
        groups
    }
}

impl From<Vec<Resource>> for ResourceList {
    fn from(items: Vec<Resource>) -> Self {
        Self::new(items)
    }
}

impl IntoIterator for ResourceList {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResourceList {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
