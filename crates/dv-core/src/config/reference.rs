//! Symbolic configuration references
//!
//! A reference (`{"ref": "markers.bubble.space"}`) means "use whatever value is
//! registered under this path". Paths live in a shared [`RefTable`]; resolving
//! follows chains of references until a concrete value is reached.

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{ConceptConfig, ConfigValue, SpaceConfig};
use crate::concept::Space;
use crate::value::Value;
use crate::ConfigError;

/// Longest reference chain followed before giving up
const MAX_REFERENCE_DEPTH: usize = 16;

/// A symbolic pointer to another piece of configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reference {
    #[serde(rename = "ref")]
    pub path: String,
}

impl Reference {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// A value registered in the reference table
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Space(SpaceConfig),
    Concept(ConceptConfig),
    Value(Value),
    Text(String),
}

impl From<SpaceConfig> for ConfigNode {
    fn from(config: SpaceConfig) -> Self {
        ConfigNode::Space(config)
    }
}

impl From<Space> for ConfigNode {
    fn from(space: Space) -> Self {
        ConfigNode::Space(SpaceConfig::Fixed(space))
    }
}

impl From<ConceptConfig> for ConfigNode {
    fn from(config: ConceptConfig) -> Self {
        ConfigNode::Concept(config)
    }
}

impl From<Value> for ConfigNode {
    fn from(value: Value) -> Self {
        ConfigNode::Value(value)
    }
}

impl From<String> for ConfigNode {
    fn from(text: String) -> Self {
        ConfigNode::Text(text)
    }
}

/// Configuration values that may be a [`Reference`]
pub trait Resolvable: Sized + Clone {
    /// The reference this value points through, if it is one
    fn reference(&self) -> Option<&Reference>;

    /// Interpret a table entry as this kind of value
    fn from_node(node: &ConfigNode) -> Option<Self>;
}

impl Resolvable for SpaceConfig {
    fn reference(&self) -> Option<&Reference> {
        match self {
            SpaceConfig::Ref(r) => Some(r),
            _ => None,
        }
    }

    fn from_node(node: &ConfigNode) -> Option<Self> {
        match node {
            ConfigNode::Space(config) => Some(config.clone()),
            _ => None,
        }
    }
}

impl Resolvable for ConceptConfig {
    fn reference(&self) -> Option<&Reference> {
        match self {
            ConceptConfig::Ref(r) => Some(r),
            _ => None,
        }
    }

    fn from_node(node: &ConfigNode) -> Option<Self> {
        match node {
            ConfigNode::Concept(config) => Some(config.clone()),
            ConfigNode::Text(id) => Some(ConceptConfig::Fixed(id.clone())),
            _ => None,
        }
    }
}

impl Resolvable for ConfigValue<Value> {
    fn reference(&self) -> Option<&Reference> {
        match self {
            ConfigValue::Ref(r) => Some(r),
            ConfigValue::Value(_) => None,
        }
    }

    fn from_node(node: &ConfigNode) -> Option<Self> {
        match node {
            ConfigNode::Value(value) => Some(ConfigValue::Value(value.clone())),
            ConfigNode::Text(text) => Some(ConfigValue::Value(Value::Text(text.clone()))),
            _ => None,
        }
    }
}

impl Resolvable for ConfigValue<String> {
    fn reference(&self) -> Option<&Reference> {
        match self {
            ConfigValue::Ref(r) => Some(r),
            ConfigValue::Value(_) => None,
        }
    }

    fn from_node(node: &ConfigNode) -> Option<Self> {
        match node {
            ConfigNode::Text(text) => Some(ConfigValue::Value(text.clone())),
            _ => None,
        }
    }
}

/// Shared table of reference targets
#[derive(Debug, Default)]
pub struct RefTable {
    entries: RwLock<AHashMap<String, ConfigNode>>,
    revision: AtomicU64,
}

impl RefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the value behind `path`
    pub fn set(&self, path: impl Into<String>, node: impl Into<ConfigNode>) {
        self.entries.write().insert(path.into(), node.into());
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    pub fn remove(&self, path: &str) -> Option<ConfigNode> {
        let removed = self.entries.write().remove(path);
        if removed.is_some() {
            self.revision.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    /// Bumped on every change, part of every solution fingerprint
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Follow references until a concrete value is reached
    pub fn resolve<T: Resolvable>(&self, value: &T) -> Result<T, ConfigError> {
        let entries = self.entries.read();
        let mut current = value.clone();
        let mut depth = 0;
        while let Some(reference) = current.reference() {
            let path = reference.path.clone();
            if depth >= MAX_REFERENCE_DEPTH {
                return Err(ConfigError::ReferenceCycle(path));
            }
            let node = entries
                .get(&path)
                .ok_or_else(|| ConfigError::UnresolvedReference(path.clone()))?;
            current = T::from_node(node).ok_or(ConfigError::ReferenceType(path))?;
            depth += 1;
        }
        Ok(current)
    }
}
