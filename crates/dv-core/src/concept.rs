//! Concepts and spaces
//!
//! A concept is a named variable in a data source. A space is the ordered set
//! of concepts that together form the key of a row.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a concept in a data source
pub type ConceptId = String;

/// Prefix of the entity-existence flag concepts (`is--country`)
pub const EXISTENCE_FLAG_PREFIX: &str = "is--";

/// The pseudo-dimension used by concept-catalog tables
pub const CONCEPT_DIMENSION: &str = "concept";

/// Separator used when building key strings
pub const KEY_SEPARATOR: char = '¬';

/// Whether a concept id is an entity-existence flag such as `is--country`
pub fn is_existence_flag(concept: &str) -> bool {
    concept.starts_with(EXISTENCE_FLAG_PREFIX)
}

/// Type tag of a concept
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptType {
    Measure,
    Time,
    EntitySet,
    EntityDomain,
    String,
    Boolean,
    #[serde(other)]
    Other,
}

impl ConceptType {
    /// Continuous types get a `[min, max]` domain, everything else a distinct-value set
    pub fn is_continuous(&self) -> bool {
        matches!(self, ConceptType::Measure | ConceptType::Time)
    }

    /// Entity domains and entity sets are the dimensions of a space
    pub fn is_entity(&self) -> bool {
        matches!(self, ConceptType::EntitySet | ConceptType::EntityDomain)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptType::Measure => "measure",
            ConceptType::Time => "time",
            ConceptType::EntitySet => "entity_set",
            ConceptType::EntityDomain => "entity_domain",
            ConceptType::String => "string",
            ConceptType::Boolean => "boolean",
            ConceptType::Other => "other",
        }
    }
}

/// Metadata of a concept as found in the concept catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Concept identifier
    pub concept: ConceptId,

    /// Type tag
    pub concept_type: ConceptType,

    /// Entity domain of an entity set (`geo` for `country`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<ConceptId>,

    /// Remaining catalog columns (name, description, ...)
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Concept {
    /// Create a concept with no extra properties
    pub fn new(concept: impl Into<ConceptId>, concept_type: ConceptType) -> Self {
        Self {
            concept: concept.into(),
            concept_type,
            domain: None,
            properties: serde_json::Map::new(),
        }
    }

    /// Builder-style setter for an extra catalog property
    pub fn with_property(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// Builder-style setter for the entity domain
    pub fn with_domain(mut self, domain: impl Into<ConceptId>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Look up a catalog field by name, including the fixed ones.
    /// Used by the predicate sub-language.
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "concept" => Some(self.concept.clone().into()),
            "concept_type" => Some(self.concept_type.as_str().into()),
            "domain" => self.domain.clone().map(Into::into),
            other => self.properties.get(other).cloned(),
        }
    }

    pub fn is_entity(&self) -> bool {
        self.concept_type.is_entity()
    }
}

/// An ordered set of concepts forming a composite key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Space(Vec<ConceptId>);

impl Space {
    pub fn new<I, S>(dims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ConceptId>,
    {
        Self(dims.into_iter().map(Into::into).collect())
    }

    pub fn dims(&self) -> &[ConceptId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, concept: &str) -> bool {
        self.0.iter().any(|dim| dim == concept)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConceptId> {
        self.0.iter()
    }

    /// Order-independent identity of the space, used as lookup key
    pub fn key_str(&self) -> String {
        let mut dims: Vec<&str> = self.0.iter().map(String::as_str).collect();
        dims.sort_unstable();
        dims.join(&KEY_SEPARATOR.to_string())
    }

    /// Dimensions of `self` that are also in `other`, in `self` order
    pub fn intersect(&self, other: &Space) -> Space {
        Space(
            self.0
                .iter()
                .filter(|dim| other.contains(dim))
                .cloned()
                .collect(),
        )
    }

    /// Same dimensions regardless of order
    pub fn same_dims(&self, other: &Space) -> bool {
        self.len() == other.len() && self.0.iter().all(|dim| other.contains(dim))
    }

    /// A space keyed by a dimension as well as by the `concept` pseudo-dimension
    /// is a catalog table, not data
    pub fn has_concept_dimension(&self) -> bool {
        self.contains(CONCEPT_DIMENSION)
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl From<Vec<ConceptId>> for Space {
    fn from(dims: Vec<ConceptId>) -> Self {
        Self(dims)
    }
}

impl From<&[&str]> for Space {
    fn from(dims: &[&str]) -> Self {
        Self::new(dims.iter().copied())
    }
}

impl<'a> IntoIterator for &'a Space {
    type Item = &'a ConceptId;
    type IntoIter = std::slice::Iter<'a, ConceptId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
