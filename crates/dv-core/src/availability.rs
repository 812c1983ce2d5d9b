//! Availability index: which concepts exist for which key spaces

use ahash::AHashMap;
use indexmap::{IndexMap, IndexSet};

use crate::concept::{ConceptId, Space};

/// Precomputed knowledge of the (space, concept) pairs a source can answer
#[derive(Debug, Clone, Default)]
pub struct Availability {
    /// Every known key space, in discovery order, by key string
    key_lookup: IndexMap<String, Space>,

    /// Concepts observed per key space, in discovery order
    key_value_lookup: AHashMap<String, IndexSet<ConceptId>>,
}

impl Availability {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from `(space, concept)` pairs
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Space, ConceptId)>,
    {
        let mut availability = Self::new();
        for (space, concept) in pairs {
            availability.insert(space, concept);
        }
        availability
    }

    /// Register a space without any concepts
    pub fn add_space(&mut self, space: Space) {
        let key = space.key_str();
        self.key_value_lookup.entry(key.clone()).or_default();
        self.key_lookup.entry(key).or_insert(space);
    }

    /// Record that `concept` is available in `space`
    pub fn insert(&mut self, space: Space, concept: ConceptId) {
        let key = space.key_str();
        self.key_value_lookup.entry(key.clone()).or_default().insert(concept);
        self.key_lookup.entry(key).or_insert(space);
    }

    /// Every known key space
    pub fn all_spaces(&self) -> impl Iterator<Item = &Space> {
        self.key_lookup.values()
    }

    /// Concepts available for exactly this space
    pub fn concepts_for(&self, space: &Space) -> Option<&IndexSet<ConceptId>> {
        self.key_value_lookup.get(&space.key_str())
    }

    /// Whether `concept` is available in `space`
    pub fn is_available(&self, space: &Space, concept: &str) -> bool {
        self.concepts_for(space)
            .map(|concepts| concepts.contains(concept))
            .unwrap_or(false)
    }

    pub fn space_count(&self) -> usize {
        self.key_lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_lookup.is_empty()
    }
}
