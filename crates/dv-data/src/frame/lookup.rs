//! Lookup-backed frames
//!
//! Entity properties are fetched per dimension. A [`LookupFrame`] answers a
//! full key such as `{geo: "swe", gender: "female"}` with the property of
//! every dimension it knows about: `{name: {geo: "Sweden", gender: "Female"}}`.

use indexmap::IndexMap;

use dv_core::{ConceptId, Row, Space, Value};

/// concept -> dimension -> raw key -> value
pub type ConceptLookups = IndexMap<ConceptId, IndexMap<ConceptId, IndexMap<String, Value>>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupFrame {
    key: Space,
    lookups: ConceptLookups,
    rows: Vec<Row>,
}

impl LookupFrame {
    /// Build a frame addressed by `key` over the given lookups
    pub fn from_lookups(lookups: ConceptLookups, key: Space) -> Self {
        let mut rows = Vec::new();
        for (concept, dims) in &lookups {
            for (dim, entries) in dims {
                for (raw_key, value) in entries {
                    let mut row = Row::new();
                    row.insert(dim.clone(), Value::from(raw_key.as_str()));
                    row.insert(concept.clone(), value.clone());
                    rows.push(row);
                }
            }
        }
        Self { key, lookups, rows }
    }

    pub fn key(&self) -> &Space {
        &self.key
    }

    pub fn lookups(&self) -> &ConceptLookups {
        &self.lookups
    }

    /// Property value of a single entity
    pub fn lookup(&self, concept: &str, dim: &str, key: &str) -> Option<&Value> {
        self.lookups.get(concept)?.get(dim)?.get(key)
    }

    /// Per-concept, per-dimension values for a key object. Dimensions missing
    /// from the key or from the lookups are left out.
    pub fn get(&self, key: &Row) -> Option<IndexMap<ConceptId, Row>> {
        let mut result = IndexMap::new();
        for (concept, dims) in &self.lookups {
            let mut values = Row::new();
            for (dim, entries) in dims {
                let Some(raw) = key.get(dim) else { continue };
                if let Some(value) = entries.get(&raw.to_string()) {
                    values.insert(dim.clone(), value.clone());
                }
            }
            if !values.is_empty() {
                result.insert(concept.clone(), values);
            }
        }
        (!result.is_empty()).then_some(result)
    }

    /// One synthetic row `{dim: key, concept: value}` per lookup entry
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
