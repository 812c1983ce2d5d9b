//! Predicate sub-language
//!
//! A small mongo-like predicate used for concept filters, space filters and
//! the `where` clause of queries, plus the marker/dimension [`Filter`] that
//! builds those `where` clauses for a given space.

use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

use crate::concept::{Concept, ConceptId, Space};
use crate::value::Row;

/// A predicate over named fields, e.g. `{"concept_type": {"$in": ["measure", "time"]}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Predicate(Map<String, Json>);

impl Predicate {
    /// The predicate that accepts everything
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Evaluate against an object whose fields are looked up through `field`
    pub fn matches<F>(&self, field: F) -> bool
    where
        F: Fn(&str) -> Option<Json>,
    {
        matches_object(&self.0, &field)
    }

    /// Evaluate against concept metadata
    pub fn matches_concept(&self, concept: &Concept) -> bool {
        self.matches(|name| concept.field(name))
    }

    /// Evaluate against a data row
    pub fn matches_row(&self, row: &Row) -> bool {
        self.matches(|name| row.get(name).map(Json::from))
    }

    pub fn as_json(&self) -> Json {
        Json::Object(self.0.clone())
    }
}

impl From<Map<String, Json>> for Predicate {
    fn from(map: Map<String, Json>) -> Self {
        Self(map)
    }
}

impl TryFrom<Json> for Predicate {
    type Error = crate::ConfigError;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        match value {
            Json::Object(map) => Ok(Self(map)),
            other => Err(crate::ConfigError::InvalidPredicate(other.to_string())),
        }
    }
}

fn matches_object<F>(predicate: &Map<String, Json>, field: &F) -> bool
where
    F: Fn(&str) -> Option<Json>,
{
    predicate.iter().all(|(key, condition)| match key.as_str() {
        "$and" => sub_predicates(condition).all(|sub| matches_object(sub, field)),
        "$or" => sub_predicates(condition).any(|sub| matches_object(sub, field)),
        name => matches_condition(&field(name).unwrap_or(Json::Null), condition),
    })
}

fn sub_predicates(condition: &Json) -> impl Iterator<Item = &Map<String, Json>> {
    condition
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Json::as_object)
}

fn matches_condition(value: &Json, condition: &Json) -> bool {
    match condition {
        Json::Object(ops) if ops.keys().all(|k| k.starts_with('$')) && !ops.is_empty() => {
            ops.iter().all(|(op, operand)| match op.as_str() {
                "$eq" => value == operand,
                "$ne" => value != operand,
                "$in" => operand.as_array().map(|a| a.contains(value)).unwrap_or(false),
                "$nin" => operand.as_array().map(|a| !a.contains(value)).unwrap_or(true),
                "$gt" => compare(value, operand) == Some(Ordering::Greater),
                "$gte" => matches!(compare(value, operand), Some(Ordering::Greater | Ordering::Equal)),
                "$lt" => compare(value, operand) == Some(Ordering::Less),
                "$lte" => matches!(compare(value, operand), Some(Ordering::Less | Ordering::Equal)),
                unknown => {
                    tracing::warn!(operator = unknown, "Unknown predicate operator, treating as no match");
                    false
                }
            })
        }
        other => value == other,
    }
}

fn compare(a: &Json, b: &Json) -> Option<Ordering> {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Json::String(x), Json::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Recursively merge `other` into `base`. Nested objects merge, anything else is replaced.
fn deep_merge(base: &mut Map<String, Json>, other: Map<String, Json>) {
    for (key, value) in other {
        match (base.get_mut(&key), value) {
            (Some(Json::Object(existing)), Json::Object(incoming)) => deep_merge(existing, incoming),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Configuration of a marker/dimension filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Explicitly selected markers, identified by their key objects
    #[serde(default)]
    pub markers: Vec<Row>,

    /// Per-dimension property conditions: dimension -> property -> condition
    #[serde(default)]
    pub dimensions: IndexMap<ConceptId, Map<String, Json>>,
}

/// Marker and dimension filter that turns into a query `where` clause
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    config: FilterConfig,
}

impl Filter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Whether any marker is selected
    pub fn any(&self) -> bool {
        !self.config.markers.is_empty()
    }

    pub fn has(&self, key: &Row) -> bool {
        self.config.markers.iter().any(|m| m == key)
    }

    pub fn set(&mut self, key: Row) {
        if !self.has(&key) {
            self.config.markers.push(key);
        }
    }

    pub fn delete(&mut self, key: &Row) -> bool {
        let before = self.config.markers.len();
        self.config.markers.retain(|m| m != key);
        before != self.config.markers.len()
    }

    /// Toggle a marker, returns whether it is now selected
    pub fn toggle(&mut self, key: Row) -> bool {
        if self.delete(&key) {
            false
        } else {
            self.set(key);
            true
        }
    }

    pub fn clear(&mut self) {
        self.config.markers.clear();
    }

    /// Build the `where` clause for a query keyed by `space`.
    ///
    /// `is_entity_concept` decides which properties are entity concepts; those
    /// are left out of single-dimension (entity) queries.
    pub fn where_clause<F>(&self, space: &Space, is_entity_concept: F) -> Json
    where
        F: Fn(&str) -> bool,
    {
        let mut dim_filters: Vec<Map<String, Json>> = Vec::new();
        for dim in space {
            let Some(props) = self.config.dimensions.get(dim) else {
                continue;
            };
            for (prop, condition) in props {
                let mut clause = Map::new();
                if prop == dim || space.len() < 2 {
                    if space.len() > 1 || !is_entity_concept(prop) {
                        clause.insert(prop.clone(), condition.clone());
                    }
                } else {
                    clause.insert(format!("{dim}.{prop}"), condition.clone());
                }
                if !clause.is_empty() {
                    dim_filters.push(clause);
                }
            }
        }

        let marker_filters: Vec<Json> = self
            .config
            .markers
            .iter()
            .filter(|key| {
                key.len() == space.len() && space.iter().all(|dim| key.contains_key(dim))
            })
            .map(|key| {
                Json::Object(key.iter().map(|(k, v)| (k.clone(), Json::from(v))).collect())
            })
            .collect();

        if !marker_filters.is_empty() {
            let mut or = marker_filters;
            if !dim_filters.is_empty() {
                let and: Vec<Json> = dim_filters.into_iter().map(Json::Object).collect();
                or.push(json!({ "$and": and }));
            }
            json!({ "$or": or })
        } else {
            let mut merged = Map::new();
            for clause in dim_filters {
                deep_merge(&mut merged, clause);
            }
            Json::Object(merged)
        }
    }
}
