//! Reference data sources
//!
//! A [`Catalog`] is a fully loaded set of concepts and tables that can answer
//! [`DdfQuery`]s. [`InMemorySource`] exposes a catalog through the
//! [`DataSource`](dv_core::DataSource) trait; [`csv_source`] fills one from a
//! DDF CSV directory.

pub mod csv_source;
pub mod memory_source;

pub use csv_source::load_ddf_dir;
pub use memory_source::{InMemorySource, LoadState};

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::debug;

use dv_core::concept::CONCEPT_DIMENSION;
use dv_core::value::key_str;
use dv_core::{Availability, Concept, ConceptId, DdfQuery, Predicate, Row, Space, Value};

use crate::frame::{rows_from_record_batch, DataFrame};
use crate::DataError;

/// Concepts, tables and the availability derived from them
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    concepts: IndexMap<ConceptId, Concept>,
    availability: Arc<Availability>,
    /// Tables keyed by the order-independent key string of their space
    tables: IndexMap<String, DataFrame>,
    locale: Option<String>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    pub fn concept(&self, id: &str) -> Option<&Concept> {
        self.concepts.get(id)
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    pub fn availability(&self) -> Arc<Availability> {
        self.availability.clone()
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// The table stored for a space, regardless of dimension order
    pub fn table(&self, space: &Space) -> Option<&DataFrame> {
        self.tables.get(&space.key_str())
    }

    /// Run a query against the tables.
    ///
    /// The `where` clause may address entity properties of a key dimension
    /// with dotted names (`geo.world_4region`). Rows whose selected values are
    /// all null are skipped.
    pub fn execute(&self, query: &DdfQuery) -> Result<Vec<Row>, DataError> {
        let space = query.key_space();
        let table = self
            .table(&space)
            .ok_or_else(|| DataError::Other(format!("no table for space {space}")))?;

        let predicate = match &query.where_clause {
            Some(clause) => Predicate::try_from(clause.clone())
                .map_err(|e| DataError::Other(e.to_string()))?,
            None => Predicate::any(),
        };

        let mut rows = Vec::new();
        for row in table.rows() {
            if !predicate.is_empty() && !predicate.matches(|name| self.field(row, name)) {
                continue;
            }

            let mut projected = Row::new();
            for dim in &space {
                projected.insert(dim.clone(), row.get(dim).cloned().unwrap_or_default());
            }
            let mut any_value = query.select.value.is_empty();
            for concept in &query.select.value {
                let value = row.get(concept).cloned().unwrap_or_default();
                any_value |= !value.is_null();
                projected.insert(concept.clone(), value);
            }
            if any_value {
                rows.push(projected);
            }
        }

        debug!("Query on {} matched {} rows", space, rows.len());
        Ok(rows)
    }

    /// Field of a row for predicate evaluation, following `dim.prop` into the
    /// entity table of `dim`
    fn field(&self, row: &Row, name: &str) -> Option<Json> {
        if let Some(value) = row.get(name) {
            return Some(Json::from(value));
        }
        let (dim, prop) = name.split_once('.')?;
        let key = row.get(dim)?;
        let entity_space = Space::new([dim]);
        let mut key_row = Row::new();
        key_row.insert(dim.to_string(), key.clone());
        self.table(&entity_space)?
            .get(&key_row)?
            .get(prop)
            .map(Json::from)
    }
}

/// Assembles a [`Catalog`]
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    concepts: IndexMap<ConceptId, Concept>,
    tables: IndexMap<String, DataFrame>,
    locale: Option<String>,
}

impl CatalogBuilder {
    pub fn concept(mut self, concept: Concept) -> Self {
        self.concepts.insert(concept.concept.clone(), concept);
        self
    }

    /// Add entity rows keyed by `dim`
    pub fn entities(self, dim: &str, rows: impl IntoIterator<Item = Row>) -> Self {
        self.datapoints(Space::new([dim]), rows)
    }

    /// Add rows keyed by `space`. Rows for an existing space are merged by key.
    pub fn datapoints(mut self, space: Space, rows: impl IntoIterator<Item = Row>) -> Self {
        self.add_rows(space, rows);
        self
    }

    /// Add the rows of an Arrow record batch keyed by `space`
    pub fn record_batch(mut self, space: Space, batch: &RecordBatch) -> Result<Self, DataError> {
        let rows = rows_from_record_batch(batch)?;
        self.add_rows(space, rows);
        Ok(self)
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    fn add_rows(&mut self, space: Space, rows: impl IntoIterator<Item = Row>) {
        let frame = self
            .tables
            .entry(space.key_str())
            .or_insert_with(|| DataFrame::new(space.clone()));
        for row in rows {
            let key = key_str(&row, frame.key());
            match frame.get_by_str(&key) {
                Some(existing) => {
                    let mut merged = existing.clone();
                    merged.extend(row);
                    frame.set(merged);
                }
                None => {
                    frame.set(row);
                }
            }
        }
    }

    /// Finish the catalog. The concept catalog becomes a table keyed by
    /// `concept`, and a concept is available in a space when its table holds
    /// at least one non-null value for it.
    pub fn build(mut self) -> Catalog {
        let concept_rows: Vec<Row> = self.concepts.values().map(concept_row).collect();
        if !concept_rows.is_empty() {
            self.add_rows(Space::new([CONCEPT_DIMENSION]), concept_rows);
        }

        let mut availability = Availability::new();
        for table in self.tables.values() {
            availability.add_space(table.key().clone());
            for field in table.fields() {
                if table.key().contains(field) {
                    continue;
                }
                if table.rows().any(|row| row.get(field).is_some_and(|v| !v.is_null())) {
                    availability.insert(table.key().clone(), field.clone());
                }
            }
        }

        debug!(
            "Built catalog with {} concepts over {} spaces",
            self.concepts.len(),
            availability.space_count()
        );

        Catalog {
            concepts: self.concepts,
            availability: Arc::new(availability),
            tables: self.tables,
            locale: self.locale,
        }
    }
}

fn concept_row(concept: &Concept) -> Row {
    let mut row = Row::new();
    row.insert(CONCEPT_DIMENSION.to_string(), Value::from(concept.concept.as_str()));
    row.insert("concept_type".to_string(), Value::from(concept.concept_type.as_str()));
    if let Some(domain) = &concept.domain {
        row.insert("domain".to_string(), Value::from(domain.as_str()));
    }
    for (name, value) in &concept.properties {
        row.insert(name.clone(), Value::from(value));
    }
    row
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dv_core::value::row;
    use dv_core::ConceptType;
    use serde_json::json;

    /// Small gapminder-like catalog shared by the source tests
    pub(crate) fn sample_catalog() -> Catalog {
        Catalog::builder()
            .concept(Concept::new("geo", ConceptType::EntityDomain))
            .concept(Concept::new("time", ConceptType::Time))
            .concept(Concept::new("name", ConceptType::String))
            .concept(Concept::new("region", ConceptType::String))
            .concept(Concept::new("pop", ConceptType::Measure))
            .concept(Concept::new("gdp", ConceptType::Measure))
            .entities(
                "geo",
                vec![
                    row([("geo", "swe"), ("name", "Sweden"), ("region", "europe")]),
                    row([("geo", "nor"), ("name", "Norway"), ("region", "europe")]),
                    row([("geo", "usa"), ("name", "USA"), ("region", "americas")]),
                ],
            )
            .datapoints(
                Space::new(["geo", "time"]),
                vec![
                    row([("geo", Value::from("swe")), ("time", Value::from(2000)), ("pop", Value::from(8.9))]),
                    row([("geo", Value::from("nor")), ("time", Value::from(2000)), ("pop", Value::from(4.5))]),
                    row([("geo", Value::from("usa")), ("time", Value::from(2000)), ("pop", Value::from(282))]),
                    row([("geo", Value::from("usa")), ("time", Value::from(2001)), ("gdp", Value::from(45))]),
                ],
            )
            .locale("en")
            .build()
    }

    #[test]
    fn test_availability_is_derived_from_tables() {
        let catalog = sample_catalog();
        let availability = catalog.availability();

        let geo_time = Space::new(["time", "geo"]);
        assert!(availability.is_available(&geo_time, "pop"));
        assert!(availability.is_available(&geo_time, "gdp"));
        assert!(availability.is_available(&Space::new(["geo"]), "name"));
        assert!(!availability.is_available(&Space::new(["geo"]), "pop"));
        assert!(availability
            .all_spaces()
            .any(|space| space.has_concept_dimension()));
    }

    #[test]
    fn test_execute_projects_and_skips_empty_rows() {
        let catalog = sample_catalog();
        let rows = catalog
            .execute(&DdfQuery::new(&Space::new(["geo", "time"]), "gdp"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].keys().cloned().collect::<Vec<_>>(), vec!["geo", "time", "gdp"]);
    }

    #[test]
    fn test_execute_with_entity_property_filter() {
        let catalog = sample_catalog();
        let query = DdfQuery::new(&Space::new(["geo", "time"]), "pop")
            .with_where(json!({ "geo.region": "europe" }));
        let rows = catalog.execute(&query).unwrap();
        assert_eq!(rows.len(), 2);

        let query = DdfQuery::new(&Space::new(["geo"]), "name")
            .with_where(json!({ "geo": { "$in": ["usa"] } }));
        let rows = catalog.execute(&query).unwrap();
        assert_eq!(rows[0]["name"], Value::from("USA"));
    }

    #[test]
    fn test_unknown_space_is_an_error() {
        let catalog = sample_catalog();
        assert!(catalog
            .execute(&DdfQuery::new(&Space::new(["geo", "gender"]), "pop"))
            .is_err());
    }
}
