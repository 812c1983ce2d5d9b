//! Keyed row collections
//!
//! A [`DataFrame`] is an ordered collection of rows indexed by the values of
//! its key space. A [`DataFrameGroup`] partitions frames by an outer key.

mod group;
mod lookup;
mod record_batch;

pub use group::{DataFrameGroup, GroupMember};
pub use lookup::{ConceptLookups, LookupFrame};
pub use record_batch::rows_from_record_batch;

use indexmap::{IndexMap, IndexSet};

use dv_core::value::key_str;
use dv_core::{ConceptId, Row, Space};

use crate::DataError;

/// Rows indexed by their key, O(1) lookup by full key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    key: Space,
    fields: IndexSet<ConceptId>,
    rows: IndexMap<String, Row>,
}

impl DataFrame {
    /// Create an empty frame keyed by `key`
    pub fn new(key: Space) -> Self {
        Self {
            key,
            fields: IndexSet::new(),
            rows: IndexMap::new(),
        }
    }

    /// Build a frame from rows. A later row with the same key replaces an earlier one.
    pub fn from_rows<I>(rows: I, key: Space) -> Self
    where
        I: IntoIterator<Item = Row>,
    {
        let mut frame = Self::new(key);
        for row in rows {
            frame.set(row);
        }
        frame
    }

    /// Build a frame from an Arrow record batch
    pub fn from_record_batch(batch: &::arrow::record_batch::RecordBatch, key: Space) -> Result<Self, DataError> {
        Ok(Self::from_rows(rows_from_record_batch(batch)?, key))
    }

    pub fn key(&self) -> &Space {
        &self.key
    }

    /// Every field seen in any row, in first-seen order
    pub fn fields(&self) -> impl Iterator<Item = &ConceptId> {
        self.fields.iter()
    }

    /// Key string of a row in this frame. Unkeyed frames index rows by position.
    pub fn key_str(&self, row: &Row) -> String {
        if self.key.is_empty() {
            self.rows.len().to_string()
        } else {
            key_str(row, &self.key)
        }
    }

    /// Insert or replace a row, returns its key string
    pub fn set(&mut self, row: Row) -> String {
        let key = self.key_str(&row);
        for field in row.keys() {
            if !self.fields.contains(field) {
                self.fields.insert(field.clone());
            }
        }
        self.rows.insert(key.clone(), row);
        key
    }

    /// Look up a row by a key object such as `{geo: "swe", time: 2000}`
    pub fn get(&self, key: &Row) -> Option<&Row> {
        self.rows.get(&key_str(key, &self.key))
    }

    pub fn get_by_str(&self, key: &str) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn has(&self, key: &Row) -> bool {
        self.get(key).is_some()
    }

    pub fn has_by_str(&self, key: &str) -> bool {
        self.rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    pub fn key_strs(&self) -> impl Iterator<Item = &String> {
        self.rows.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Row)> {
        self.rows.iter()
    }
}

/// Any of the tabular shapes a binding can expose
#[derive(Debug, Clone, PartialEq)]
pub enum Tabular {
    Frame(DataFrame),
    Grouped(DataFrameGroup),
    Lookup(LookupFrame),
}

impl Tabular {
    /// Iterate every row, descending into groups
    pub fn rows(&self) -> Box<dyn Iterator<Item = &Row> + '_> {
        match self {
            Tabular::Frame(frame) => Box::new(frame.rows()),
            Tabular::Grouped(group) => group.rows(),
            Tabular::Lookup(lookup) => Box::new(lookup.rows()),
        }
    }

    pub fn key(&self) -> &Space {
        match self {
            Tabular::Frame(frame) => frame.key(),
            Tabular::Grouped(group) => group.key(),
            Tabular::Lookup(lookup) => lookup.key(),
        }
    }

    pub fn as_frame(&self) -> Option<&DataFrame> {
        match self {
            Tabular::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn as_lookup(&self) -> Option<&LookupFrame> {
        match self {
            Tabular::Lookup(lookup) => Some(lookup),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Tabular::Frame(frame) => frame.len(),
            Tabular::Grouped(group) => group.len(),
            Tabular::Lookup(lookup) => lookup.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<DataFrame> for Tabular {
    fn from(frame: DataFrame) -> Self {
        Tabular::Frame(frame)
    }
}

impl From<DataFrameGroup> for Tabular {
    fn from(group: DataFrameGroup) -> Self {
        Tabular::Grouped(group)
    }
}

impl From<LookupFrame> for Tabular {
    fn from(lookup: LookupFrame) -> Self {
        Tabular::Lookup(lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dv_core::value::{row, Value};

    fn pop_frame() -> DataFrame {
        DataFrame::from_rows(
            vec![
                row([("geo", Value::from("swe")), ("time", Value::from(2000)), ("pop", Value::from(8.9))]),
                row([("geo", Value::from("nor")), ("time", Value::from(2000)), ("pop", Value::from(4.5))]),
                row([("geo", Value::from("swe")), ("time", Value::from(2001)), ("gdp", Value::from(30))]),
            ],
            Space::new(["geo", "time"]),
        )
    }

    #[test]
    fn test_lookup_by_key_object() {
        let frame = pop_frame();
        assert_eq!(frame.len(), 3);

        let key = row([("time", Value::from(2000)), ("geo", Value::from("nor"))]);
        assert_eq!(frame.get(&key).and_then(|r| r.get("pop")), Some(&Value::from(4.5)));
        assert!(frame.has_by_str("swe¬2001"));
        assert!(!frame.has(&row([("geo", Value::from("fin")), ("time", Value::from(2000))])));

        let fields: Vec<_> = frame.fields().cloned().collect();
        assert_eq!(fields, vec!["geo", "time", "pop", "gdp"]);
    }

    #[test]
    fn test_set_replaces_same_key() {
        let mut frame = pop_frame();
        frame.set(row([("geo", Value::from("swe")), ("time", Value::from(2000)), ("pop", Value::from(9.0))]));
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.get_by_str("swe¬2000").and_then(|r| r.get("pop")), Some(&Value::from(9.0)));
        // position of the replaced row is kept
        assert_eq!(frame.key_strs().next().map(String::as_str), Some("swe¬2000"));
    }

    #[test]
    fn test_unkeyed_frame_keeps_all_rows() {
        let frame = DataFrame::from_rows(
            vec![row([("c", "a")]), row([("c", "a")])],
            Space::default(),
        );
        assert_eq!(frame.len(), 2);
    }
}
