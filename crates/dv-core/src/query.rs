//! Outgoing query description
//!
//! This is the one structured payload shared with the query collaborator, so
//! its serialized shape is a stable contract.

use serde::{Deserialize, Serialize};

use crate::concept::{ConceptId, Space};

/// Which kind of table a query reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryFrom {
    Entities,
    Datapoints,
}

impl QueryFrom {
    /// Single-dimension spaces address entities, everything else datapoints
    pub fn for_space(space: &Space) -> Self {
        if space.len() == 1 {
            QueryFrom::Entities
        } else {
            QueryFrom::Datapoints
        }
    }
}

/// Selection clause of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub key: Vec<ConceptId>,
    pub value: Vec<ConceptId>,
}

/// A query as sent to a [`DataSource`](crate::DataSource)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdfQuery {
    pub select: Select,

    pub from: QueryFrom,

    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl DdfQuery {
    /// Query one concept over a space
    pub fn new(space: &Space, concept: impl Into<ConceptId>) -> Self {
        Self {
            select: Select {
                key: space.dims().to_vec(),
                value: vec![concept.into()],
            },
            from: QueryFrom::for_space(space),
            where_clause: None,
            language: None,
        }
    }

    /// Attach a `where` clause; empty objects are dropped
    pub fn with_where(mut self, clause: serde_json::Value) -> Self {
        let empty = clause.as_object().map(|o| o.is_empty()).unwrap_or(false);
        self.where_clause = if empty || clause.is_null() { None } else { Some(clause) };
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn key_space(&self) -> Space {
        Space::from(self.select.key.clone())
    }

    /// Stable string identity of the query, used for response caching
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}
