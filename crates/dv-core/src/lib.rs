//! Core vocabulary for data bindings
//!
//! This crate provides the shared abstractions the binding layer is built
//! from: concepts and spaces, cell values, the availability index, the
//! configuration model, the predicate sub-language, the outgoing query
//! description and the data-source collaborator interface.

pub mod availability;
pub mod concept;
pub mod config;
pub mod events;
pub mod filter;
pub mod query;
pub mod value;

use thiserror::Error;

// Re-export commonly used types
pub use availability::Availability;
pub use concept::{is_existence_flag, Concept, ConceptId, ConceptType, Space};
pub use config::{
    AutoConcept, AutoSpace, BindingConfig, BindingDefaults, ConceptConfig, ConfigNode,
    ConfigValue, DomainDataSource, LocaleConfig, RefTable, Reference, SpaceConfig,
};
pub use data::{DataSource, SourceStore};
pub use events::EventBus;
pub use filter::{Filter, FilterConfig, Predicate};
pub use query::{DdfQuery, QueryFrom};
pub use value::{Row, Value};

/// Identifier of a data binding
pub type BindingId = uuid::Uuid;

/// Errors in configuration handling
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Reference '{0}' does not resolve to anything")]
    UnresolvedReference(String),

    #[error("Reference '{0}' resolves to a value of the wrong kind")]
    ReferenceType(String),

    #[error("Reference chain through '{0}' is too deep or cyclic")]
    ReferenceCycle(String),

    #[error("Predicate must be an object, got {0}")]
    InvalidPredicate(String),

    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// The data-source collaborator
pub mod data {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use ahash::AHashMap;
    use parking_lot::RwLock;

    use crate::availability::Availability;
    use crate::concept::Concept;
    use crate::query::DdfQuery;
    use crate::value::Row;

    /// Trait for data sources.
    ///
    /// Sources own their metadata and may mutate it; bindings only read.
    #[async_trait::async_trait]
    pub trait DataSource: Send + Sync {
        /// Get the source name
        fn source_name(&self) -> &str;

        /// Resolves once the availability index is loaded
        async fn metadata_ready(&self) -> anyhow::Result<()>;

        /// Resolves once the concept catalog is loaded
        async fn concepts_ready(&self) -> anyhow::Result<()>;

        /// The availability index, `None` until metadata has loaded
        fn availability(&self) -> Option<Arc<Availability>>;

        /// Concept metadata from the catalog
        fn concept(&self, id: &str) -> Option<Concept>;

        /// Whether a concept is an entity domain or entity set
        fn is_entity_concept(&self, id: &str) -> bool {
            self.concept(id).map(|c| c.is_entity()).unwrap_or(false)
        }

        /// Default locale of the source
        fn locale(&self) -> Option<String> {
            None
        }

        /// Bumped whenever metadata or data change
        fn revision(&self) -> u64;

        /// Execute a query description and return its rows
        async fn query(&self, query: &DdfQuery) -> anyhow::Result<Vec<Row>>;
    }

    /// Registry of named sources shared by all bindings
    #[derive(Default)]
    pub struct SourceStore {
        sources: RwLock<AHashMap<String, Arc<dyn DataSource>>>,
        revision: AtomicU64,
    }

    impl SourceStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a source under its own name, replacing any source
        /// registered under it before
        pub fn add(&self, source: Arc<dyn DataSource>) {
            let name = source.source_name().to_string();
            self.sources.write().insert(name, source);
            self.revision.fetch_add(1, Ordering::SeqCst);
        }

        pub fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> {
            self.sources.read().get(name).cloned()
        }

        pub fn remove(&self, name: &str) -> Option<Arc<dyn DataSource>> {
            let removed = self.sources.write().remove(name);
            if removed.is_some() {
                self.revision.fetch_add(1, Ordering::SeqCst);
            }
            removed
        }

        /// Bumped whenever a source is added, replaced or removed
        pub fn revision(&self) -> u64 {
            self.revision.load(Ordering::SeqCst)
        }

        pub fn len(&self) -> usize {
            self.sources.read().len()
        }

        pub fn is_empty(&self) -> bool {
            self.sources.read().is_empty()
        }
    }

    impl std::fmt::Debug for SourceStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let names: Vec<String> = self.sources.read().keys().cloned().collect();
            f.debug_struct("SourceStore").field("sources", &names).finish()
        }
    }
}
