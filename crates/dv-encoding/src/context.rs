use std::sync::Arc;

use dv_core::{DataSource, EventBus, RefTable, SourceStore};

use crate::strategies::StrategyRegistry;

/// Shared, long-lived resources every binding reads
#[derive(Debug, Default)]
pub struct BindingContext {
    /// Named data sources
    pub sources: SourceStore,
    /// Concept solve and select strategies
    pub registry: StrategyRegistry,
    /// Targets of symbolic configuration references
    pub refs: RefTable,
    /// Change notifications
    pub events: EventBus,
}

impl BindingContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A context with one source already registered
    pub fn with_source(source: Arc<dyn DataSource>) -> Arc<Self> {
        let context = Self::default();
        context.sources.add(source);
        Arc::new(context)
    }
}
