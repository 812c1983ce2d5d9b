//! Data bindings
//!
//! A [`DataBinding`] connects one encoding (or a marker's row identity, or a
//! standalone consumer) to a column of a data source. It owns its
//! configuration, asks the [`Solver`] for its space and concept, sequences
//! metadata loading and querying, and derives its domain from the response.
//!
//! Derived values are recomputed on demand. The solution is cached together
//! with the revisions it was computed from (the binding's own, the reference
//! table's, the strategy registry's and the source's), so it is recomputed
//! only after one of those changed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use dv_core::events::events::{ConfigChanged, QueryFailed, ResolutionFailed, ResponseLoaded};
use dv_core::{
    AutoConcept, BindingConfig, BindingDefaults, BindingId, Concept, ConceptConfig, ConfigValue,
    DataSource, DdfQuery, DomainDataSource, Filter, FilterConfig, Space, Value,
};
use dv_data::{range_of, unique, DataCache, DataFrame, Extent, Tabular};

use crate::context::BindingContext;
use crate::entity_property;
use crate::marker::Marker;
use crate::solver::{BindingRole, BindingView, ResolvedConfig, Solver};
use crate::strategies::MOST_COMMON_DIMENSION_PROPERTY;
use crate::BindingError;

/// Responses kept per binding
const RESPONSE_CACHE_SIZE: usize = 8;

/// How a binding fetches its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// One query over the binding's space
    Plain,
    /// One query per entity dimension, merged into lookups
    EntityProperty,
}

#[derive(Debug, Clone)]
pub(crate) enum BindingParent {
    None,
    MarkerData(Weak<Marker>),
    Encoding(Weak<Marker>),
}

/// Readiness of a binding's load chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

/// Value range of a binding
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    /// `[min, max]` of a measure or time concept
    Continuous(Extent),
    /// Distinct values in first-seen order
    Discrete(Vec<Value>),
}

impl Domain {
    pub fn values(&self) -> Vec<Value> {
        match self {
            Domain::Continuous(extent) => extent.to_vec(),
            Domain::Discrete(values) => values.clone(),
        }
    }
}

/// Configuration combinations a binding should not have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A constant together with a concept or a source
    ConstantWithConceptOrSource,
    /// A concept from the binding's own space together with a source
    ConceptInSpaceWithSource,
}

enum Completion {
    Loaded(Arc<Tabular>),
    Failed(String),
    Unresolved,
}

#[derive(Debug)]
struct LoadTracker {
    /// Sequence number of the most recently started load
    started: u64,
    /// Sequence number of the most recently applied completion
    applied: u64,
    outcome: PromiseState,
    latest: Option<Arc<Tabular>>,
    error: Option<String>,
}

impl LoadTracker {
    fn state(&self) -> PromiseState {
        if self.started > self.applied {
            PromiseState::Pending
        } else {
            self.outcome
        }
    }
}

type Fingerprint = Vec<u64>;

pub struct DataBinding {
    id: BindingId,
    name: String,
    kind: BindingKind,
    config: RwLock<BindingConfig>,
    defaults: BindingDefaults,
    parent: BindingParent,
    context: Arc<BindingContext>,
    revision: AtomicU64,
    solution: Mutex<Option<(Fingerprint, Option<ResolvedConfig>)>>,
    load: Mutex<LoadTracker>,
    responses: DataCache<String, Arc<Tabular>>,
}

impl DataBinding {
    /// A standalone binding
    pub fn new(context: Arc<BindingContext>, name: impl Into<String>, config: BindingConfig) -> Arc<Self> {
        Arc::new(Self::with_parent(
            context,
            name.into(),
            BindingKind::Plain,
            config,
            BindingParent::None,
        ))
    }

    /// A standalone entity-property binding
    pub fn entity_property(
        context: Arc<BindingContext>,
        name: impl Into<String>,
        config: BindingConfig,
    ) -> Arc<Self> {
        Arc::new(Self::with_parent(
            context,
            name.into(),
            BindingKind::EntityProperty,
            config,
            BindingParent::None,
        ))
    }

    pub(crate) fn with_parent(
        context: Arc<BindingContext>,
        name: String,
        kind: BindingKind,
        config: BindingConfig,
        parent: BindingParent,
    ) -> Self {
        Self {
            id: BindingId::new_v4(),
            name,
            kind,
            config: RwLock::new(config),
            defaults: defaults_for(kind),
            parent,
            context,
            revision: AtomicU64::new(0),
            solution: Mutex::new(None),
            load: Mutex::new(LoadTracker {
                started: 0,
                applied: 0,
                outcome: PromiseState::Pending,
                latest: None,
                error: None,
            }),
            responses: DataCache::new(RESPONSE_CACHE_SIZE),
        }
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn config(&self) -> BindingConfig {
        self.config.read().clone()
    }

    pub fn defaults(&self) -> &BindingDefaults {
        &self.defaults
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Swap the configuration. Everything derived from it is recomputed on
    /// next access.
    pub fn set_config(&self, config: BindingConfig) {
        *self.config.write() = config;
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Binding {} config changed, revision {}", self.name, revision);
        self.context.events.publish(ConfigChanged {
            binding: self.id,
            name: self.name.clone(),
            revision,
        });
    }

    /// Apply a change to the current configuration
    pub fn update_config<F>(&self, update: F)
    where
        F: FnOnce(&mut BindingConfig),
    {
        let mut config = self.config();
        update(&mut config);
        self.set_config(config);
    }

    pub fn role(&self) -> BindingRole {
        match self.parent {
            BindingParent::None => BindingRole::Standalone,
            BindingParent::MarkerData(_) => BindingRole::MarkerData,
            BindingParent::Encoding(_) => BindingRole::Encoding,
        }
    }

    /// The marker this binding belongs to, if it is still alive
    pub fn marker(&self) -> Option<Arc<Marker>> {
        match &self.parent {
            BindingParent::None => None,
            BindingParent::MarkerData(marker) | BindingParent::Encoding(marker) => marker.upgrade(),
        }
    }

    fn encoding_marker(&self) -> Option<Arc<Marker>> {
        match &self.parent {
            BindingParent::Encoding(marker) => marker.upgrade(),
            _ => None,
        }
    }

    /// Own source, else the marker's source for encodings
    pub fn source(&self) -> Option<Arc<dyn DataSource>> {
        let configured = self.config.read().source.clone();
        if let Some(source) = configured {
            return match self.context.refs.resolve(&source) {
                Ok(ConfigValue::Value(name)) => {
                    let found = self.context.sources.get(&name);
                    if found.is_none() {
                        warn!("Binding {} refers to unknown source {}", self.name, name);
                    }
                    found
                }
                Ok(ConfigValue::Ref(_)) => None,
                Err(e) => {
                    warn!("Source of binding {} does not resolve: {}", self.name, e);
                    None
                }
            };
        }
        self.encoding_marker().and_then(|marker| marker.data().source())
    }

    pub fn constant(&self) -> Option<Value> {
        let configured = self.config.read().constant.clone();
        let constant = match configured {
            Some(constant) => match self.context.refs.resolve(&constant) {
                Ok(ConfigValue::Value(value)) => Some(value),
                Ok(ConfigValue::Ref(_)) => None,
                Err(e) => {
                    warn!("Constant of binding {} does not resolve: {}", self.name, e);
                    None
                }
            },
            None => None,
        };
        constant
            .filter(|value| !value.is_null())
            .or_else(|| self.defaults.constant.clone())
    }

    pub fn is_constant(&self) -> bool {
        self.constant().is_some()
    }

    /// Snapshot of what the solver needs from this binding
    pub fn view(&self) -> BindingView {
        BindingView {
            name: self.name.clone(),
            role: self.role(),
            config: self.config(),
            defaults: self.defaults.clone(),
            is_constant: self.is_constant(),
            source: self.source(),
        }
    }

    pub(crate) fn fingerprint(&self) -> Fingerprint {
        vec![
            self.revision(),
            self.source().map(|source| source.revision() + 1).unwrap_or(0),
        ]
    }

    fn context_fingerprint(&self) -> Fingerprint {
        vec![
            self.context.refs.revision(),
            self.context.registry.revision(),
            self.context.sources.revision(),
        ]
    }

    pub(crate) fn solver(&self) -> Solver<'_> {
        Solver::new(&self.context.refs, &self.context.registry)
    }

    pub(crate) fn context(&self) -> &Arc<BindingContext> {
        &self.context
    }

    /// Resolved space and concept, `None` while unresolved
    pub fn solution(&self) -> Option<ResolvedConfig> {
        match self.role() {
            BindingRole::Encoding => self
                .marker()?
                .solution()?
                .encodings
                .get(&self.name)
                .cloned(),
            BindingRole::MarkerData => self.marker()?.solution().map(|solution| ResolvedConfig {
                space: solution.space,
                concept: None,
            }),
            BindingRole::Standalone => {
                let mut fingerprint = self.context_fingerprint();
                fingerprint.extend(self.fingerprint());

                if let Some((cached, solution)) = &*self.solution.lock() {
                    if *cached == fingerprint {
                        return solution.clone();
                    }
                }

                let view = self.view();
                let solution = self.solver().encoding_solution(&view, None, &[]);
                if solution.is_none() {
                    warn!("Binding {} could not be auto-configured", self.name);
                }
                *self.solution.lock() = Some((fingerprint, solution.clone()));
                solution
            }
        }
    }

    pub fn space(&self) -> Option<Space> {
        self.solution().map(|solution| solution.space)
    }

    pub fn concept(&self) -> Option<String> {
        self.solution().and_then(|solution| solution.concept)
    }

    /// Dimensions this encoding shares with its marker
    pub fn common_space(&self) -> Option<Space> {
        match self.role() {
            BindingRole::Encoding => {
                let marker = self.marker()?;
                Some(self.space()?.intersect(&marker.data().space()?))
            }
            BindingRole::Standalone => self.space(),
            BindingRole::MarkerData => {
                warn!("Common space is only meaningful on encodings, not on marker {}", self.name);
                None
            }
        }
    }

    /// Own filter, else the marker's filter for encodings
    pub fn filter(&self) -> Filter {
        let own = self.config.read().filter.clone();
        let config = own
            .or_else(|| {
                self.encoding_marker()
                    .and_then(|marker| marker.data().config().filter)
            })
            .unwrap_or_else(FilterConfig::default);
        Filter::new(config)
    }

    /// Own locale, else the marker's locale for encodings, else the source's
    pub fn locale(&self) -> Option<String> {
        let own = self.config.read().locale.clone();
        if let Some(locale) = own {
            return Some(locale.id().to_string());
        }
        self.encoding_marker()
            .and_then(|marker| marker.data().locale())
            .or_else(|| self.source().and_then(|source| source.locale()))
    }

    /// Catalog entry of the resolved concept
    pub fn concept_props(&self) -> Option<Concept> {
        let concept = self.concept()?;
        self.source()?.concept(&concept)
    }

    /// Where the domain is computed from, with `auto` decided
    pub fn domain_data_source(&self) -> DomainDataSource {
        let configured = self.config.read().domain_data_source.clone();
        match configured.unwrap_or_else(|| self.defaults.domain_data_source.clone()) {
            DomainDataSource::Auto if self.concept_in_space() => DomainDataSource::FilterRequired,
            DomainDataSource::Auto => DomainDataSource::Own,
            other => other,
        }
    }

    /// The concept is one of the binding's own key dimensions
    pub fn concept_in_space(&self) -> bool {
        match self.solution() {
            Some(ResolvedConfig {
                space,
                concept: Some(concept),
            }) => space.contains(&concept),
            _ => false,
        }
    }

    /// The binding has something to query
    pub fn has_own_data(&self) -> bool {
        self.source().is_some() && self.concept().is_some() && !self.concept_in_space()
    }

    /// The query this binding sends
    pub fn ddf_query(&self) -> Result<DdfQuery, BindingError> {
        let solution = self.solution().ok_or_else(|| BindingError::Unresolved(self.name.clone()))?;
        let concept = solution
            .concept
            .ok_or_else(|| BindingError::Unresolved(self.name.clone()))?;
        let source = self.source();
        let where_clause = self.filter().where_clause(&solution.space, |concept| {
            source
                .as_ref()
                .map(|source| source.is_entity_concept(concept))
                .unwrap_or(false)
        });

        Ok(DdfQuery::new(&solution.space, concept)
            .with_where(where_clause)
            .with_language(self.locale()))
    }

    /// Per-dimension queries of an entity-property binding
    pub fn entity_queries(&self) -> Result<Vec<DdfQuery>, BindingError> {
        let solution = self.solution().ok_or_else(|| BindingError::Unresolved(self.name.clone()))?;
        let concept = solution
            .concept
            .ok_or_else(|| BindingError::Unresolved(self.name.clone()))?;
        let source = self.source().ok_or_else(|| BindingError::NoSource(self.name.clone()))?;
        Ok(entity_property::queries(
            source.as_ref(),
            &solution.space,
            &concept,
            &self.filter(),
            self.locale(),
        ))
    }

    /// Configuration combinations that should not occur, each logged as a warning
    pub fn invariants(&self) -> Vec<InvariantViolation> {
        let config = self.config();
        let mut fails = Vec::new();
        if self.is_constant() && (config.concept.is_some() || config.source.is_some()) {
            fails.push(InvariantViolation::ConstantWithConceptOrSource);
        }
        if self.concept_in_space() && config.source.is_some() {
            fails.push(InvariantViolation::ConceptInSpaceWithSource);
        }
        if !fails.is_empty() {
            warn!("One or more invariants not satisfied on {}: {:?}", self.name, fails);
        }
        fails
    }

    /// Sources whose metadata must be loaded before solving
    pub(crate) fn sources_before_solving(&self) -> Vec<Arc<dyn DataSource>> {
        if let Some(marker) = self.marker() {
            return marker.sources_before_solving();
        }
        if self.solver().needs_auto_config(&self.view()) {
            self.source().into_iter().collect()
        } else {
            Vec::new()
        }
    }

    /// Run the load chain: source metadata, concept catalog, query.
    ///
    /// Loads may overlap. Each one is numbered and its completion is applied
    /// only when no later-started load has completed before it; a failed
    /// query keeps the previous response visible.
    pub async fn load(&self) -> PromiseState {
        let seq = {
            let mut tracker = self.load.lock();
            tracker.started += 1;
            tracker.started
        };

        if self.is_constant() {
            let response = self.empty_response();
            return self.complete(seq, Completion::Loaded(response));
        }

        for source in self.sources_before_solving() {
            if let Err(e) = source.metadata_ready().await {
                return self.complete(seq, Completion::Failed(format!("{e:#}")));
            }
        }
        if let Some(source) = self.source() {
            if let Err(e) = source.concepts_ready().await {
                return self.complete(seq, Completion::Failed(format!("{e:#}")));
            }
        }

        if self.solution().is_none() {
            return self.complete(seq, Completion::Unresolved);
        }

        let completion = if self.has_own_data() {
            match self.fetch().await {
                Ok(response) => Completion::Loaded(response),
                Err(e) => Completion::Failed(format!("{e:#}")),
            }
        } else {
            Completion::Loaded(self.empty_response())
        };
        self.complete(seq, completion)
    }

    async fn fetch(&self) -> anyhow::Result<Arc<Tabular>> {
        let source = self
            .source()
            .ok_or_else(|| BindingError::NoSource(self.name.clone()))?;

        let (key, queries) = match self.kind {
            BindingKind::Plain => {
                let query = self.ddf_query()?;
                (query.cache_key(), vec![query])
            }
            BindingKind::EntityProperty => {
                let queries = self.entity_queries()?;
                let keys: Vec<String> = queries.iter().map(DdfQuery::cache_key).collect();
                (keys.join("|"), queries)
            }
        };
        let key = format!(
            "{}@{}.{}",
            key,
            self.context.sources.revision(),
            source.revision()
        );
        if let Some(response) = self.responses.get(&key) {
            debug!("Binding {} reusing cached response", self.name);
            return Ok(response);
        }

        let response = match self.kind {
            BindingKind::Plain => {
                let query = &queries[0];
                let rows = source.query(query).await?;
                Tabular::Frame(DataFrame::from_rows(rows, query.key_space()))
            }
            BindingKind::EntityProperty => {
                let concept = self
                    .concept()
                    .ok_or_else(|| BindingError::Unresolved(self.name.clone()))?;
                let common_space = self.common_space().unwrap_or_default();
                entity_property::fetch(&source, &queries, &concept, common_space).await?
            }
        };

        let response = Arc::new(response);
        self.responses.put(key, response.clone());
        Ok(response)
    }

    fn empty_response(&self) -> Arc<Tabular> {
        Arc::new(Tabular::Frame(DataFrame::new(self.space().unwrap_or_default())))
    }

    fn complete(&self, seq: u64, completion: Completion) -> PromiseState {
        let state;
        let mut loaded = None;
        let mut failed = None;
        let mut unresolved = false;
        {
            let mut tracker = self.load.lock();
            if seq <= tracker.applied {
                debug!("Binding {} dropping superseded load {}", self.name, seq);
                return tracker.state();
            }
            tracker.applied = seq;
            match completion {
                Completion::Loaded(response) => {
                    loaded = Some(response.len());
                    tracker.outcome = PromiseState::Fulfilled;
                    tracker.latest = Some(response);
                    tracker.error = None;
                }
                Completion::Failed(error) => {
                    tracker.outcome = PromiseState::Rejected;
                    failed = Some(error.clone());
                    tracker.error = Some(error);
                }
                Completion::Unresolved => {
                    tracker.outcome = PromiseState::Pending;
                    unresolved = true;
                }
            }
            state = tracker.state();
        }

        let events = &self.context.events;
        if let Some(row_count) = loaded {
            debug!("Binding {} loaded {} rows", self.name, row_count);
            events.publish(ResponseLoaded {
                binding: self.id,
                name: self.name.clone(),
                row_count,
            });
        }
        if let Some(error) = failed {
            warn!("Binding {} failed to load: {}", self.name, error);
            events.publish(QueryFailed {
                binding: self.id,
                name: self.name.clone(),
                error,
            });
        }
        if unresolved {
            info!("Binding {} stays pending, configuration is unresolved", self.name);
            events.publish(ResolutionFailed {
                binding: self.id,
                name: self.name.clone(),
            });
        }
        state
    }

    pub fn state(&self) -> PromiseState {
        self.load.lock().state()
    }

    /// Error of the last applied load, if it failed
    pub fn last_error(&self) -> Option<String> {
        self.load.lock().error.clone()
    }

    /// The latest fulfilled response. Never fails for pending or failed loads.
    pub fn response(&self) -> Result<Arc<Tabular>, BindingError> {
        if self.is_constant() {
            return Err(BindingError::ConstantResponse(self.name.clone()));
        }
        let latest = self.load.lock().latest.clone();
        Ok(latest.unwrap_or_else(|| self.empty_response()))
    }

    /// The response keyed by the binding's space, re-keyed by the common
    /// space when it was not
    pub fn response_map(&self) -> Result<Arc<Tabular>, BindingError> {
        let response = self.response()?;
        let Tabular::Frame(frame) = response.as_ref() else {
            return Ok(response);
        };
        if Some(frame.key()) == self.space().as_ref() {
            return Ok(response);
        }
        let key = self.common_space().unwrap_or_default();
        Ok(Arc::new(Tabular::Frame(DataFrame::from_rows(
            frame.rows().cloned(),
            key,
        ))))
    }

    /// Data the domain is computed from, and the column to read
    fn domain_data(&self) -> Option<(Arc<Tabular>, String)> {
        let concept = self.concept()?;
        let own = || self.response_map().ok().map(|data| (data, concept.clone()));
        match self.domain_data_source() {
            DomainDataSource::Markers => match self.encoding_marker() {
                Some(marker) => Some((Arc::new(Tabular::Frame(marker.data_map())), self.name.clone())),
                None => own(),
            },
            DomainDataSource::Named(view) => match self
                .encoding_marker()
                .and_then(|marker| marker.transformed(&view))
            {
                Some(data) => Some((Arc::new(data), concept.clone())),
                None => own(),
            },
            _ => own(),
        }
    }

    /// Value range: `[v, v]` or `[v]` for constants, else computed from the
    /// domain data by concept type
    pub fn domain(&self) -> Option<Domain> {
        if let Some(constant) = self.constant() {
            return Some(if constant.is_numeric() {
                Domain::Continuous(Extent::new(constant.clone(), constant))
            } else {
                Domain::Discrete(vec![constant])
            });
        }

        let props = self.concept_props()?;
        let (data, column) = self.domain_data()?;
        Some(if props.concept_type.is_continuous() {
            Domain::Continuous(range_of(&data, &column))
        } else {
            Domain::Discrete(unique(data.rows(), &column))
        })
    }
}

impl std::fmt::Debug for DataBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataBinding")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("role", &self.role())
            .field("revision", &self.revision())
            .field("state", &self.state())
            .finish()
    }
}

fn defaults_for(kind: BindingKind) -> BindingDefaults {
    let defaults = BindingDefaults::default();
    match kind {
        BindingKind::Plain => defaults,
        BindingKind::EntityProperty => BindingDefaults {
            concept: ConceptConfig::Auto(AutoConcept {
                solve_method: Some(MOST_COMMON_DIMENSION_PROPERTY.to_string()),
                allowed_properties: Some(vec!["name".to_string(), "title".to_string()]),
                ..AutoConcept::default()
            }),
            ..defaults
        },
    }
}
