//! Markers
//!
//! A marker is the thing a chart draws once per row: a bubble, a line, a bar.
//! Its data binding fixes the space every row is keyed by, and each encoding
//! (x, y, size, color, label, ...) is a [`DataBinding`] of its own. The marker
//! solves all of them together so that encodings share one space and avoid
//! picking the same concept, then joins their responses into one data map.

use std::sync::{Arc, Weak};

use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use dv_core::value::key_str;
use dv_core::{BindingConfig, DataSource, Row, Space, Value};
use dv_data::{DataFrame, Tabular};

use crate::binding::{BindingKind, BindingParent, DataBinding, PromiseState};
use crate::context::BindingContext;
use crate::solver::{BindingRole, BindingView, MarkerResolution};

/// Builds a derived view of the marker, e.g. its rows grouped by frame
pub type TransformFn = Arc<dyn Fn(&Marker) -> Tabular + Send + Sync>;

type Fingerprint = Vec<u64>;

pub struct Marker {
    name: String,
    context: Arc<BindingContext>,
    data: Arc<DataBinding>,
    encodings: IndexMap<String, Arc<DataBinding>>,
    solution: Mutex<Option<(Fingerprint, Option<MarkerResolution>)>>,
    transformed: RwLock<IndexMap<String, TransformFn>>,
}

/// Declares a marker's data and encodings
pub struct MarkerBuilder {
    name: String,
    data: BindingConfig,
    encodings: Vec<(String, BindingKind, BindingConfig)>,
}

impl MarkerBuilder {
    /// Add an encoding. Encodings are solved in the order they are added.
    pub fn encoding(mut self, name: impl Into<String>, config: BindingConfig) -> Self {
        self.encodings.push((name.into(), BindingKind::Plain, config));
        self
    }

    /// Add an entity-property encoding, typically a label
    pub fn entity_property(mut self, name: impl Into<String>, config: BindingConfig) -> Self {
        self.encodings
            .push((name.into(), BindingKind::EntityProperty, config));
        self
    }

    pub fn build(self, context: Arc<BindingContext>) -> Arc<Marker> {
        let MarkerBuilder {
            name,
            data,
            encodings,
        } = self;

        Arc::new_cyclic(|marker: &Weak<Marker>| {
            let data = Arc::new(DataBinding::with_parent(
                context.clone(),
                name.clone(),
                BindingKind::Plain,
                data,
                BindingParent::MarkerData(marker.clone()),
            ));
            let encodings = encodings
                .into_iter()
                .map(|(encoding, kind, config)| {
                    let binding = DataBinding::with_parent(
                        context.clone(),
                        encoding.clone(),
                        kind,
                        config,
                        BindingParent::Encoding(marker.clone()),
                    );
                    (encoding, Arc::new(binding))
                })
                .collect();

            Marker {
                name,
                context,
                data,
                encodings,
                solution: Mutex::new(None),
                transformed: RwLock::new(IndexMap::new()),
            }
        })
    }
}

impl Marker {
    pub fn builder(name: impl Into<String>, data: BindingConfig) -> MarkerBuilder {
        MarkerBuilder {
            name: name.into(),
            data,
            encodings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The marker's own binding, which fixes the row space
    pub fn data(&self) -> &Arc<DataBinding> {
        &self.data
    }

    pub fn encoding(&self, name: &str) -> Option<&Arc<DataBinding>> {
        self.encodings.get(name)
    }

    pub fn encodings(&self) -> impl Iterator<Item = (&String, &Arc<DataBinding>)> {
        self.encodings.iter()
    }

    fn members(&self) -> impl Iterator<Item = &Arc<DataBinding>> {
        std::iter::once(&self.data).chain(self.encodings.values())
    }

    fn fingerprint(&self) -> Fingerprint {
        let mut fingerprint = vec![
            self.context.refs.revision(),
            self.context.registry.revision(),
            self.context.sources.revision(),
        ];
        for member in self.members() {
            fingerprint.extend(member.fingerprint());
        }
        fingerprint
    }

    /// The shared space and the per-encoding concepts, `None` while no space
    /// satisfies every encoding
    pub fn solution(&self) -> Option<MarkerResolution> {
        let fingerprint = self.fingerprint();
        if let Some((cached, solution)) = &*self.solution.lock() {
            if *cached == fingerprint {
                return solution.clone();
            }
        }

        let marker = self.data.view();
        let encodings: Vec<BindingView> = self.encodings.values().map(|e| e.view()).collect();
        let solution = self.data.solver().marker_solution(&marker, &encodings);
        match &solution {
            Some(solution) => debug!("Marker {} solved to space {}", self.name, solution.space),
            None => warn!("Marker {} could not be auto-configured", self.name),
        }

        *self.solution.lock() = Some((fingerprint, solution.clone()));
        solution
    }

    /// Sources of every member that needs auto-configuration, by name
    pub(crate) fn sources_before_solving(&self) -> Vec<Arc<dyn DataSource>> {
        let solver = self.data.solver();
        let mut sources: IndexMap<String, Arc<dyn DataSource>> = IndexMap::new();
        for member in self.members() {
            let view = member.view();
            let needed = match member.role() {
                BindingRole::MarkerData => solver.needs_space_auto_config(&view),
                _ => solver.needs_auto_config(&view),
            };
            if !needed {
                continue;
            }
            if let Some(source) = view.source {
                sources
                    .entry(source.source_name().to_string())
                    .or_insert(source);
            }
        }
        sources.into_values().collect()
    }

    /// Load metadata, solve once, then load every member concurrently
    pub async fn load(&self) -> PromiseState {
        for source in self.sources_before_solving() {
            if let Err(e) = source.metadata_ready().await {
                warn!("Metadata of {} failed to load: {:#}", source.source_name(), e);
                break;
            }
        }
        if self.solution().is_none() {
            debug!("Marker {} loads without a solution", self.name);
        }

        let states = join_all(self.members().map(|member| member.load())).await;
        combine_states(states)
    }

    /// Rejected when any member is, else pending when any member is
    pub fn state(&self) -> PromiseState {
        combine_states(self.members().map(|member| member.state()))
    }

    /// Register a derived view of the marker under `name`. Encodings may use
    /// it as their domain data source.
    pub fn register_transformed<F>(&self, name: impl Into<String>, transform: F)
    where
        F: Fn(&Marker) -> Tabular + Send + Sync + 'static,
    {
        self.transformed
            .write()
            .insert(name.into(), Arc::new(transform));
    }

    /// Compute a registered view
    pub fn transformed(&self, name: &str) -> Option<Tabular> {
        let transform = self.transformed.read().get(name).cloned()?;
        Some(transform(self))
    }

    /// One row per marker, keyed by the marker space, with a column per
    /// encoding holding that encoding's value for the row.
    ///
    /// Rows come from encodings that have their own data in the marker
    /// space. The remaining encodings are filled in per row from constants,
    /// from the row key itself, or by looking the row up in their response.
    pub fn data_map(&self) -> DataFrame {
        let Some(space) = self.data.space() else {
            return DataFrame::default();
        };

        let mut joined = DataFrame::new(space.clone());
        let mut filled: Vec<&String> = Vec::new();
        for (name, encoding) in &self.encodings {
            if !encoding.has_own_data()
                || !encoding.space().is_some_and(|s| s.same_dims(&space))
            {
                continue;
            }
            let (Ok(response), Some(concept)) = (encoding.response_map(), encoding.concept()) else {
                continue;
            };
            // lookups only answer keys, they don't contribute rows
            let Tabular::Frame(frame) = response.as_ref() else {
                continue;
            };
            filled.push(name);
            for row in frame.rows() {
                let key = key_str(row, &space);
                let mut merged = joined
                    .get_by_str(&key)
                    .cloned()
                    .unwrap_or_else(|| key_row(row, &space));
                merged.insert(name.clone(), row.get(&concept).cloned().unwrap_or_default());
                joined.set(merged);
            }
        }

        let mut result = DataFrame::new(space.clone());
        for mut row in joined.rows().cloned() {
            for (name, encoding) in &self.encodings {
                if filled.contains(&name) {
                    row.entry(name.clone()).or_insert(Value::Null);
                    continue;
                }
                let value = encoding_value(encoding, &row).unwrap_or_default();
                row.insert(name.clone(), value);
            }
            result.set(row);
        }
        result
    }
}

impl std::fmt::Debug for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marker")
            .field("name", &self.name)
            .field("encodings", &self.encodings.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn key_row(row: &Row, space: &Space) -> Row {
    space
        .iter()
        .map(|dim| (dim.clone(), row.get(dim).cloned().unwrap_or_default()))
        .collect()
}

/// Value of a data-map column for an encoding without rows of its own in
/// the marker space
fn encoding_value(encoding: &DataBinding, row: &Row) -> Option<Value> {
    if let Some(constant) = encoding.constant() {
        return Some(constant);
    }
    let concept = encoding.concept()?;
    if encoding.concept_in_space() {
        return row.get(&concept).cloned();
    }
    if !encoding.has_own_data() {
        return None;
    }

    match encoding.response_map().ok()?.as_ref() {
        Tabular::Frame(frame) => frame.get(row)?.get(&concept).cloned(),
        Tabular::Lookup(lookup) => {
            let values = lookup.get(row)?;
            values.get(&concept)?.values().next().cloned()
        }
        Tabular::Grouped(_) => None,
    }
}

fn combine_states<I>(states: I) -> PromiseState
where
    I: IntoIterator<Item = PromiseState>,
{
    let mut combined = PromiseState::Fulfilled;
    for state in states {
        match state {
            PromiseState::Rejected => return PromiseState::Rejected,
            PromiseState::Pending => combined = PromiseState::Pending,
            PromiseState::Fulfilled => {}
        }
    }
    combined
}
