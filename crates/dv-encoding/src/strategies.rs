//! Concept solve and select strategies
//!
//! Auto-configuration picks a concept for a space through a named solve
//! strategy. The default one gathers candidate concepts and hands them to a
//! named select strategy. Both registries are open: callers register their
//! own strategies by name and refer to them from binding configuration
//! (`{"concept": {"solveMethod": "myStrategy"}}`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use dv_core::concept::is_existence_flag;
use dv_core::{AutoConcept, Availability, Concept, ConceptId, DataSource, Space};

use crate::solver::BindingView;

pub const DEFAULT_CONCEPT_SOLVER: &str = "defaultConceptSolver";
pub const MOST_COMMON_DIMENSION_PROPERTY: &str = "mostCommonDimensionProperty";
pub const SELECT_UNUSED_CONCEPT: &str = "selectUnusedConcept";

/// Everything a strategy may consult while solving one binding
pub struct SolveContext<'a> {
    pub view: &'a BindingView,
    /// The binding's auto-configuration placeholder
    pub concept: &'a AutoConcept,
    pub source: &'a Arc<dyn DataSource>,
    pub availability: &'a Availability,
    pub registry: &'a StrategyRegistry,
}

/// Picks a concept for a space, avoiding concepts already taken by siblings
/// where it can
pub trait ConceptSolver: Send + Sync {
    fn solve(&self, space: &Space, ctx: &SolveContext<'_>, avoid: &[ConceptId]) -> Option<ConceptId>;
}

/// Picks one concept out of a filtered candidate list
pub trait ConceptSelector: Send + Sync {
    fn select(
        &self,
        candidates: &[Concept],
        avoid: &[ConceptId],
        space: &Space,
        ctx: &SolveContext<'_>,
    ) -> Option<ConceptId>;
}

impl<F> ConceptSolver for F
where
    F: Fn(&Space, &SolveContext<'_>, &[ConceptId]) -> Option<ConceptId> + Send + Sync,
{
    fn solve(&self, space: &Space, ctx: &SolveContext<'_>, avoid: &[ConceptId]) -> Option<ConceptId> {
        self(space, ctx, avoid)
    }
}

impl<F> ConceptSelector for F
where
    F: Fn(&[Concept], &[ConceptId], &Space, &SolveContext<'_>) -> Option<ConceptId> + Send + Sync,
{
    fn select(
        &self,
        candidates: &[Concept],
        avoid: &[ConceptId],
        space: &Space,
        ctx: &SolveContext<'_>,
    ) -> Option<ConceptId> {
        self(candidates, avoid, space, ctx)
    }
}

/// Candidates are the concepts available in the space plus the space's own
/// dimensions, without existence flags, filtered by the binding's concept
/// filter. The select strategy makes the final pick.
pub struct DefaultConceptSolver;

impl ConceptSolver for DefaultConceptSolver {
    fn solve(&self, space: &Space, ctx: &SolveContext<'_>, avoid: &[ConceptId]) -> Option<ConceptId> {
        let available = ctx.availability.concepts_for(space);
        let candidates: Vec<Concept> = available
            .into_iter()
            .flatten()
            .chain(space.iter())
            .filter(|id| !is_existence_flag(id))
            .filter_map(|id| ctx.source.concept(id))
            .filter(|concept| {
                ctx.concept
                    .filter
                    .as_ref()
                    .map(|filter| filter.matches_concept(concept))
                    .unwrap_or(true)
            })
            .collect();

        let selector = ctx.registry.selector(ctx.concept.select_method.as_deref());
        let selected = selector.select(&candidates, avoid, space, ctx);
        debug!(
            "{} candidates for {} in {}, selected {:?}",
            candidates.len(),
            ctx.view.name,
            space,
            selected
        );
        selected
    }
}

/// The property shared by most entity dimensions of the space, e.g. `name`
/// for `[country, gender]`. Ties go to the property seen first.
pub struct MostCommonDimensionProperty;

impl ConceptSolver for MostCommonDimensionProperty {
    fn solve(&self, space: &Space, ctx: &SolveContext<'_>, _avoid: &[ConceptId]) -> Option<ConceptId> {
        let allowed = ctx.concept.allowed_properties.as_deref();
        let mut counts: IndexMap<&ConceptId, usize> = IndexMap::new();

        for dim in space.iter().filter(|dim| ctx.source.is_entity_concept(dim)) {
            let Some(concepts) = ctx.availability.concepts_for(&Space::new([dim.as_str()])) else {
                continue;
            };
            for concept in concepts {
                if is_existence_flag(concept) {
                    continue;
                }
                if allowed.is_some_and(|allowed| !allowed.contains(concept)) {
                    continue;
                }
                *counts.entry(concept).or_insert(0) += 1;
            }
        }

        let mut best: Option<(&ConceptId, usize)> = None;
        for (concept, count) in counts {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((concept, count));
            }
        }
        best.map(|(concept, _)| concept.clone())
    }
}

/// The first candidate not taken yet, or the first candidate when all are
pub struct SelectUnusedConcept;

impl ConceptSelector for SelectUnusedConcept {
    fn select(
        &self,
        candidates: &[Concept],
        avoid: &[ConceptId],
        _space: &Space,
        _ctx: &SolveContext<'_>,
    ) -> Option<ConceptId> {
        select_unused(candidates, avoid)
    }
}

pub(crate) fn select_unused(candidates: &[Concept], avoid: &[ConceptId]) -> Option<ConceptId> {
    candidates
        .iter()
        .find(|concept| !avoid.contains(&concept.concept))
        .or_else(|| candidates.first())
        .map(|concept| concept.concept.clone())
}

/// Named solve and select strategies
pub struct StrategyRegistry {
    solvers: RwLock<AHashMap<String, Arc<dyn ConceptSolver>>>,
    selectors: RwLock<AHashMap<String, Arc<dyn ConceptSelector>>>,
    revision: AtomicU64,
}

impl StrategyRegistry {
    /// An empty registry. Lookups still fall back to the built-in selector.
    pub fn empty() -> Self {
        Self {
            solvers: RwLock::new(AHashMap::new()),
            selectors: RwLock::new(AHashMap::new()),
            revision: AtomicU64::new(0),
        }
    }

    /// A registry holding the built-in strategies
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register_solve_strategy(DEFAULT_CONCEPT_SOLVER, DefaultConceptSolver);
        registry.register_solve_strategy(MOST_COMMON_DIMENSION_PROPERTY, MostCommonDimensionProperty);
        registry.register_select_strategy(SELECT_UNUSED_CONCEPT, SelectUnusedConcept);
        registry
    }

    /// Register or replace a solve strategy
    pub fn register_solve_strategy(&self, name: impl Into<String>, solver: impl ConceptSolver + 'static) {
        let name = name.into();
        debug!("Registering solve strategy {}", name);
        self.solvers.write().insert(name, Arc::new(solver));
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Register or replace a select strategy
    pub fn register_select_strategy(&self, name: impl Into<String>, selector: impl ConceptSelector + 'static) {
        self.selectors.write().insert(name.into(), Arc::new(selector));
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Solve strategy by name, `defaultConceptSolver` when no name is given
    pub fn solver(&self, name: Option<&str>) -> Option<Arc<dyn ConceptSolver>> {
        self.solvers
            .read()
            .get(name.unwrap_or(DEFAULT_CONCEPT_SOLVER))
            .cloned()
    }

    /// Select strategy by name. Unknown or missing names select unused concepts.
    pub fn selector(&self, name: Option<&str>) -> Arc<dyn ConceptSelector> {
        name.and_then(|name| self.selectors.read().get(name).cloned())
            .unwrap_or_else(|| Arc::new(SelectUnusedConcept))
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut solvers: Vec<String> = self.solvers.read().keys().cloned().collect();
        solvers.sort();
        f.debug_struct("StrategyRegistry")
            .field("solvers", &solvers)
            .field("selectors", &self.selectors.read().len())
            .finish()
    }
}
