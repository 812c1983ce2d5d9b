//! Auto-configuration solver
//!
//! Decides the space and concept of bindings whose configuration leaves them
//! open. A marker's encodings must share one space, so a marker is solved as
//! a whole: candidate spaces are tried in preference order and the first one
//! for which every encoding finds a concept wins. Concepts already picked by
//! earlier encodings are avoided where possible. The search is greedy and
//! never backtracks into earlier encodings or spaces.
//!
//! The solver works on [`BindingView`] snapshots and never touches bindings
//! directly, so a solution is a pure function of its inputs.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use dv_core::{
    Availability, BindingConfig, BindingDefaults, ConceptConfig, ConceptId, DataSource,
    Predicate, RefTable, Space, SpaceConfig,
};

use crate::strategies::{SolveContext, StrategyRegistry};

/// Position of a binding relative to a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingRole {
    /// Not part of a marker
    Standalone,
    /// The row-identity binding of a marker
    MarkerData,
    /// One encoding of a marker
    Encoding,
}

/// Snapshot of everything the solver reads from a binding
#[derive(Clone)]
pub struct BindingView {
    pub name: String,
    pub role: BindingRole,
    pub config: BindingConfig,
    pub defaults: BindingDefaults,
    pub is_constant: bool,
    pub source: Option<Arc<dyn DataSource>>,
}

impl std::fmt::Debug for BindingView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingView")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("config", &self.config)
            .field("is_constant", &self.is_constant)
            .field("source", &self.source.as_ref().map(|s| s.source_name().to_string()))
            .finish()
    }
}

/// Solved space and concept of one binding. `concept` is `None` for constants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub space: Space,
    pub concept: Option<ConceptId>,
}

/// Solved space of a marker and the solution of each of its encodings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerResolution {
    pub space: Space,
    pub encodings: IndexMap<String, ResolvedConfig>,
}

/// Order spaces by preference: multi-dimensional spaces first, smallest
/// first, then one-dimensional ones. Equal spaces keep their order.
pub fn sort_spaces_by_preference(spaces: &mut [Space]) {
    spaces.sort_by_key(|space| {
        if space.len() > 1 {
            (0, space.len())
        } else {
            (1, usize::MAX - space.len())
        }
    });
}

/// Stateless solver over a reference table and a strategy registry
pub struct Solver<'a> {
    refs: &'a RefTable,
    registry: &'a StrategyRegistry,
}

impl<'a> Solver<'a> {
    pub fn new(refs: &'a RefTable, registry: &'a StrategyRegistry) -> Self {
        Self { refs, registry }
    }

    fn resolve_space(&self, config: &SpaceConfig) -> Option<SpaceConfig> {
        match self.refs.resolve(config) {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                warn!("Space configuration does not resolve: {}", e);
                None
            }
        }
    }

    fn resolve_concept(&self, config: &ConceptConfig) -> Option<ConceptConfig> {
        match self.refs.resolve(config) {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                warn!("Concept configuration does not resolve: {}", e);
                None
            }
        }
    }

    fn space_needs_solving(&self, config: &SpaceConfig) -> bool {
        self.resolve_space(config)
            .map(|resolved| resolved.needs_solving())
            .unwrap_or(false)
    }

    fn concept_needs_solving(&self, config: &ConceptConfig) -> bool {
        self.resolve_concept(config)
            .map(|resolved| resolved.needs_solving())
            .unwrap_or(false)
    }

    /// Whether the binding's space has to be found in the data.
    ///
    /// Encodings only solve their space when their own configuration asks for
    /// it; otherwise they take the space of the marker.
    pub fn needs_space_auto_config(&self, view: &BindingView) -> bool {
        let own = view
            .config
            .space
            .as_ref()
            .map(|space| self.space_needs_solving(space))
            .unwrap_or(false);
        let uses_default = view.role != BindingRole::Encoding
            && view.config.space.is_none()
            && self.space_needs_solving(&view.defaults.space);
        own || uses_default
    }

    /// Whether the binding's concept has to be found in the data. A concept
    /// that references another binding's concept is never solved here.
    pub fn needs_concept_auto_config(&self, view: &BindingView) -> bool {
        if view
            .config
            .concept
            .as_ref()
            .is_some_and(ConceptConfig::is_reference)
        {
            return false;
        }
        let own = view
            .config
            .concept
            .as_ref()
            .map(|concept| self.concept_needs_solving(concept))
            .unwrap_or(false);
        let uses_default = view.role != BindingRole::MarkerData
            && view.config.concept.is_none()
            && self.concept_needs_solving(&view.defaults.concept);
        own || uses_default
    }

    pub fn needs_auto_config(&self, view: &BindingView) -> bool {
        self.needs_space_auto_config(view) || self.needs_concept_auto_config(view)
    }

    /// Effective space configuration: own, then the fallback space, then defaults
    fn space_config(&self, view: &BindingView, fallback: Option<&Space>) -> Option<SpaceConfig> {
        match (&view.config.space, fallback) {
            (Some(space), _) => self.resolve_space(space),
            (None, Some(fallback)) => Some(SpaceConfig::Fixed(fallback.clone())),
            (None, None) => self.resolve_space(&view.defaults.space),
        }
    }

    fn concept_config(&self, view: &BindingView) -> Option<ConceptConfig> {
        let config = view.config.concept.as_ref().unwrap_or(&view.defaults.concept);
        self.resolve_concept(config)
    }

    /// Solve a standalone binding or one encoding of a marker. `fallback` is
    /// the marker space being tried, `avoid` the concepts taken by earlier
    /// encodings.
    pub fn encoding_solution(
        &self,
        view: &BindingView,
        fallback: Option<&Space>,
        avoid: &[ConceptId],
    ) -> Option<ResolvedConfig> {
        if self.needs_space_auto_config(view) {
            self.auto_config_space(view, |space| self.find_concept_for_space(space, view, avoid))
        } else if self.needs_concept_auto_config(view) {
            let space = self.fixed_space(view, fallback)?;
            self.find_concept_for_space(&space, view, avoid)
        } else {
            let space = self.fixed_space(view, fallback)?;
            let concept = if view.is_constant {
                None
            } else {
                self.concept_config(view)
                    .and_then(|concept| concept.as_fixed().cloned())
            };
            Some(ResolvedConfig { space, concept })
        }
    }

    fn fixed_space(&self, view: &BindingView, fallback: Option<&Space>) -> Option<Space> {
        match self.space_config(view, fallback) {
            Some(SpaceConfig::Fixed(space)) => Some(space),
            other => {
                warn!("Binding {} has no concrete space: {:?}", view.name, other);
                None
            }
        }
    }

    /// Solve a whole marker: one space shared by all encodings
    pub fn marker_solution(
        &self,
        marker: &BindingView,
        encodings: &[BindingView],
    ) -> Option<MarkerResolution> {
        if self.needs_space_auto_config(marker) {
            if marker.source.is_none() {
                warn!("Can't autoconfigure the space of marker {} without a source", marker.name);
                return None;
            }
            self.auto_config_space(marker, |space| self.find_marker_config_for_space(encodings, space))
        } else {
            let space = self.fixed_space(marker, None)?;
            self.find_marker_config_for_space(encodings, &space)
        }
    }

    /// Solve every encoding against `space` in declaration order, threading
    /// the concepts chosen so far. Fails as soon as one encoding fails.
    pub fn find_marker_config_for_space(
        &self,
        encodings: &[BindingView],
        space: &Space,
    ) -> Option<MarkerResolution> {
        let mut solved = IndexMap::with_capacity(encodings.len());
        let mut used: Vec<ConceptId> = Vec::new();

        for encoding in encodings {
            let result = self.encoding_solution(encoding, Some(space), &used)?;
            if let Some(concept) = &result.concept {
                used.push(concept.clone());
            }
            solved.insert(encoding.name.clone(), result);
        }

        Some(MarkerResolution {
            space: space.clone(),
            encodings: solved,
        })
    }

    /// Try candidate spaces in preference order until `further` succeeds
    pub fn auto_config_space<T, F>(&self, view: &BindingView, further: F) -> Option<T>
    where
        F: Fn(&Space) -> Option<T>,
    {
        let Some(source) = &view.source else {
            warn!("Can't autoconfigure the space of {} without a source", view.name);
            return None;
        };
        let Some(availability) = source.availability() else {
            warn!("Metadata of source {} is not loaded yet", source.source_name());
            return None;
        };

        for space in self.candidate_spaces(view, source.as_ref(), &availability) {
            if let Some(result) = further(&space) {
                debug!("Autoconfigured {} to space {}", view.name, space);
                return Some(result);
            }
        }

        warn!(
            "Could not autoconfig {} to a space which also satisfies further results",
            view.name
        );
        None
    }

    /// Spaces eligible for auto-configuration, most preferred first. Spaces
    /// with the `concept` pseudo-dimension never qualify; every dimension
    /// must satisfy the space filter.
    pub fn candidate_spaces(
        &self,
        view: &BindingView,
        source: &dyn DataSource,
        availability: &Availability,
    ) -> Vec<Space> {
        let filter = self.space_filter(view);
        let mut spaces: Vec<Space> = availability
            .all_spaces()
            .filter(|space| !space.has_concept_dimension())
            .filter(|space| {
                let Some(filter) = &filter else { return true };
                space.iter().all(|dim| match source.concept(dim) {
                    Some(concept) => filter.matches_concept(&concept),
                    None => filter.is_empty(),
                })
            })
            .cloned()
            .collect();
        sort_spaces_by_preference(&mut spaces);
        spaces
    }

    fn space_filter(&self, view: &BindingView) -> Option<Predicate> {
        let own = view
            .config
            .space
            .as_ref()
            .and_then(|space| self.resolve_space(space))
            .and_then(|space| space.filter().cloned());
        own.or_else(|| view.defaults.space.filter().cloned())
    }

    /// Find the binding's concept within `space`: constants need none, open
    /// concepts go through their solve strategy, fixed ones must be available
    pub fn find_concept_for_space(
        &self,
        space: &Space,
        view: &BindingView,
        avoid: &[ConceptId],
    ) -> Option<ResolvedConfig> {
        if view.is_constant {
            return Some(ResolvedConfig {
                space: space.clone(),
                concept: None,
            });
        }

        let concept = match self.concept_config(view)? {
            ConceptConfig::Auto(auto) => {
                let source = view.source.as_ref()?;
                let availability = source.availability()?;
                let Some(solver) = self.registry.solver(auto.solve_method.as_deref()) else {
                    warn!("Unknown solve strategy {:?} on {}", auto.solve_method, view.name);
                    return None;
                };
                let ctx = SolveContext {
                    view,
                    concept: &auto,
                    source,
                    availability: &availability,
                    registry: self.registry,
                };
                solver.solve(space, &ctx, avoid)
            }
            ConceptConfig::Fixed(concept) => self
                .is_concept_available_for_space(view, space, &concept)
                .then_some(concept),
            ConceptConfig::Ref(reference) => {
                warn!("Concept reference {} did not resolve", reference.path);
                None
            }
        };

        match concept {
            Some(concept) => Some(ResolvedConfig {
                space: space.clone(),
                concept: Some(concept),
            }),
            None => {
                debug!("Could not autoconfig concept of {} for space {}", view.name, space);
                None
            }
        }
    }

    pub fn is_concept_available_for_space(&self, view: &BindingView, space: &Space, concept: &str) -> bool {
        view.source
            .as_ref()
            .and_then(|source| source.availability())
            .map(|availability| availability.is_available(space, concept))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_preference_order() {
        let a = Space::new(["geo", "gender", "time"]);
        let b = Space::new(["geo", "time"]);
        let c = Space::new(["geo"]);
        let mut spaces = vec![a.clone(), c.clone(), b.clone()];
        sort_spaces_by_preference(&mut spaces);
        assert_eq!(spaces, vec![b, a, c]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_lengths() {
        let first = Space::new(["geo", "time"]);
        let second = Space::new(["gender", "time"]);
        let mut spaces = vec![first.clone(), second.clone()];
        sort_spaces_by_preference(&mut spaces);
        assert_eq!(spaces, vec![first, second]);
    }
}
