//! Data bindings, auto-configuration and markers
//!
//! This crate connects visual encodings to data sources. A [`DataBinding`]
//! resolves which space and concept it shows, through the [`Solver`] and
//! the named strategies of a [`StrategyRegistry`] when its configuration
//! leaves them open, then queries its source and exposes the response and
//! the domain. A [`Marker`] solves a group of encodings against one shared
//! space and joins their responses into a single data map.

pub mod binding;
pub mod context;
pub mod entity_property;
pub mod marker;
pub mod solver;
pub mod strategies;

use thiserror::Error;

use dv_core::ConfigError;
use dv_data::DataError;

// Re-exports
pub use binding::{BindingKind, DataBinding, Domain, InvariantViolation, PromiseState};
pub use context::BindingContext;
pub use marker::{Marker, MarkerBuilder, TransformFn};
pub use solver::{
    sort_spaces_by_preference, BindingRole, BindingView, MarkerResolution, ResolvedConfig, Solver,
};
pub use strategies::{
    ConceptSelector, ConceptSolver, DefaultConceptSolver, MostCommonDimensionProperty,
    SelectUnusedConcept, SolveContext, StrategyRegistry, DEFAULT_CONCEPT_SOLVER,
    MOST_COMMON_DIMENSION_PROPERTY, SELECT_UNUSED_CONCEPT,
};

/// Errors raised by bindings
#[derive(Error, Debug)]
pub enum BindingError {
    #[error("Can't get response for binding '{0}' with a constant value")]
    ConstantResponse(String),

    #[error("Binding '{0}' has no resolved space and concept")]
    Unresolved(String),

    #[error("Binding '{0}' has no data source")]
    NoSource(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),
}
