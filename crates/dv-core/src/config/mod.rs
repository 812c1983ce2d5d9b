//! Binding configuration model
//!
//! Mirrors the JSON shape users write: a concrete list is a fixed space, an
//! object is an auto-configuration placeholder, `{"ref": ...}` is a reference.

mod reference;

pub use reference::{ConfigNode, RefTable, Reference, Resolvable};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::concept::{ConceptId, Space};
use crate::filter::{FilterConfig, Predicate};
use crate::value::Value;

/// Either a concrete value or a reference to one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue<T> {
    Ref(Reference),
    Value(T),
}

impl<T> ConfigValue<T> {
    pub fn is_reference(&self) -> bool {
        matches!(self, ConfigValue::Ref(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ConfigValue::Value(v) => Some(v),
            ConfigValue::Ref(_) => None,
        }
    }
}

/// Auto-configuration placeholder for a space
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSpace {
    /// Every dimension of a candidate space must satisfy this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,
}

/// Space configuration of a binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpaceConfig {
    Ref(Reference),
    Fixed(Space),
    Auto(AutoSpace),
}

impl SpaceConfig {
    pub fn auto() -> Self {
        SpaceConfig::Auto(AutoSpace::default())
    }

    pub fn fixed<I, S>(dims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ConceptId>,
    {
        SpaceConfig::Fixed(Space::new(dims))
    }

    /// Unresolved placeholder that still needs solving
    pub fn needs_solving(&self) -> bool {
        matches!(self, SpaceConfig::Auto(_))
    }

    pub fn as_fixed(&self) -> Option<&Space> {
        match self {
            SpaceConfig::Fixed(space) => Some(space),
            _ => None,
        }
    }

    pub fn filter(&self) -> Option<&Predicate> {
        match self {
            SpaceConfig::Auto(auto) => auto.filter.as_ref(),
            _ => None,
        }
    }
}

/// Auto-configuration placeholder for a concept
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoConcept {
    /// Predicate on concept metadata that candidates must satisfy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,

    /// Named solve strategy, `defaultConceptSolver` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solve_method: Option<String>,

    /// Named select strategy, `selectUnusedConcept` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select_method: Option<String>,

    /// Restricts property-based strategies to these concepts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_properties: Option<Vec<ConceptId>>,
}

/// Concept configuration of a binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConceptConfig {
    Ref(Reference),
    Fixed(ConceptId),
    Auto(AutoConcept),
}

impl ConceptConfig {
    pub fn fixed(concept: impl Into<ConceptId>) -> Self {
        ConceptConfig::Fixed(concept.into())
    }

    pub fn needs_solving(&self) -> bool {
        matches!(self, ConceptConfig::Auto(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, ConceptConfig::Ref(_))
    }

    pub fn as_fixed(&self) -> Option<&ConceptId> {
        match self {
            ConceptConfig::Fixed(concept) => Some(concept),
            _ => None,
        }
    }
}

/// Locale given either as a plain id or as `{"id": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocaleConfig {
    Id(String),
    Object { id: String },
}

impl LocaleConfig {
    pub fn id(&self) -> &str {
        match self {
            LocaleConfig::Id(id) | LocaleConfig::Object { id } => id,
        }
    }
}

/// Where a binding takes the rows its domain is computed from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DomainDataSource {
    /// `filterRequired` for concepts inside the space, `self` otherwise
    #[default]
    Auto,
    /// The binding's own response
    Own,
    /// The domain needs externally filtered data
    FilterRequired,
    /// The marker's joined data map
    Markers,
    /// A named transformed view owned by the marker
    Named(String),
}

impl From<String> for DomainDataSource {
    fn from(name: String) -> Self {
        match name.as_str() {
            "auto" => DomainDataSource::Auto,
            "self" => DomainDataSource::Own,
            "filterRequired" => DomainDataSource::FilterRequired,
            "markers" => DomainDataSource::Markers,
            _ => DomainDataSource::Named(name),
        }
    }
}

impl From<DomainDataSource> for String {
    fn from(source: DomainDataSource) -> Self {
        match source {
            DomainDataSource::Auto => "auto".into(),
            DomainDataSource::Own => "self".into(),
            DomainDataSource::FilterRequired => "filterRequired".into(),
            DomainDataSource::Markers => "markers".into(),
            DomainDataSource::Named(name) => name,
        }
    }
}

/// User configuration of a data binding. Absent fields fall back to [`BindingDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BindingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space: Option<SpaceConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<ConceptConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub constant: Option<ConfigValue<Value>>,

    /// Name of a source registered in the source store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ConfigValue<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<LocaleConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_data_source: Option<DomainDataSource>,
}

impl BindingConfig {
    /// Parse a configuration from its JSON form
    pub fn from_json(value: serde_json::Value) -> Result<Self, crate::ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn with_space(mut self, space: SpaceConfig) -> Self {
        self.space = Some(space);
        self
    }

    pub fn with_concept(mut self, concept: ConceptConfig) -> Self {
        self.concept = Some(concept);
        self
    }

    pub fn with_constant(mut self, constant: impl Into<Value>) -> Self {
        self.constant = Some(ConfigValue::Value(constant.into()));
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(ConfigValue::Value(source.into()));
        self
    }
}

/// Fallback configuration of a binding
#[derive(Debug, Clone, PartialEq)]
pub struct BindingDefaults {
    pub space: SpaceConfig,
    pub concept: ConceptConfig,
    pub constant: Option<Value>,
    pub domain_data_source: DomainDataSource,
}

impl Default for BindingDefaults {
    fn default() -> Self {
        let measures = Predicate::try_from(json!({ "concept_type": "measure" }))
            .unwrap_or_default();
        Self {
            space: SpaceConfig::auto(),
            concept: ConceptConfig::Auto(AutoConcept {
                filter: Some(measures),
                ..AutoConcept::default()
            }),
            constant: None,
            domain_data_source: DomainDataSource::Auto,
        }
    }
}
