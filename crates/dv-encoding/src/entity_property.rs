//! Entity-property bindings
//!
//! An entity-property binding shows a property of the entities in its space,
//! e.g. the `name` of every country. It sends one entity query per entity
//! dimension that carries the property, then merges the answers into a
//! [`LookupFrame`] addressed by the binding's common space.

use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use tracing::debug;

use dv_core::{DataSource, DdfQuery, Filter, Space};
use dv_data::{ConceptLookups, LookupFrame, Tabular};

/// One query per entity dimension of `space` that has `concept`
pub(crate) fn queries(
    source: &dyn DataSource,
    space: &Space,
    concept: &str,
    filter: &Filter,
    locale: Option<String>,
) -> Vec<DdfQuery> {
    let Some(availability) = source.availability() else {
        return Vec::new();
    };

    space
        .iter()
        .filter(|dim| source.is_entity_concept(dim))
        .filter_map(|dim| {
            let dim_space = Space::new([dim.as_str()]);
            if !availability.is_available(&dim_space, concept) {
                return None;
            }
            let where_clause = filter.where_clause(&dim_space, |c| source.is_entity_concept(c));
            Some(
                DdfQuery::new(&dim_space, concept)
                    .with_where(where_clause)
                    .with_language(locale.clone()),
            )
        })
        .collect()
}

/// Run the queries concurrently and merge them into `concept -> dim -> key -> value`
pub(crate) async fn fetch(
    source: &Arc<dyn DataSource>,
    queries: &[DdfQuery],
    concept: &str,
    common_space: Space,
) -> anyhow::Result<Tabular> {
    let responses = join_all(queries.iter().map(|query| source.query(query))).await;

    let mut dims = IndexMap::new();
    for (query, response) in queries.iter().zip(responses) {
        let rows = response?;
        let Some(dim) = query.select.key.first() else {
            continue;
        };
        let lookup: IndexMap<String, _> = rows
            .into_iter()
            .filter_map(|row| {
                let key = row.get(dim)?.to_string();
                Some((key, row.get(concept).cloned().unwrap_or_default()))
            })
            .collect();
        debug!("Entity lookup {}.{} holds {} entries", dim, concept, lookup.len());
        dims.insert(dim.clone(), lookup);
    }

    let mut lookups = ConceptLookups::new();
    lookups.insert(concept.to_string(), dims);
    Ok(Tabular::Lookup(LookupFrame::from_lookups(lookups, common_space)))
}
