mod common;

use std::sync::Arc;

use serde_json::json;

use common::{context, gapminder, record_events, FlakySource, GatedSource, SOURCE};
use dv_core::value::row;
use dv_core::{
    BindingConfig, Concept, ConceptConfig, ConceptId, ConceptType, DataSource, DomainDataSource,
    Space, Value,
};
use dv_data::{Catalog, Extent, InMemorySource};
use dv_encoding::{
    BindingContext, BindingError, DataBinding, Domain, InvariantViolation, PromiseState,
    SolveContext,
};

fn config(value: serde_json::Value) -> BindingConfig {
    BindingConfig::from_json(value).unwrap()
}

#[tokio::test]
async fn test_standalone_binding_autoconfigures() {
    let (context, source) = context();
    let binding = DataBinding::new(context, "x", config(json!({ "source": SOURCE })));

    assert_eq!(binding.load().await, PromiseState::Fulfilled);
    // multi-dimensional spaces come first, the first measure wins
    assert_eq!(binding.space(), Some(Space::new(["geo", "time"])));
    assert_eq!(binding.concept().as_deref(), Some("pop"));
    assert_eq!(binding.response().unwrap().len(), 9);
    assert_eq!(
        binding.domain(),
        Some(Domain::Continuous(Extent::new(4.5, 288.0)))
    );
    assert_eq!(source.query_count(), 1);
}

#[tokio::test]
async fn test_constant_binding_never_queries() {
    let (context, source) = context();

    let size = DataBinding::new(context.clone(), "size", BindingConfig::default().with_constant(5));
    assert_eq!(size.load().await, PromiseState::Fulfilled);
    assert_eq!(size.domain(), Some(Domain::Continuous(Extent::new(5, 5))));
    assert!(matches!(size.response(), Err(BindingError::ConstantResponse(_))));

    let color = DataBinding::new(context, "color", BindingConfig::default().with_constant("red"));
    color.load().await;
    assert_eq!(color.domain(), Some(Domain::Discrete(vec![Value::from("red")])));

    assert_eq!(source.query_count(), 0);
}

#[tokio::test]
async fn test_concept_in_space_never_queries() {
    let (context, source) = context();
    let binding = DataBinding::new(
        context,
        "geo",
        config(json!({ "space": ["geo"], "concept": "geo", "source": SOURCE })),
    );

    assert_eq!(binding.load().await, PromiseState::Fulfilled);
    assert!(binding.concept_in_space());
    assert!(!binding.has_own_data());
    assert_eq!(binding.domain_data_source(), DomainDataSource::FilterRequired);
    assert_eq!(
        binding.invariants(),
        vec![InvariantViolation::ConceptInSpaceWithSource]
    );
    assert_eq!(source.query_count(), 0);
}

#[tokio::test]
async fn test_discrete_domain_keeps_first_seen_order() {
    let (context, _source) = context();
    let binding = DataBinding::new(
        context,
        "label",
        config(json!({ "space": ["geo"], "concept": "name", "source": SOURCE })),
    );

    binding.load().await;
    assert_eq!(
        binding.domain(),
        Some(Domain::Discrete(vec![
            Value::from("Sweden"),
            Value::from("Norway"),
            Value::from("United States"),
        ]))
    );
}

#[tokio::test]
async fn test_query_description_and_filter() {
    let (context, _source) = context();
    let binding = DataBinding::new(
        context,
        "y",
        config(json!({
            "space": ["geo", "time"],
            "concept": "gdp",
            "source": SOURCE,
            "filter": { "dimensions": { "geo": { "geo": { "$in": ["swe", "nor"] } } } },
            "locale": { "id": "sv" }
        })),
    );

    let query = binding.ddf_query().unwrap();
    assert_eq!(
        serde_json::to_value(&query).unwrap(),
        json!({
            "select": { "key": ["geo", "time"], "value": ["gdp"] },
            "from": "datapoints",
            "where": { "geo": { "$in": ["swe", "nor"] } },
            "language": "sv"
        })
    );

    binding.load().await;
    assert_eq!(binding.response().unwrap().len(), 6);
}

#[tokio::test]
async fn test_locale_falls_back_to_source() {
    let (context, _source) = context();
    let binding = DataBinding::new(
        context,
        "x",
        config(json!({ "space": ["geo"], "concept": "name", "source": SOURCE })),
    );
    assert_eq!(binding.locale().as_deref(), Some("en"));
    assert_eq!(binding.ddf_query().unwrap().language.as_deref(), Some("en"));
}

#[tokio::test]
async fn test_unchanged_binding_reuses_its_response() {
    let (context, source) = context();
    let binding = DataBinding::new(context, "x", config(json!({ "source": SOURCE })));

    binding.load().await;
    binding.load().await;
    assert_eq!(source.query_count(), 1);

    // new data means a new source revision and a fresh query
    source.publish(gapminder());
    binding.load().await;
    assert_eq!(source.query_count(), 2);
}

#[tokio::test]
async fn test_failed_query_keeps_last_response() {
    let source = Arc::new(FlakySource::new("flaky", gapminder()));
    let context = BindingContext::with_source(source.clone());
    let events = record_events(&context);
    let binding = DataBinding::new(
        context,
        "x",
        config(json!({ "space": ["geo", "time"], "concept": "pop", "source": "flaky" })),
    );

    assert_eq!(binding.load().await, PromiseState::Fulfilled);
    let before = binding.response().unwrap();

    source.set_failing(true);
    binding.update_config(|config| config.concept = Some(ConceptConfig::fixed("gdp")));
    assert_eq!(binding.load().await, PromiseState::Rejected);
    assert!(binding.last_error().is_some_and(|e| e.contains("connection reset")));
    assert_eq!(binding.response().unwrap(), before);

    source.set_failing(false);
    assert_eq!(binding.load().await, PromiseState::Fulfilled);
    assert!(binding.last_error().is_none());
    assert_eq!(binding.concept().as_deref(), Some("gdp"));

    assert_eq!(
        *events.lock(),
        vec![
            "loaded:x:9".to_string(),
            "config:x:1".to_string(),
            "failed:x".to_string(),
            "loaded:x:9".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_replaced_source_is_queried_again() {
    let (context, old) = context();
    let binding = DataBinding::new(context.clone(), "x", config(json!({ "source": SOURCE })));
    binding.load().await;
    assert_eq!(old.query_count(), 1);

    // same name and same revision as the source it replaces
    let catalog = Catalog::builder()
        .concept(Concept::new("geo", ConceptType::EntityDomain))
        .concept(Concept::new("time", ConceptType::Time))
        .concept(Concept::new("pop", ConceptType::Measure))
        .datapoints(
            Space::new(["geo", "time"]),
            vec![row([
                ("geo", Value::from("swe")),
                ("time", Value::from(2000)),
                ("pop", Value::from(1000.0)),
            ])],
        )
        .build();
    let fresh = Arc::new(InMemorySource::new(SOURCE, catalog));
    assert_eq!(fresh.revision(), old.revision());
    context.sources.add(fresh.clone());

    assert_eq!(binding.load().await, PromiseState::Fulfilled);
    assert_eq!(fresh.query_count(), 1);
    assert_eq!(old.query_count(), 1);
    assert_eq!(binding.response().unwrap().len(), 1);
    assert_eq!(
        binding.domain(),
        Some(Domain::Continuous(Extent::new(1000.0, 1000.0)))
    );
}

#[tokio::test]
async fn test_late_completion_of_older_load_is_dropped() {
    let source = Arc::new(GatedSource::new("gated", gapminder()));
    let context = BindingContext::with_source(source.clone());
    let events = record_events(&context);
    let binding = DataBinding::new(
        context,
        "x",
        config(json!({ "space": ["geo", "time"], "concept": "pop", "source": "gated" })),
    );

    let release = source.arm();
    let older = {
        let binding = binding.clone();
        tokio::spawn(async move { binding.load().await })
    };
    source.wait_parked(1).await;
    assert_eq!(binding.state(), PromiseState::Pending);

    binding.update_config(|config| config.concept = Some(ConceptConfig::fixed("gdp")));
    assert_eq!(binding.load().await, PromiseState::Fulfilled);
    let newer = binding.response().unwrap();

    release.send(()).unwrap();
    assert_eq!(older.await.unwrap(), PromiseState::Fulfilled);

    assert!(Arc::ptr_eq(&binding.response().unwrap(), &newer));
    assert_eq!(binding.concept().as_deref(), Some("gdp"));
    assert_eq!(
        binding.domain(),
        Some(Domain::Continuous(Extent::new(28000.0, 46000.0)))
    );
    assert_eq!(
        *events.lock(),
        vec!["config:x:1".to_string(), "loaded:x:9".to_string()]
    );
}

#[tokio::test]
async fn test_binding_stays_pending_while_newer_load_runs() {
    let source = Arc::new(GatedSource::new("gated", gapminder()));
    let context = BindingContext::with_source(source.clone());
    let binding = DataBinding::new(
        context,
        "x",
        config(json!({ "space": ["geo", "time"], "concept": "pop", "source": "gated" })),
    );

    let release_older = source.arm();
    let older = {
        let binding = binding.clone();
        tokio::spawn(async move { binding.load().await })
    };
    source.wait_parked(1).await;

    binding.update_config(|config| config.concept = Some(ConceptConfig::fixed("gdp")));
    let release_newer = source.arm();
    let newer = {
        let binding = binding.clone();
        tokio::spawn(async move { binding.load().await })
    };
    source.wait_parked(2).await;

    // the older load lands first but a newer one is still outstanding
    release_older.send(()).unwrap();
    assert_eq!(older.await.unwrap(), PromiseState::Pending);
    assert_eq!(binding.state(), PromiseState::Pending);

    release_newer.send(()).unwrap();
    assert_eq!(newer.await.unwrap(), PromiseState::Fulfilled);
    assert_eq!(binding.state(), PromiseState::Fulfilled);
    assert_eq!(
        binding.domain(),
        Some(Domain::Continuous(Extent::new(28000.0, 46000.0)))
    );
}

#[tokio::test]
async fn test_binding_waits_for_pending_source() {
    let source = Arc::new(InMemorySource::pending(SOURCE));
    let context = BindingContext::with_source(source.clone());
    let binding = DataBinding::new(context, "x", config(json!({ "source": SOURCE })));

    let load = {
        let binding = binding.clone();
        tokio::spawn(async move { binding.load().await })
    };
    tokio::task::yield_now().await;
    assert_eq!(binding.state(), PromiseState::Pending);
    assert!(binding.space().is_none());

    source.publish(gapminder());
    assert_eq!(load.await.unwrap(), PromiseState::Fulfilled);
    assert_eq!(binding.concept().as_deref(), Some("pop"));
}

#[tokio::test]
async fn test_unsolvable_binding_stays_pending() {
    let (context, source) = context();
    let events = record_events(&context);
    let binding = DataBinding::new(
        context,
        "flag",
        config(json!({
            "source": SOURCE,
            "concept": { "filter": { "concept_type": "boolean" } }
        })),
    );

    assert_eq!(binding.load().await, PromiseState::Pending);
    assert!(binding.solution().is_none());
    assert!(matches!(binding.ddf_query(), Err(BindingError::Unresolved(_))));
    assert_eq!(binding.response().unwrap().len(), 0);
    assert_eq!(*events.lock(), vec!["unresolved:flag".to_string()]);
    assert_eq!(source.query_count(), 0);
}

#[tokio::test]
async fn test_concept_reference_follows_ref_table() {
    let (context, _source) = context();
    context.refs.set("shared.concept", ConceptConfig::fixed("lex"));
    let binding = DataBinding::new(
        context.clone(),
        "y",
        config(json!({
            "space": ["geo", "time"],
            "concept": { "ref": "shared.concept" },
            "source": SOURCE
        })),
    );

    assert_eq!(binding.concept().as_deref(), Some("lex"));
    context.refs.set("shared.concept", ConceptConfig::fixed("gdp"));
    assert_eq!(binding.concept().as_deref(), Some("gdp"));
}

fn always_gdp(_: &Space, _: &SolveContext<'_>, _: &[ConceptId]) -> Option<ConceptId> {
    Some("gdp".to_string())
}

#[tokio::test]
async fn test_registered_solve_strategy() {
    let (context, _source) = context();
    let binding = DataBinding::new(
        context.clone(),
        "y",
        config(json!({ "source": SOURCE, "concept": { "solveMethod": "alwaysGdp" } })),
    );

    // unknown strategies leave the binding unresolved
    binding.load().await;
    assert!(binding.concept().is_none());

    context.registry.register_solve_strategy("alwaysGdp", always_gdp);
    assert_eq!(binding.load().await, PromiseState::Fulfilled);
    assert_eq!(binding.concept().as_deref(), Some("gdp"));
}

#[tokio::test]
async fn test_constant_with_source_is_flagged() {
    let (context, _source) = context();
    let binding = DataBinding::new(
        context,
        "size",
        BindingConfig::default().with_constant(3).with_source(SOURCE),
    );
    assert_eq!(
        binding.invariants(),
        vec![InvariantViolation::ConstantWithConceptOrSource]
    );
}

#[tokio::test]
async fn test_entity_property_binding_builds_lookups() {
    let (context, source) = context();
    let binding = DataBinding::entity_property(
        context,
        "label",
        config(json!({ "space": ["geo", "time"], "source": SOURCE })),
    );

    assert_eq!(binding.load().await, PromiseState::Fulfilled);
    assert_eq!(binding.concept().as_deref(), Some("name"));
    assert_eq!(binding.entity_queries().unwrap().len(), 1);

    let response = binding.response().unwrap();
    let lookup = response.as_lookup().unwrap();
    assert_eq!(lookup.key(), &Space::new(["geo", "time"]));
    assert_eq!(lookup.lookup("name", "geo", "usa"), Some(&Value::from("United States")));
    assert_eq!(source.query_count(), 1);
}
