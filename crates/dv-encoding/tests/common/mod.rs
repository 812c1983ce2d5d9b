#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use dv_core::events::events::{ConfigChanged, QueryFailed, ResolutionFailed, ResponseLoaded};
use dv_core::events::handler_from_fn;
use dv_core::value::row;
use dv_core::{Availability, Concept, ConceptType, DataSource, DdfQuery, Row, Space, Value};
use dv_data::{Catalog, InMemorySource};
use dv_encoding::BindingContext;

pub const SOURCE: &str = "gap";

/// Route `tracing` output through the test harness
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn point(geo: &str, time: i32, pop: f64, gdp: f64, lex: f64) -> Row {
    row([
        ("geo", Value::from(geo)),
        ("time", Value::from(time)),
        ("pop", Value::from(pop)),
        ("gdp", Value::from(gdp)),
        ("lex", Value::from(lex)),
    ])
}

/// Three countries over three years with three measures, plus names
pub fn gapminder() -> Catalog {
    Catalog::builder()
        .concept(Concept::new("geo", ConceptType::EntityDomain).with_property("name", "Geography"))
        .concept(Concept::new("time", ConceptType::Time).with_property("name", "Time"))
        .concept(Concept::new("name", ConceptType::String).with_property("name", "Name"))
        .concept(Concept::new("pop", ConceptType::Measure).with_property("name", "Population"))
        .concept(Concept::new("gdp", ConceptType::Measure).with_property("name", "GDP per capita"))
        .concept(Concept::new("lex", ConceptType::Measure).with_property("name", "Life expectancy"))
        .entities(
            "geo",
            vec![
                row([("geo", "swe"), ("name", "Sweden")]),
                row([("geo", "nor"), ("name", "Norway")]),
                row([("geo", "usa"), ("name", "United States")]),
            ],
        )
        .datapoints(
            Space::new(["geo", "time"]),
            vec![
                point("swe", 2000, 8.9, 28000.0, 79.6),
                point("swe", 2001, 8.9, 28500.0, 79.8),
                point("swe", 2002, 9.0, 29000.0, 79.9),
                point("nor", 2000, 4.5, 38000.0, 78.7),
                point("nor", 2001, 4.5, 38500.0, 78.9),
                point("nor", 2002, 4.6, 39000.0, 79.1),
                point("usa", 2000, 282.0, 45000.0, 76.8),
                point("usa", 2001, 285.0, 45500.0, 76.9),
                point("usa", 2002, 288.0, 46000.0, 77.0),
            ],
        )
        .locale("en")
        .build()
}

/// A context with the gapminder catalog registered as `gap`
pub fn context() -> (Arc<BindingContext>, Arc<InMemorySource>) {
    init_logging();
    let source = Arc::new(InMemorySource::new(SOURCE, gapminder()));
    let context = BindingContext::with_source(source.clone());
    (context, source)
}

/// Wraps a source and fails its queries while `failing` is set
pub struct FlakySource {
    inner: InMemorySource,
    failing: AtomicBool,
}

impl FlakySource {
    pub fn new(name: &str, catalog: Catalog) -> Self {
        Self {
            inner: InMemorySource::new(name, catalog),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.inner.query_count()
    }
}

#[async_trait]
impl DataSource for FlakySource {
    fn source_name(&self) -> &str {
        self.inner.source_name()
    }

    async fn metadata_ready(&self) -> anyhow::Result<()> {
        self.inner.metadata_ready().await
    }

    async fn concepts_ready(&self) -> anyhow::Result<()> {
        self.inner.concepts_ready().await
    }

    fn availability(&self) -> Option<Arc<Availability>> {
        self.inner.availability()
    }

    fn concept(&self, id: &str) -> Option<Concept> {
        self.inner.concept(id)
    }

    fn revision(&self) -> u64 {
        self.inner.revision()
    }

    async fn query(&self, query: &DdfQuery) -> anyhow::Result<Vec<Row>> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("connection reset by peer");
        }
        self.inner.query(query).await
    }
}

/// Wraps a source and parks the next query once a gate is armed, until the
/// test sends on the returned release handle
pub struct GatedSource {
    inner: InMemorySource,
    armed: Mutex<Option<oneshot::Receiver<()>>>,
    parked: AtomicUsize,
}

impl GatedSource {
    pub fn new(name: &str, catalog: Catalog) -> Self {
        Self {
            inner: InMemorySource::new(name, catalog),
            armed: Mutex::new(None),
            parked: AtomicUsize::new(0),
        }
    }

    /// Park the next query. It runs once the returned sender fires.
    pub fn arm(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.armed.lock() = Some(gate);
        release
    }

    /// Number of queries that have reached a gate so far
    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    /// Yield until `count` queries have reached a gate
    pub async fn wait_parked(&self, count: usize) {
        while self.parked() < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl DataSource for GatedSource {
    fn source_name(&self) -> &str {
        self.inner.source_name()
    }

    async fn metadata_ready(&self) -> anyhow::Result<()> {
        self.inner.metadata_ready().await
    }

    async fn concepts_ready(&self) -> anyhow::Result<()> {
        self.inner.concepts_ready().await
    }

    fn availability(&self) -> Option<Arc<Availability>> {
        self.inner.availability()
    }

    fn concept(&self, id: &str) -> Option<Concept> {
        self.inner.concept(id)
    }

    fn revision(&self) -> u64 {
        self.inner.revision()
    }

    async fn query(&self, query: &DdfQuery) -> anyhow::Result<Vec<Row>> {
        let gate = self.armed.lock().take();
        if let Some(gate) = gate {
            self.parked.fetch_add(1, Ordering::SeqCst);
            let _ = gate.await;
        }
        self.inner.query(query).await
    }
}

/// Event names seen on the context's bus, in publish order
pub fn record_events(context: &BindingContext) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    context
        .events
        .subscribe::<ConfigChanged>(handler_from_fn(move |event| {
            if let Some(e) = event.as_any().downcast_ref::<ConfigChanged>() {
                sink.lock().push(format!("config:{}:{}", e.name, e.revision));
            }
        }));
    let sink = seen.clone();
    context
        .events
        .subscribe::<ResponseLoaded>(handler_from_fn(move |event| {
            if let Some(e) = event.as_any().downcast_ref::<ResponseLoaded>() {
                sink.lock().push(format!("loaded:{}:{}", e.name, e.row_count));
            }
        }));
    let sink = seen.clone();
    context
        .events
        .subscribe::<ResolutionFailed>(handler_from_fn(move |event| {
            if let Some(e) = event.as_any().downcast_ref::<ResolutionFailed>() {
                sink.lock().push(format!("unresolved:{}", e.name));
            }
        }));
    let sink = seen.clone();
    context
        .events
        .subscribe::<QueryFailed>(handler_from_fn(move |event| {
            if let Some(e) = event.as_any().downcast_ref::<QueryFailed>() {
                sink.lock().push(format!("failed:{}", e.name));
            }
        }));

    seen
}
