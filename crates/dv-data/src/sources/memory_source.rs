use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use dv_core::{Availability, Concept, DataSource, DdfQuery, Row};

use super::csv_source::load_ddf_dir;
use super::Catalog;
use crate::DataError;

/// Loading state of a source's metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Ready,
    Failed(String),
}

/// A data source answering queries from an in-memory [`Catalog`].
///
/// The source may start out pending and have its catalog published later,
/// which lets callers observe bindings waiting on metadata.
pub struct InMemorySource {
    name: String,
    catalog: RwLock<Option<Arc<Catalog>>>,
    state: watch::Sender<LoadState>,
    revision: AtomicU64,
    query_count: AtomicUsize,
}

impl InMemorySource {
    /// A source whose metadata has not arrived yet
    pub fn pending(name: impl Into<String>) -> Self {
        let (state, _) = watch::channel(LoadState::Pending);
        Self {
            name: name.into(),
            catalog: RwLock::new(None),
            state,
            revision: AtomicU64::new(0),
            query_count: AtomicUsize::new(0),
        }
    }

    /// A source that is ready right away
    pub fn new(name: impl Into<String>, catalog: Catalog) -> Self {
        let source = Self::pending(name);
        source.publish(catalog);
        source
    }

    /// Load a DDF CSV directory on a blocking task
    pub async fn from_ddf_dir(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, DataError> {
        let name = name.into();
        let path = path.as_ref().to_path_buf();
        let catalog = tokio::task::spawn_blocking(move || load_ddf_dir(&path)).await??;
        info!("Loaded DDF source '{}'", name);
        Ok(Self::new(name, catalog))
    }

    /// Install or replace the catalog, waking everything waiting on metadata
    pub fn publish(&self, catalog: Catalog) {
        *self.catalog.write() = Some(Arc::new(catalog));
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(LoadState::Ready);
        debug!("Source '{}' published revision {}", self.name, revision);
    }

    /// Mark metadata loading as failed
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Source '{}' failed to load: {}", self.name, reason);
        self.revision.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(LoadState::Failed(reason));
    }

    pub fn load_state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Number of queries executed so far
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    pub fn catalog(&self) -> Option<Arc<Catalog>> {
        self.catalog.read().clone()
    }

    async fn ready(&self) -> anyhow::Result<Arc<Catalog>> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| *state != LoadState::Pending)
            .await?
            .clone();
        match state {
            LoadState::Failed(reason) => {
                Err(DataError::SourceLoad(self.name.clone(), reason).into())
            }
            _ => self
                .catalog()
                .ok_or_else(|| anyhow::anyhow!("source '{}' has no catalog", self.name)),
        }
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn metadata_ready(&self) -> anyhow::Result<()> {
        self.ready().await.map(|_| ())
    }

    async fn concepts_ready(&self) -> anyhow::Result<()> {
        self.ready().await.map(|_| ())
    }

    fn availability(&self) -> Option<Arc<Availability>> {
        self.catalog.read().as_ref().map(|c| c.availability())
    }

    fn concept(&self, id: &str) -> Option<Concept> {
        self.catalog.read().as_ref()?.concept(id).cloned()
    }

    fn locale(&self) -> Option<String> {
        self.catalog.read().as_ref()?.locale().map(str::to_string)
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    async fn query(&self, query: &DdfQuery) -> anyhow::Result<Vec<Row>> {
        let catalog = self.ready().await?;
        self.query_count.fetch_add(1, Ordering::SeqCst);
        debug!("Source '{}' executing {}", self.name, query.cache_key());
        Ok(catalog.execute(query)?)
    }
}

impl std::fmt::Debug for InMemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySource")
            .field("name", &self.name)
            .field("state", &self.load_state())
            .field("revision", &self.revision())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::tests::sample_catalog;
    use dv_core::Space;

    #[tokio::test]
    async fn test_pending_source_waits_for_publish() {
        let source = Arc::new(InMemorySource::pending("gap"));
        assert!(source.availability().is_none());

        let waiter = {
            let source = source.clone();
            tokio::spawn(async move { source.metadata_ready().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        source.publish(sample_catalog());
        waiter.await.unwrap().unwrap();
        assert!(source.availability().is_some());
        assert_eq!(source.revision(), 1);
        assert_eq!(source.locale().as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_failed_source_rejects() {
        let source = InMemorySource::pending("broken");
        source.fail("no such file");
        assert!(source.concepts_ready().await.is_err());
        assert!(source
            .query(&DdfQuery::new(&Space::new(["geo"]), "name"))
            .await
            .is_err());
        assert_eq!(source.query_count(), 0);
    }

    #[tokio::test]
    async fn test_query_counts() {
        let source = InMemorySource::new("gap", sample_catalog());
        let rows = source
            .query(&DdfQuery::new(&Space::new(["geo", "time"]), "pop"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(source.query_count(), 1);
    }
}
