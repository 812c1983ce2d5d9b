//! Tabular data, range analysis and reference sources for data bindings

pub mod cache;
pub mod frame;
pub mod range;
pub mod reindex;
pub mod sources;

use arrow::error::ArrowError;
use tokio::task::JoinError;
use thiserror::Error;

// Re-exports
pub use cache::DataCache;
pub use frame::{
    rows_from_record_batch, ConceptLookups, DataFrame, DataFrameGroup, GroupMember, LookupFrame,
    Tabular,
};
pub use range::{range, range_by_group, range_of, range_of_group_key_per_member, unique, Extent};
pub use reindex::{reindex, reindex_group};
pub use sources::{load_ddf_dir, Catalog, CatalogBuilder, InMemorySource, LoadState};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(ArrowError),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("Unsupported column type: {0}")]
    UnsupportedType(String),

    /// A caller broke the contract of an algorithm
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Source '{0}' failed to load: {1}")]
    SourceLoad(String, String),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => DataError::Io(std::io::Error::new(io_err.kind(), error.to_string())),
            _ => DataError::Csv(error.to_string()),
        }
    }
}

impl From<ArrowError> for DataError {
    fn from(error: ArrowError) -> Self {
        DataError::Arrow(error)
    }
}
