//! Engine-level errors.

use crate::geohash::GeohashError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Geohash(#[from] GeohashError),

    /// A viewport fetch failed. The prefix was not marked covered and
    /// nothing was merged, so the next viewport event will retry it.
    #[error("fetch for prefix '{prefix}' failed: {source}")]
    FetchFailure {
        prefix: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid viewport: {0}")]
    InvalidViewport(String),
}
