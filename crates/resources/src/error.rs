//! Error type for the resource cache pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("destination buffer of {dst_size} bytes is too small for {requested} requested bytes")]
    DestinationTooSmall { dst_size: usize, requested: usize },

    #[error("resource {id} not returned by fetch")]
    MissingFromFetch { id: String },

    #[error("fetch returned {got} bytes, expected {expected}")]
    FetchSizeMismatch { got: usize, expected: usize },

    #[error("on-disk cache record for {id} has size {on_disk}, expected {expected}")]
    SizeMismatch { id: String, on_disk: u32, expected: u32 },

    /// A fetcher built outside this crate (e.g. one backed by the replay
    /// transport) failed; the underlying error is collapsed to a string so
    /// this crate need not depend on the caller's error type.
    #[error("resource fetch failed: {0}")]
    FetchFailed(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ResourceResult<T> = Result<T, ResourceError>;
