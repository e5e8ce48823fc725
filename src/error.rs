use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to bring the place/city dataset up at startup. Always fatal.
#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("cannot read dataset at {}: {source}", path.display())]
    Unreachable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed dataset: {0}")]
    Malformed(#[from] simd_json::Error),
    #[error("invalid dataset: {0}")]
    Invalid(String),
}

/// Failure to read or write the persisted progress document.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("cannot encode progress: {0}")]
    Encode(#[from] simd_json::Error),
}
