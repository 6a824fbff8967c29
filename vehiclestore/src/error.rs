//! Error types for the vehicle store engine.

/// Errors surfaced by the engine.
///
/// Malformed index keys and undecodable bucket payloads are not errors: they
/// are logged and skipped so that a single bad record never fails a range
/// query. Everything in this enum reaches the caller.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The backing store failed or timed out.
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    /// A batch read returned a different number of records than requested.
    #[error("batch read returned {actual} records for {expected} keys")]
    BatchMismatch { expected: usize, actual: usize },

    /// A map operation targeted a bin that holds a non-map value.
    #[error("bin {bin} of record {key} is not a map")]
    WrongBinType { key: String, bin: String },

    /// A bucket could not be serialized for writing.
    #[error("failed to encode bucket {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Settings could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The worker pool no longer accepts work.
    #[error("worker pool is shut down")]
    PoolShutdown,

    /// A task running on the worker pool panicked.
    #[error("worker task panicked")]
    TaskPanicked,
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
