//! Error types for preparation, codecs, caching and scheduling.

use vizij_anim_model::ModelError;

/// Failure inside a codec.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CompressionError {
    #[error("codec '{codec}' rejected input: {reason}")]
    InvalidInput { codec: String, reason: String },

    #[error("corrupt compressed data: {reason}")]
    Corrupt { reason: String },

    #[error("codec mismatch: blob was written by '{found}', expected '{expected}'")]
    CodecMismatch { expected: String, found: String },
}

impl From<std::io::Error> for CompressionError {
    fn from(e: std::io::Error) -> Self {
        CompressionError::Corrupt {
            reason: e.to_string(),
        }
    }
}

/// Failure reported by a content-addressable cache.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CacheError {
    /// The build closure ran and the codec failed.
    #[error("build failed: {0}")]
    BuildFailed(CompressionError),

    /// The cache could not produce a result (storage failure, builder panic, lost job).
    #[error("cache retrieval failed: {reason}")]
    Retrieval { reason: String },
}

/// Errors surfaced by preparation and the build scheduler.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BuildError {
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("missing additive base: {reason}")]
    MissingAdditiveBase { reason: String },

    #[error("cache retrieval failed for {key}: {reason}")]
    CacheRetrievalFailed { key: String, reason: String },

    #[error("asset handle is stale or was never issued")]
    AssetNotFound,

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl BuildError {
    /// Map a cache failure for `key`; codec failures keep their own variant.
    pub fn from_cache(key: &str, err: CacheError) -> Self {
        match err {
            CacheError::BuildFailed(e) => BuildError::Compression(e),
            CacheError::Retrieval { reason } => BuildError::CacheRetrievalFailed {
                key: key.to_string(),
                reason,
            },
        }
    }
}
