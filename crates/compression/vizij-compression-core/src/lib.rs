//! Vizij compression build pipeline.
//!
//! Prepares animation models for compression (curve baking, resampling, additive
//! baking, frame stripping), derives deterministic cache keys, and schedules
//! builds against a content-addressable cache under a concurrency cap and a
//! memory budget. [`CompressionPipeline`] ties assets, models and the scheduler
//! together so edits mark assets stale and trigger rebuilds.

pub mod additive;
pub mod asset;
pub mod budget;
pub mod cache;
pub mod codec;
pub mod compressible;
pub mod config;
pub mod curve_bake;
pub mod diagnostics;
pub mod error;
pub mod key;
pub mod pipeline;
pub mod prepare;
pub mod resample;
pub mod scheduler;
mod workers;

// Re-exports for consumers
pub use additive::{
    additive_delta, bake_additive, identity_additive, AdditiveBase, AdditiveOutput,
    AdditiveSettings, AdditiveSpace, ResolvedBase,
};
pub use asset::{
    AnimationAsset, AssetArena, AssetCompressionSettings, AssetHandle, BuildOutcome, BuildSink,
    CompressedAnimation, Playback,
};
pub use budget::{MemoryBudget, Reservation};
pub use cache::{Blob, BuildFn, CacheJobHandle, ContentAddressableCache, MemoryCache};
pub use codec::{
    CompressedBlob, Compressor, DecodedAnimation, DecodedCurve, DecodedTrack, QuantizedCodec,
    RawCodec,
};
pub use compressible::{CompressibleData, CompressibleParts, NamedCurve};
pub use config::{CompressionConfig, QueuePolicy};
pub use curve_bake::{bake_curves, BakedCurves};
pub use diagnostics::SchedulerDiagnostics;
pub use error::{BuildError, CacheError, CompressionError};
pub use key::{content_hash, CacheKey, CacheKeyBuilder, KeyDigest, CACHE_FORMAT_VERSION};
pub use pipeline::CompressionPipeline;
pub use prepare::{prepare_compressible, PrepareOptions};
pub use resample::{resample_tracks, strip_frames, StrippedTracks};
pub use scheduler::{BuildRequest, BuildScheduler, BuildTicket, JobPhase, TickReport};
