//! Owning assets: generation-checked arena, per-asset compression settings and
//! the applied build result.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vizij_anim_model::{DataModel, Interpolation};

use crate::additive::AdditiveSettings;
use crate::cache::Blob;
use crate::codec::{Compressor, DecodedAnimation, RawCodec};
use crate::error::{BuildError, CompressionError};
use crate::key::CacheKey;

/// Weak reference to an arena slot. A handle whose slot was freed (or reused)
/// no longer resolves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetHandle {
    index: u32,
    generation: u32,
}

impl AssetHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct AssetArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for AssetArena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> AssetArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> AssetHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return AssetHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        AssetHandle {
            index,
            generation: 0,
        }
    }

    pub fn remove(&mut self, handle: AssetHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, handle: AssetHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: AssetHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, handle: AssetHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value.as_ref().map(|v| {
                (
                    AssetHandle {
                        index: i as u32,
                        generation: s.generation,
                    },
                    v,
                )
            })
        })
    }
}

/// Per-asset compression settings.
#[derive(Clone, Debug)]
pub struct AssetCompressionSettings {
    pub codec: Arc<dyn Compressor>,
    /// `None` keeps the model's frame rate.
    pub target_frame_rate: Option<f64>,
    pub interpolation: Interpolation,
    pub additive: Option<AdditiveSettings>,
    pub allow_frame_stripping: bool,
    pub error_threshold_scale: f32,
}

impl Default for AssetCompressionSettings {
    fn default() -> Self {
        Self {
            codec: Arc::new(RawCodec),
            target_frame_rate: None,
            interpolation: Interpolation::Linear,
            additive: None,
            allow_frame_stripping: true,
            error_threshold_scale: 1.0,
        }
    }
}

/// A build result applied to an asset.
#[derive(Clone, Debug)]
pub struct CompressedAnimation {
    pub key: CacheKey,
    pub blob: Blob,
    pub codec: Arc<dyn Compressor>,
}

impl CompressedAnimation {
    pub fn decode(&self) -> Result<DecodedAnimation, CompressionError> {
        self.codec.decompress(&self.blob)
    }
}

#[derive(Debug)]
pub struct AnimationAsset {
    pub name: String,
    pub model: DataModel,
    pub settings: AssetCompressionSettings,
    pub compressed: Option<CompressedAnimation>,
    /// Set when the model changed since `compressed` was produced.
    pub stale: bool,
    /// Key of the most recent build request; results for other keys are ignored.
    pub requested_key: Option<CacheKey>,
    pub last_error: Option<BuildError>,
}

/// What playback should read.
#[derive(Debug)]
pub enum Playback<'a> {
    Compressed(&'a CompressedAnimation),
    Raw(&'a DataModel),
}

impl AnimationAsset {
    pub fn new(name: impl Into<String>, model: DataModel, settings: AssetCompressionSettings) -> Self {
        Self {
            name: name.into(),
            model,
            settings,
            compressed: None,
            stale: true,
            requested_key: None,
            last_error: None,
        }
    }

    /// Compressed data when it is up to date, raw model data otherwise.
    pub fn playback(&self) -> Playback<'_> {
        match &self.compressed {
            Some(c) if !self.stale => Playback::Compressed(c),
            _ => Playback::Raw(&self.model),
        }
    }
}

/// Result of one build, delivered to a `BuildSink`.
#[derive(Debug)]
pub struct BuildOutcome {
    pub asset: AssetHandle,
    pub key: CacheKey,
    pub result: Result<Blob, BuildError>,
}

/// Receives finished builds. Returns `false` when the target asset no longer exists.
pub trait BuildSink {
    fn apply(&mut self, outcome: BuildOutcome) -> bool;
}

impl BuildSink for AssetArena<AnimationAsset> {
    fn apply(&mut self, outcome: BuildOutcome) -> bool {
        let Some(asset) = self.get_mut(outcome.asset) else {
            log::debug!("{}: destroyed before its build finished; result discarded", outcome.asset);
            return false;
        };
        if asset.requested_key.as_ref() != Some(&outcome.key) {
            log::debug!(
                "{} '{}': result for superseded key {} ignored",
                outcome.asset,
                asset.name,
                outcome.key
            );
            return true;
        }
        match outcome.result {
            Ok(blob) => {
                asset.compressed = Some(CompressedAnimation {
                    key: outcome.key,
                    blob,
                    codec: asset.settings.codec.clone(),
                });
                asset.stale = false;
                asset.last_error = None;
            }
            Err(e) => {
                log::warn!("{} '{}': build failed: {}", outcome.asset, asset.name, e);
                asset.last_error = Some(e);
            }
        }
        true
    }
}
