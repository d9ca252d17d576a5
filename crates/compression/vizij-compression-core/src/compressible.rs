//! Immutable input handed to a codec.

use std::sync::Arc;

use vizij_anim_model::{BoneTrack, CurveId, FrameRate, Interpolation, RichCurve, Skeleton};

/// A float curve carried into compression.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedCurve {
    pub id: CurveId,
    pub name: String,
    pub curve: RichCurve,
}

/// Everything needed to build a `CompressibleData`. Consumed by `CompressibleData::new`.
#[derive(Clone, Debug)]
pub struct CompressibleParts {
    pub name: String,
    pub skeleton: Arc<Skeleton>,
    pub tracks: Vec<BoneTrack>,
    pub curves: Vec<NamedCurve>,
    pub interpolation: Interpolation,
    pub frame_rate: FrameRate,
    pub num_keys: usize,
    pub play_length: f64,
    pub error_threshold_scale: f32,
    pub is_additive: bool,
    pub frames_stripped: bool,
}

/// Snapshot of prepared animation data. Created once per build request and never
/// mutated; share it as `Arc<CompressibleData>`.
#[derive(Clone, Debug)]
pub struct CompressibleData {
    parts: CompressibleParts,
}

/// Approximate in-memory size of one curve key (time, value, two tangents, mode).
const CURVE_KEY_BYTES: usize = 20;

impl CompressibleData {
    /// Tracks are ordered by skeleton index and curves by name, which fixes the
    /// enumeration order used for hashing and encoding.
    pub fn new(mut parts: CompressibleParts) -> Self {
        parts.tracks.sort_by_key(|t| t.bone_index);
        parts.curves.sort_by(|a, b| a.name.cmp(&b.name));
        Self { parts }
    }

    pub fn name(&self) -> &str {
        &self.parts.name
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.parts.skeleton
    }

    pub fn tracks(&self) -> &[BoneTrack] {
        &self.parts.tracks
    }

    pub fn curves(&self) -> &[NamedCurve] {
        &self.parts.curves
    }

    pub fn interpolation(&self) -> Interpolation {
        self.parts.interpolation
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.parts.frame_rate
    }

    pub fn num_keys(&self) -> usize {
        self.parts.num_keys
    }

    pub fn play_length(&self) -> f64 {
        self.parts.play_length
    }

    pub fn error_threshold_scale(&self) -> f32 {
        self.parts.error_threshold_scale
    }

    pub fn is_additive(&self) -> bool {
        self.parts.is_additive
    }

    pub fn frames_stripped(&self) -> bool {
        self.parts.frames_stripped
    }

    /// Size of the raw key payload in bytes.
    pub fn raw_size_bytes(&self) -> usize {
        let tracks: usize = self.parts.tracks.iter().map(|t| t.keys.raw_size_bytes()).sum();
        let curves: usize = self
            .parts
            .curves
            .iter()
            .map(|c| c.curve.keys.len() * CURVE_KEY_BYTES)
            .sum();
        tracks + curves
    }
}
