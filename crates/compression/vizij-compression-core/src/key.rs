//! Deterministic cache keys.
//!
//! `key = md5(format_version | strip_flag | content_hash | skeleton_identity |
//! codec_name | codec_settings)`. Tracks are hashed in skeleton index order, curves
//! in name order, floats by bit pattern, and every variable-length field carries a
//! length prefix so adjacent fields cannot alias.

use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use vizij_anim_model::TrackKeys;

use crate::codec::Compressor;
use crate::compressible::CompressibleData;

/// Bump when anything that feeds the key (or the blob layout) changes meaning.
pub const CACHE_FORMAT_VERSION: u32 = 1;

const KEY_PREFIX: &str = "VZANIM";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest size of the key and content hashes.
pub type KeyDigest = [u8; 16];

/// MD5 with length-prefixed field helpers.
struct FieldHasher(Md5);

impl FieldHasher {
    fn new(domain: &str) -> Self {
        let mut h = Self(Md5::new());
        h.bytes(domain.as_bytes());
        h
    }

    fn bytes(&mut self, b: &[u8]) {
        self.0.update(&(b.len() as u64).to_le_bytes());
        self.0.update(b);
    }

    fn u64(&mut self, v: u64) {
        self.0.update(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.0.update(&v.to_le_bytes());
    }

    fn u8(&mut self, v: u8) {
        self.0.update(&[v]);
    }

    fn f32(&mut self, v: f32) {
        self.0.update(&v.to_bits().to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.0.update(&v.to_bits().to_le_bytes());
    }

    fn f32s(&mut self, values: &[f32]) {
        self.u64(values.len() as u64);
        for v in values {
            self.f32(*v);
        }
    }

    fn finish(self) -> KeyDigest {
        self.0.finalize().into()
    }
}

fn hash_track_keys(h: &mut FieldHasher, keys: &TrackKeys) {
    h.f32s(&keys.positions.iter().flat_map(|v| v.to_array()).collect::<Vec<f32>>());
    h.f32s(&keys.rotations.iter().flat_map(|q| q.to_array()).collect::<Vec<f32>>());
    h.f32s(&keys.scales.iter().flat_map(|v| v.to_array()).collect::<Vec<f32>>());
}

/// Hash of everything in `data` that affects compressed output, except the
/// skeleton identity and codec which the key adds separately.
pub fn content_hash(data: &CompressibleData) -> KeyDigest {
    let mut h = FieldHasher::new("vizij.anim.content");
    h.f64(data.frame_rate().as_f64());
    h.u64(data.num_keys() as u64);
    h.f64(data.play_length());
    h.u8(data.interpolation().as_u8());
    h.u8(data.is_additive() as u8);
    h.f32(data.error_threshold_scale());

    h.u64(data.tracks().len() as u64);
    for track in data.tracks() {
        h.u32(track.bone_index.0);
        hash_track_keys(&mut h, &track.keys);
    }

    h.u64(data.curves().len() as u64);
    for curve in data.curves() {
        h.bytes(curve.name.as_bytes());
        h.u64(curve.curve.keys.len() as u64);
        for k in &curve.curve.keys {
            h.f32(k.time);
            h.f32(k.value);
            h.f32(k.arrive_tangent);
            h.f32(k.leave_tangent);
            h.u8(k.interp as u8);
        }
    }
    h.finish()
}

/// Derives cache keys for a given format version.
#[derive(Clone, Copy, Debug)]
pub struct CacheKeyBuilder {
    format_version: u32,
}

impl Default for CacheKeyBuilder {
    fn default() -> Self {
        Self::new(CACHE_FORMAT_VERSION)
    }
}

impl CacheKeyBuilder {
    pub fn new(format_version: u32) -> Self {
        Self { format_version }
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn build(&self, data: &CompressibleData, codec: &dyn Compressor) -> CacheKey {
        let mut h = FieldHasher::new("vizij.anim.key");
        h.u32(self.format_version);
        h.u8(data.frames_stripped() as u8);
        h.bytes(&content_hash(data));
        h.bytes(&data.skeleton().identity_hash());
        h.bytes(codec.name().as_bytes());
        h.bytes(&codec.settings_bytes());
        let digest = h.finish();

        let mut hex = String::with_capacity(32);
        for b in digest {
            hex.push_str(&format!("{b:02x}"));
        }
        CacheKey(format!("{KEY_PREFIX}_{}_{hex}", self.format_version))
    }
}
