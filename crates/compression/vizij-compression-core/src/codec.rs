//! Codec interface and two reference codecs.
//!
//! Blob layout (little endian):
//! ```text
//! "VZAC" u16:version u8:name_len name u8:flags f64:frame_rate u32:num_keys
//! u32:num_tracks { u32:bone  positions rotations scales }*
//! u32:num_curves { u16:name_len name u32:num_keys { f32 time f32 value f32 arrive f32 leave u8 interp }* }*
//! ```
//! Track components are written by the codec: `RawCodec` stores f32s,
//! `QuantizedCodec` stores per-component ranges and fixed-point samples.

use std::fmt;
use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use vizij_anim_model::{
    sample_keys, BoneIndex, Interpolation, KeyInterp, RichCurveKey, TrackKeys, Transform,
};

use crate::compressible::CompressibleData;
use crate::error::CompressionError;

const MAGIC: &[u8; 4] = b"VZAC";
const BLOB_VERSION: u16 = 2;

const FLAG_ADDITIVE: u8 = 1;
const FLAG_STRIPPED: u8 = 1 << 1;
const FLAG_STEP: u8 = 1 << 2;

/// Encoded output of a codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedBlob {
    pub bytes: Vec<u8>,
}

impl CompressedBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedTrack {
    pub bone_index: BoneIndex,
    pub keys: TrackKeys,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedCurve {
    pub name: String,
    pub keys: Vec<RichCurveKey>,
}

/// Decoded form of a blob, used for playback and verification.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAnimation {
    pub codec: String,
    pub frame_rate: f64,
    pub num_keys: usize,
    pub interpolation: Interpolation,
    pub is_additive: bool,
    pub frames_stripped: bool,
    pub tracks: Vec<DecodedTrack>,
    pub curves: Vec<DecodedCurve>,
}

impl DecodedAnimation {
    /// Sample a bone at `time` seconds; `None` when the bone has no track.
    pub fn sample(&self, bone: BoneIndex, time: f64) -> Option<Transform> {
        let track = self.tracks.iter().find(|t| t.bone_index == bone)?;
        Some(sample_keys(&track.keys, time * self.frame_rate, self.interpolation))
    }
}

/// A bit-level animation codec.
///
/// `compress` must be deterministic: equal inputs give equal bytes. Implementations
/// are shared across worker threads.
pub trait Compressor: Send + Sync + fmt::Debug {
    /// Stable codec name, part of the cache key.
    fn name(&self) -> &str;

    /// Serialized settings, part of the cache key.
    fn settings_bytes(&self) -> Vec<u8>;

    fn compress(&self, data: &CompressibleData) -> Result<CompressedBlob, CompressionError>;

    fn decompress(&self, bytes: &[u8]) -> Result<DecodedAnimation, CompressionError>;

    /// Peak memory a build of `data` is expected to need.
    fn estimate_build_bytes(&self, data: &CompressibleData) -> u64 {
        data.raw_size_bytes() as u64 * 2
    }
}

// ----- shared framing -----

fn write_header<W: Write>(w: &mut W, codec: &str, data: &CompressibleData) -> Result<(), CompressionError> {
    w.write_all(MAGIC)?;
    w.write_u16::<LittleEndian>(BLOB_VERSION)?;
    let name = codec.as_bytes();
    w.write_u8(name.len().min(u8::MAX as usize) as u8)?;
    w.write_all(&name[..name.len().min(u8::MAX as usize)])?;
    let mut flags = 0u8;
    if data.is_additive() {
        flags |= FLAG_ADDITIVE;
    }
    if data.frames_stripped() {
        flags |= FLAG_STRIPPED;
    }
    if data.interpolation() == Interpolation::Step {
        flags |= FLAG_STEP;
    }
    w.write_u8(flags)?;
    w.write_f64::<LittleEndian>(data.frame_rate().as_f64())?;
    w.write_u32::<LittleEndian>(data.num_keys() as u32)?;
    Ok(())
}

fn read_header(r: &mut Cursor<&[u8]>, expected: &str) -> Result<DecodedAnimation, CompressionError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(CompressionError::Corrupt {
            reason: "bad magic".into(),
        });
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != BLOB_VERSION {
        return Err(CompressionError::Corrupt {
            reason: format!("unsupported blob version {version}"),
        });
    }
    let name_len = r.read_u8()? as usize;
    let mut name = vec![0u8; name_len];
    r.read_exact(&mut name)?;
    let name = String::from_utf8_lossy(&name).into_owned();
    if name != expected {
        return Err(CompressionError::CodecMismatch {
            expected: expected.to_string(),
            found: name,
        });
    }
    let flags = r.read_u8()?;
    let frame_rate = r.read_f64::<LittleEndian>()?;
    let num_keys = r.read_u32::<LittleEndian>()? as usize;
    Ok(DecodedAnimation {
        codec: name,
        frame_rate,
        num_keys,
        interpolation: if flags & FLAG_STEP != 0 {
            Interpolation::Step
        } else {
            Interpolation::Linear
        },
        is_additive: flags & FLAG_ADDITIVE != 0,
        frames_stripped: flags & FLAG_STRIPPED != 0,
        tracks: Vec::new(),
        curves: Vec::new(),
    })
}

fn interp_tag(interp: KeyInterp) -> u8 {
    match interp {
        KeyInterp::Constant => 0,
        KeyInterp::Linear => 1,
        KeyInterp::Cubic => 2,
    }
}

fn interp_from_tag(tag: u8) -> Result<KeyInterp, CompressionError> {
    match tag {
        0 => Ok(KeyInterp::Constant),
        1 => Ok(KeyInterp::Linear),
        2 => Ok(KeyInterp::Cubic),
        other => Err(CompressionError::Corrupt {
            reason: format!("unknown curve interpolation tag {other}"),
        }),
    }
}

fn write_curves<W: Write>(
    w: &mut W,
    codec: &str,
    data: &CompressibleData,
) -> Result<(), CompressionError> {
    w.write_u32::<LittleEndian>(data.curves().len() as u32)?;
    for c in data.curves() {
        let name = c.name.as_bytes();
        let name_len = u16::try_from(name.len()).map_err(|_| CompressionError::InvalidInput {
            codec: codec.to_string(),
            reason: format!("curve name '{}' is too long", c.name),
        })?;
        w.write_u16::<LittleEndian>(name_len)?;
        w.write_all(name)?;
        w.write_u32::<LittleEndian>(c.curve.keys.len() as u32)?;
        for k in &c.curve.keys {
            w.write_f32::<LittleEndian>(k.time)?;
            w.write_f32::<LittleEndian>(k.value)?;
            w.write_f32::<LittleEndian>(k.arrive_tangent)?;
            w.write_f32::<LittleEndian>(k.leave_tangent)?;
            w.write_u8(interp_tag(k.interp))?;
        }
    }
    Ok(())
}

fn read_curves(r: &mut Cursor<&[u8]>) -> Result<Vec<DecodedCurve>, CompressionError> {
    let count = r.read_u32::<LittleEndian>()? as usize;
    let mut curves = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let name_len = r.read_u16::<LittleEndian>()? as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let name = String::from_utf8_lossy(&name).into_owned();
        let n = r.read_u32::<LittleEndian>()? as usize;
        let mut keys = Vec::with_capacity(n.min(1 << 16));
        for _ in 0..n {
            keys.push(RichCurveKey {
                time: r.read_f32::<LittleEndian>()?,
                value: r.read_f32::<LittleEndian>()?,
                arrive_tangent: r.read_f32::<LittleEndian>()?,
                leave_tangent: r.read_f32::<LittleEndian>()?,
                interp: interp_from_tag(r.read_u8()?)?,
            });
        }
        curves.push(DecodedCurve { name, keys });
    }
    Ok(curves)
}

/// Per-codec encoding of track components.
trait ComponentCodec {
    fn write_vec3s(&self, w: &mut Vec<u8>, v: &[Vec3]) -> Result<(), CompressionError>;
    fn read_vec3s(&self, r: &mut Cursor<&[u8]>) -> Result<Vec<Vec3>, CompressionError>;
    fn write_quats(&self, w: &mut Vec<u8>, q: &[Quat]) -> Result<(), CompressionError>;
    fn read_quats(&self, r: &mut Cursor<&[u8]>) -> Result<Vec<Quat>, CompressionError>;
}

fn encode<C: ComponentCodec>(
    codec: &C,
    name: &str,
    data: &CompressibleData,
) -> Result<CompressedBlob, CompressionError> {
    let mut w = Vec::with_capacity(data.raw_size_bytes() / 2 + 64);
    write_header(&mut w, name, data)?;
    w.write_u32::<LittleEndian>(data.tracks().len() as u32)?;
    for track in data.tracks() {
        let keys = &track.keys;
        let n = data.num_keys();
        for (component, len) in [
            ("positions", keys.positions.len()),
            ("rotations", keys.rotations.len()),
            ("scales", keys.scales.len()),
        ] {
            if len != 1 && len != n {
                return Err(CompressionError::InvalidInput {
                    codec: name.to_string(),
                    reason: format!("track '{}' {component} has {len} keys, expected 1 or {n}", track.name),
                });
            }
        }
        w.write_u32::<LittleEndian>(track.bone_index.0)?;
        codec.write_vec3s(&mut w, &keys.positions)?;
        codec.write_quats(&mut w, &keys.rotations)?;
        codec.write_vec3s(&mut w, &keys.scales)?;
    }
    write_curves(&mut w, name, data)?;
    Ok(CompressedBlob { bytes: w })
}

fn decode<C: ComponentCodec>(codec: &C, name: &str, bytes: &[u8]) -> Result<DecodedAnimation, CompressionError> {
    let mut r = Cursor::new(bytes);
    let mut out = read_header(&mut r, name)?;
    let count = r.read_u32::<LittleEndian>()? as usize;
    out.tracks.reserve(count.min(4096));
    for _ in 0..count {
        let bone_index = BoneIndex(r.read_u32::<LittleEndian>()?);
        let positions = codec.read_vec3s(&mut r)?;
        let rotations = codec.read_quats(&mut r)?;
        let scales = codec.read_vec3s(&mut r)?;
        out.tracks.push(DecodedTrack {
            bone_index,
            keys: TrackKeys {
                positions,
                rotations,
                scales,
            },
        });
    }
    out.curves = read_curves(&mut r)?;
    Ok(out)
}

// ----- RawCodec -----

/// Lossless codec: every component stored as f32.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawCodec;

impl ComponentCodec for RawCodec {
    fn write_vec3s(&self, w: &mut Vec<u8>, v: &[Vec3]) -> Result<(), CompressionError> {
        w.write_u32::<LittleEndian>(v.len() as u32)?;
        for x in v {
            for c in x.to_array() {
                w.write_f32::<LittleEndian>(c)?;
            }
        }
        Ok(())
    }

    fn read_vec3s(&self, r: &mut Cursor<&[u8]>) -> Result<Vec<Vec3>, CompressionError> {
        let n = r.read_u32::<LittleEndian>()? as usize;
        let mut out = Vec::with_capacity(n.min(1 << 20));
        for _ in 0..n {
            out.push(Vec3::new(
                r.read_f32::<LittleEndian>()?,
                r.read_f32::<LittleEndian>()?,
                r.read_f32::<LittleEndian>()?,
            ));
        }
        Ok(out)
    }

    fn write_quats(&self, w: &mut Vec<u8>, q: &[Quat]) -> Result<(), CompressionError> {
        w.write_u32::<LittleEndian>(q.len() as u32)?;
        for x in q {
            for c in x.to_array() {
                w.write_f32::<LittleEndian>(c)?;
            }
        }
        Ok(())
    }

    fn read_quats(&self, r: &mut Cursor<&[u8]>) -> Result<Vec<Quat>, CompressionError> {
        let n = r.read_u32::<LittleEndian>()? as usize;
        let mut out = Vec::with_capacity(n.min(1 << 20));
        for _ in 0..n {
            out.push(Quat::from_xyzw(
                r.read_f32::<LittleEndian>()?,
                r.read_f32::<LittleEndian>()?,
                r.read_f32::<LittleEndian>()?,
                r.read_f32::<LittleEndian>()?,
            ));
        }
        Ok(out)
    }
}

impl Compressor for RawCodec {
    fn name(&self) -> &str {
        "raw"
    }

    fn settings_bytes(&self) -> Vec<u8> {
        Vec::new()
    }

    fn compress(&self, data: &CompressibleData) -> Result<CompressedBlob, CompressionError> {
        encode(self, self.name(), data)
    }

    fn decompress(&self, bytes: &[u8]) -> Result<DecodedAnimation, CompressionError> {
        decode(self, self.name(), bytes)
    }
}

// ----- QuantizedCodec -----

/// Fixed-point codec. Vec3 components are stored relative to their per-component
/// range in `bits` bits per axis; quaternions as signed 16-bit fractions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizedCodec {
    /// Bits per vec3 axis, 8..=16.
    pub bits: u8,
}

impl Default for QuantizedCodec {
    fn default() -> Self {
        Self { bits: 16 }
    }
}

impl QuantizedCodec {
    pub fn new(bits: u8) -> Self {
        Self {
            bits: bits.clamp(8, 16),
        }
    }

    fn max_q(&self) -> f32 {
        ((1u32 << self.bits.clamp(8, 16)) - 1) as f32
    }
}

impl ComponentCodec for QuantizedCodec {
    fn write_vec3s(&self, w: &mut Vec<u8>, v: &[Vec3]) -> Result<(), CompressionError> {
        w.write_u32::<LittleEndian>(v.len() as u32)?;
        if v.is_empty() {
            return Ok(());
        }
        let min = v.iter().fold(Vec3::splat(f32::MAX), |a, b| a.min(*b));
        let max = v.iter().fold(Vec3::splat(f32::MIN), |a, b| a.max(*b));
        for c in min.to_array().into_iter().chain(max.to_array()) {
            w.write_f32::<LittleEndian>(c)?;
        }
        let range = max - min;
        let max_q = self.max_q();
        for x in v {
            for axis in 0..3 {
                let q = if range[axis] > 0.0 {
                    ((x[axis] - min[axis]) / range[axis] * max_q).round()
                } else {
                    0.0
                };
                w.write_u16::<LittleEndian>(q.clamp(0.0, max_q) as u16)?;
            }
        }
        Ok(())
    }

    fn read_vec3s(&self, r: &mut Cursor<&[u8]>) -> Result<Vec<Vec3>, CompressionError> {
        let n = r.read_u32::<LittleEndian>()? as usize;
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut bounds = [0f32; 6];
        for b in bounds.iter_mut() {
            *b = r.read_f32::<LittleEndian>()?;
        }
        let min = Vec3::new(bounds[0], bounds[1], bounds[2]);
        let range = Vec3::new(bounds[3], bounds[4], bounds[5]) - min;
        let max_q = self.max_q();
        let mut out = Vec::with_capacity(n.min(1 << 20));
        for _ in 0..n {
            let mut v = Vec3::ZERO;
            for axis in 0..3 {
                let q = r.read_u16::<LittleEndian>()? as f32;
                v[axis] = min[axis] + q / max_q * range[axis];
            }
            out.push(v);
        }
        Ok(out)
    }

    fn write_quats(&self, w: &mut Vec<u8>, q: &[Quat]) -> Result<(), CompressionError> {
        w.write_u32::<LittleEndian>(q.len() as u32)?;
        for x in q {
            // canonical hemisphere keeps w >= 0
            let x = if x.w < 0.0 { -*x } else { *x };
            for c in x.to_array() {
                w.write_i16::<LittleEndian>((c.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)?;
            }
        }
        Ok(())
    }

    fn read_quats(&self, r: &mut Cursor<&[u8]>) -> Result<Vec<Quat>, CompressionError> {
        let n = r.read_u32::<LittleEndian>()? as usize;
        let mut out = Vec::with_capacity(n.min(1 << 20));
        for _ in 0..n {
            let mut c = [0f32; 4];
            for v in c.iter_mut() {
                *v = r.read_i16::<LittleEndian>()? as f32 / i16::MAX as f32;
            }
            out.push(Quat::from_array(c).normalize());
        }
        Ok(out)
    }
}

impl Compressor for QuantizedCodec {
    fn name(&self) -> &str {
        "quantized"
    }

    fn settings_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    fn compress(&self, data: &CompressibleData) -> Result<CompressedBlob, CompressionError> {
        // a larger error budget buys coarser quantization
        let scale = data.error_threshold_scale();
        let codec = if scale > 1.0 {
            QuantizedCodec::new(self.bits.saturating_sub(scale.log2().floor() as u8))
        } else {
            *self
        };
        let mut blob = encode(&codec, self.name(), data)?;
        blob.bytes.push(codec.bits);
        Ok(blob)
    }

    fn decompress(&self, bytes: &[u8]) -> Result<DecodedAnimation, CompressionError> {
        let Some((&bits, body)) = bytes.split_last() else {
            return Err(CompressionError::Corrupt {
                reason: "empty blob".into(),
            });
        };
        decode(&QuantizedCodec::new(bits), self.name(), body)
    }

    fn estimate_build_bytes(&self, data: &CompressibleData) -> u64 {
        data.raw_size_bytes() as u64 * 3
    }
}
