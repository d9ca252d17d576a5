//! Additive baking: turns a prepared sequence into per-key deltas against a base pose.
//!
//! For every key `i` and every skeleton bone the target transform `t` and base
//! transform `b` give
//!
//! - rotation:    `normalize(t.r * b.r⁻¹)`
//! - translation: `t.t - b.t`
//! - scale:       `t.s * safe_reciprocal(b.s)`
//!
//! Base sampling time for key `i` of `N`:
//! - `ScaledAnimation`: `i / (N - 1) * base_length` (0 when `N == 1`)
//! - `AnimationFrame`:  `frame / base_rate`, clamped to the base length
//! - `RefPose`: the skeleton's reference pose, no time involved
//!
//! Float curves store `base - target` (tangents negated), with the base sampled at
//! the key time mapped proportionally onto the base sequence. Tracks that end up
//! identity at every key are dropped, except bone 0 which is always present.
//! All-zero curves are dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vizij_anim_model::{
    math::safe_scale_reciprocal, BoneIndex, BoneTrack, Interpolation, PoseSource, Skeleton,
    Timing, TrackKeys, Transform, IDENTITY_TOLERANCE,
};

use crate::asset::AssetHandle;
use crate::compressible::NamedCurve;
use crate::error::BuildError;

/// Where the base pose comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdditiveBase {
    RefPose,
    /// The base asset's full playback stretched over the target's length.
    ScaledAnimation(AssetHandle),
    /// A single frame of the base asset.
    AnimationFrame { asset: AssetHandle, frame: u32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdditiveSpace {
    /// Deltas between bone-local transforms.
    #[default]
    LocalSpace,
    /// Deltas between component-space transforms.
    MeshSpace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditiveSettings {
    pub base: AdditiveBase,
    #[serde(default)]
    pub space: AdditiveSpace,
}

impl AdditiveSettings {
    /// Base asset this additive reads from, if any.
    pub fn base_asset(&self) -> Option<AssetHandle> {
        match self.base {
            AdditiveBase::RefPose => None,
            AdditiveBase::ScaledAnimation(h) => Some(h),
            AdditiveBase::AnimationFrame { asset, .. } => Some(asset),
        }
    }
}

/// A base resolved against live data.
#[derive(Clone, Copy)]
pub enum ResolvedBase<'a> {
    RefPose,
    Scaled(&'a dyn PoseSource),
    Frame { source: &'a dyn PoseSource, frame: u32 },
}

impl ResolvedBase<'_> {
    fn source(&self) -> Option<&dyn PoseSource> {
        match self {
            ResolvedBase::RefPose => None,
            ResolvedBase::Scaled(s) => Some(*s),
            ResolvedBase::Frame { source, .. } => Some(*source),
        }
    }

    /// Base sampling time for key `i` of `n`.
    fn key_time(&self, i: usize, n: usize) -> f64 {
        match self {
            ResolvedBase::RefPose => 0.0,
            ResolvedBase::Scaled(s) => {
                if n <= 1 {
                    0.0
                } else {
                    i as f64 / (n - 1) as f64 * s.play_length()
                }
            }
            ResolvedBase::Frame { source, frame } => frame_time(*source, *frame),
        }
    }

    /// Base sampling time for a curve key at `time` in a sequence of `target_length` seconds.
    fn curve_time(&self, time: f32, target_length: f64) -> f32 {
        match self {
            ResolvedBase::RefPose => 0.0,
            ResolvedBase::Scaled(s) => {
                if target_length <= 0.0 {
                    0.0
                } else {
                    (time as f64 / target_length * s.play_length()) as f32
                }
            }
            ResolvedBase::Frame { source, frame } => frame_time(*source, *frame) as f32,
        }
    }
}

fn frame_time(source: &dyn PoseSource, frame: u32) -> f64 {
    (frame as f64 / source.frame_rate().as_f64()).min(source.play_length())
}

#[derive(Clone, Debug, PartialEq)]
pub struct AdditiveOutput {
    pub tracks: Vec<BoneTrack>,
    pub curves: Vec<NamedCurve>,
}

/// Per-component delta of `target` against `base`.
#[inline]
pub fn additive_delta(target: &Transform, base: &Transform) -> Transform {
    Transform {
        translation: target.translation - base.translation,
        rotation: (target.rotation * base.rotation.inverse()).normalize(),
        scale: target.scale * safe_scale_reciprocal(base.scale),
    }
}

/// Root-only identity additive, used when the base cannot be resolved.
pub fn identity_additive() -> AdditiveOutput {
    AdditiveOutput {
        tracks: vec![BoneTrack::new(
            "root",
            BoneIndex::ROOT,
            TrackKeys::constant(Transform::IDENTITY),
        )],
        curves: Vec::new(),
    }
}

/// Check that `base` can serve as an additive base for a sequence on `skeleton`.
pub fn validate_base(skeleton: &Arc<Skeleton>, base: &ResolvedBase<'_>) -> Result<(), BuildError> {
    if let Some(source) = base.source() {
        let base_skeleton = source.skeleton();
        if !Arc::ptr_eq(base_skeleton, skeleton)
            && base_skeleton.identity_hash() != skeleton.identity_hash()
        {
            return Err(BuildError::MissingAdditiveBase {
                reason: format!(
                    "base uses skeleton '{}' but the sequence uses '{}'",
                    base_skeleton.name(),
                    skeleton.name()
                ),
            });
        }
    }
    Ok(())
}

/// Bake `tracks` (all at `timing`) into additive deltas against `base`.
pub fn bake_additive(
    skeleton: &Arc<Skeleton>,
    tracks: &[BoneTrack],
    curves: &[NamedCurve],
    timing: Timing,
    base: &ResolvedBase<'_>,
    space: AdditiveSpace,
    interpolation: Interpolation,
) -> Result<AdditiveOutput, BuildError> {
    validate_base(skeleton, base)?;

    let num_bones = skeleton.num_bones();
    let num_virtual = skeleton.virtual_bones().len();
    let n = timing.num_keys;

    let mut target_keys: Vec<Option<&TrackKeys>> = vec![None; num_bones + num_virtual];
    for track in tracks {
        if let Some(slot) = target_keys.get_mut(track.bone_index.as_usize()) {
            *slot = Some(&track.keys);
        }
    }

    let ref_locals = skeleton.ref_pose_locals();
    let mut deltas: Vec<Vec<Transform>> = vec![Vec::with_capacity(n); num_bones + num_virtual];

    for i in 0..n {
        let target_locals: Vec<Transform> = ref_locals
            .iter()
            .zip(target_keys.iter())
            .map(|(r, keys)| keys.map(|k| k.key(i)).unwrap_or(*r))
            .collect();
        let base_locals = match base.source() {
            Some(source) => source.evaluate_local_pose(base.key_time(i, n), interpolation),
            None => ref_locals.clone(),
        };
        let base_cs = skeleton.component_space(&base_locals);

        match space {
            AdditiveSpace::LocalSpace => {
                for b in 0..num_bones {
                    deltas[b].push(additive_delta(&target_locals[b], &base_locals[b]));
                }
            }
            AdditiveSpace::MeshSpace => {
                let target_cs = skeleton.component_space(&target_locals);
                for b in 0..num_bones {
                    deltas[b].push(additive_delta(&target_cs[b], &base_cs[b]));
                }
            }
        }

        for (v, vb) in skeleton.virtual_bones().iter().enumerate() {
            let slot = num_bones + v;
            let base_value = base_cs[vb.target.as_usize()].relative_to(&base_cs[vb.source.as_usize()]);
            let target_value = match target_keys[slot] {
                Some(k) => k.key(i),
                None => base_value,
            };
            deltas[slot].push(additive_delta(&target_value, &base_value));
        }
    }

    let mut out_tracks = Vec::new();
    for (idx, frames) in deltas.into_iter().enumerate() {
        let bone = BoneIndex(idx as u32);
        let identity = frames.iter().all(|t| t.is_identity(IDENTITY_TOLERANCE));
        if identity && bone != BoneIndex::ROOT {
            continue;
        }
        let keys = if identity {
            TrackKeys::constant(Transform::IDENTITY)
        } else {
            TrackKeys::from_transforms(&frames)
        };
        let name = skeleton.bone_name(bone).unwrap_or_default().to_string();
        out_tracks.push(BoneTrack::new(name, bone, keys));
    }

    let out_curves = match base.source() {
        None => curves.to_vec(),
        Some(source) => curve_deltas(curves, timing.play_length(), base, source),
    };

    log::debug!(
        "additive bake: {} of {} bone(s) kept, {} curve(s)",
        out_tracks.len(),
        num_bones + num_virtual,
        out_curves.len()
    );
    Ok(AdditiveOutput {
        tracks: out_tracks,
        curves: out_curves,
    })
}

fn curve_deltas(
    curves: &[NamedCurve],
    target_length: f64,
    base: &ResolvedBase<'_>,
    source: &dyn PoseSource,
) -> Vec<NamedCurve> {
    curves
        .iter()
        .filter_map(|c| {
            let mut delta = c.clone();
            // stored as base - target; tangents flip with the target's sign
            for key in delta.curve.keys.iter_mut() {
                let t = base.curve_time(key.time, target_length);
                key.value = source.evaluate_curve(c.id, t).unwrap_or(0.0) - key.value;
                key.arrive_tangent = -key.arrive_tangent;
                key.leave_tangent = -key.leave_tangent;
            }
            (!delta.curve.is_zero(IDENTITY_TOLERANCE)).then_some(delta)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn delta_of_equal_transforms_is_identity() {
        let t = Transform::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.4), Vec3::splat(2.0));
        assert!(additive_delta(&t, &t).is_identity(1e-5));
    }

    #[test]
    fn delta_components() {
        let base = Transform::new(Vec3::X, Quat::IDENTITY, Vec3::splat(2.0));
        let target = Transform::new(Vec3::new(1.0, 1.0, 0.0), Quat::from_rotation_z(0.5), Vec3::splat(4.0));
        let d = additive_delta(&target, &base);
        assert!(d.translation.abs_diff_eq(Vec3::Y, 1e-6));
        assert!(d.rotation.abs_diff_eq(Quat::from_rotation_z(0.5), 1e-6));
        assert!(d.scale.abs_diff_eq(Vec3::splat(2.0), 1e-6));
    }
}
