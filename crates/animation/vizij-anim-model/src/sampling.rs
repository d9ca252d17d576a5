//! Key sampling for bone tracks.
//!
//! Model:
//! - Keys sit on a uniform frame grid; key `i` is at `i / frame_rate` seconds.
//! - A fractional key position `p` falls between keys `floor(p)` and `floor(p) + 1`.
//! - `Linear` blends components (rotation: shortest-arc NLERP); `Step` holds the left key.
//! - Positions outside `[0, num_keys - 1]` clamp to the end keys.
//! - Single-key (constant) components broadcast their key and are never resampled.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::math::{nlerp_quat, Transform};
use crate::track::TrackKeys;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Linear,
    Step,
}

impl Interpolation {
    /// Stable tag used when hashing.
    pub fn as_u8(self) -> u8 {
        match self {
            Interpolation::Linear => 0,
            Interpolation::Step => 1,
        }
    }
}

/// Split a fractional key position into (left, right, alpha) over `n` keys.
#[inline]
fn segment(position: f64, n: usize) -> (usize, usize, f32) {
    if n <= 1 || position <= 0.0 || !position.is_finite() {
        return (0, 0, 0.0);
    }
    let last = n - 1;
    if position >= last as f64 {
        return (last, last, 0.0);
    }
    let left = position.floor() as usize;
    let alpha = (position - left as f64) as f32;
    (left, (left + 1).min(last), alpha)
}

fn sample_vec3(keys: &[Vec3], position: f64, interp: Interpolation, default: Vec3) -> Vec3 {
    match keys.len() {
        0 => default,
        1 => keys[0],
        n => {
            let (l, r, a) = segment(position, n);
            match interp {
                Interpolation::Step => keys[l],
                Interpolation::Linear => keys[l].lerp(keys[r], a),
            }
        }
    }
}

fn sample_quat(keys: &[Quat], position: f64, interp: Interpolation) -> Quat {
    match keys.len() {
        0 => Quat::IDENTITY,
        1 => keys[0],
        n => {
            let (l, r, a) = segment(position, n);
            match interp {
                Interpolation::Step => keys[l],
                Interpolation::Linear if l == r => keys[l],
                Interpolation::Linear => nlerp_quat(keys[l], keys[r], a),
            }
        }
    }
}

/// Sample a track at fractional key `position`.
pub fn sample_keys(keys: &TrackKeys, position: f64, interp: Interpolation) -> Transform {
    Transform {
        translation: sample_vec3(&keys.positions, position, interp, Vec3::ZERO),
        rotation: sample_quat(&keys.rotations, position, interp),
        scale: sample_vec3(&keys.scales, position, interp, Vec3::ONE),
    }
}

/// Resample every animated component of `keys` to `dst_num_keys` keys.
///
/// Destination key `k` is at time `k / dst_rate`, i.e. source position
/// `k / dst_rate * src_rate`. Constant components are copied as-is.
pub fn resample_keys(
    keys: &TrackKeys,
    src_rate: f64,
    dst_rate: f64,
    dst_num_keys: usize,
    interp: Interpolation,
) -> TrackKeys {
    let ratio = src_rate / dst_rate;
    let position = |k: usize| k as f64 * ratio;
    resample_by(keys, dst_num_keys, position, interp)
}

/// Resample animated components to `dst_num_keys` keys spread proportionally over
/// the same span (first and last keys map onto each other).
pub fn resample_proportional(
    keys: &TrackKeys,
    dst_num_keys: usize,
    interp: Interpolation,
) -> TrackKeys {
    let src_frames = keys.num_frames().saturating_sub(1) as f64;
    let dst_frames = dst_num_keys.saturating_sub(1) as f64;
    let position = |k: usize| {
        if dst_frames <= 0.0 {
            0.0
        } else {
            k as f64 * src_frames / dst_frames
        }
    };
    resample_by(keys, dst_num_keys, position, interp)
}

fn resample_by(
    keys: &TrackKeys,
    dst_num_keys: usize,
    position: impl Fn(usize) -> f64,
    interp: Interpolation,
) -> TrackKeys {
    let vec3s = |src: &Vec<Vec3>, default: Vec3| -> Vec<Vec3> {
        if src.len() <= 1 {
            return src.clone();
        }
        (0..dst_num_keys)
            .map(|k| sample_vec3(src, position(k), interp, default))
            .collect()
    };
    let rotations = if keys.rotations.len() <= 1 {
        keys.rotations.clone()
    } else {
        (0..dst_num_keys)
            .map(|k| sample_quat(&keys.rotations, position(k), interp))
            .collect()
    };
    TrackKeys {
        positions: vec3s(&keys.positions, Vec3::ZERO),
        rotations,
        scales: vec3s(&keys.scales, Vec3::ONE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> TrackKeys {
        TrackKeys {
            positions: (0..n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect(),
            rotations: vec![Quat::IDENTITY],
            scales: vec![Vec3::ONE],
        }
    }

    #[test]
    fn linear_and_step_between_keys() {
        let keys = ramp(3);
        let lin = sample_keys(&keys, 0.5, Interpolation::Linear);
        assert!((lin.translation.x - 0.5).abs() < 1e-6);
        let step = sample_keys(&keys, 1.75, Interpolation::Step);
        assert_eq!(step.translation.x, 1.0);
        let clamped = sample_keys(&keys, 10.0, Interpolation::Linear);
        assert_eq!(clamped.translation.x, 2.0);
    }

    #[test]
    fn resample_halves_rate() {
        // 31 keys at 30 fps -> 16 keys at 15 fps
        let keys = ramp(31);
        let out = resample_keys(&keys, 30.0, 15.0, 16, Interpolation::Linear);
        assert_eq!(out.positions.len(), 16);
        assert_eq!(out.positions[15].x, 30.0);
        assert_eq!(out.positions[1].x, 2.0);
        assert_eq!(out.rotations.len(), 1);
        assert_eq!(out.scales.len(), 1);
    }

    #[test]
    fn proportional_maps_endpoints() {
        let keys = ramp(4);
        let out = resample_proportional(&keys, 3, Interpolation::Linear);
        assert_eq!(out.positions.len(), 3);
        assert_eq!(out.positions[0].x, 0.0);
        assert!((out.positions[1].x - 1.5).abs() < 1e-6);
        assert_eq!(out.positions[2].x, 3.0);
    }
}
