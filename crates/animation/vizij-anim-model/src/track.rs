//! Bone tracks: three parallel key arrays (position, rotation, scale), each either a
//! single constant key or exactly one key per frame.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::ids::BoneIndex;
use crate::math::Transform;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackKeys {
    pub positions: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    pub scales: Vec<Vec3>,
}

impl TrackKeys {
    /// Single-key track holding `t`.
    pub fn constant(t: Transform) -> Self {
        Self {
            positions: vec![t.translation],
            rotations: vec![t.rotation],
            scales: vec![t.scale],
        }
    }

    /// One key per entry of `frames`.
    pub fn from_transforms(frames: &[Transform]) -> Self {
        Self {
            positions: frames.iter().map(|t| t.translation).collect(),
            rotations: frames.iter().map(|t| t.rotation).collect(),
            scales: frames.iter().map(|t| t.scale).collect(),
        }
    }

    /// Longest component length (the number of distinct frames stored).
    pub fn num_frames(&self) -> usize {
        self.positions
            .len()
            .max(self.rotations.len())
            .max(self.scales.len())
    }

    /// True when every component holds a single key.
    pub fn is_constant(&self) -> bool {
        self.positions.len() == 1 && self.rotations.len() == 1 && self.scales.len() == 1
    }

    /// Transform at key `i`; constant components broadcast.
    #[inline]
    pub fn key(&self, i: usize) -> Transform {
        Transform {
            translation: pick(&self.positions, i, Vec3::ZERO),
            rotation: pick(&self.rotations, i, Quat::IDENTITY),
            scale: pick(&self.scales, i, Vec3::ONE),
        }
    }

    /// Check component lengths against the expected key count.
    pub fn validate(&self, track: &str, num_keys: usize) -> Result<(), ModelError> {
        let check = |component: &'static str, got: usize| {
            if got == 1 || got == num_keys {
                Ok(())
            } else {
                Err(ModelError::KeyCountMismatch {
                    track: track.to_string(),
                    component,
                    expected: num_keys,
                    got,
                })
            }
        };
        check("positions", self.positions.len())?;
        check("rotations", self.rotations.len())?;
        check("scales", self.scales.len())?;
        let finite = self.positions.iter().all(|v| v.is_finite())
            && self.rotations.iter().all(|q| q.is_finite())
            && self.scales.iter().all(|v| v.is_finite());
        if !finite {
            return Err(ModelError::NonFiniteKeys {
                track: track.to_string(),
            });
        }
        Ok(())
    }

    /// Repeat constant components so every component has `num_keys` keys.
    pub fn expand_to(&mut self, num_keys: usize) {
        expand(&mut self.positions, num_keys);
        expand(&mut self.rotations, num_keys);
        expand(&mut self.scales, num_keys);
    }

    /// Change the frame count of animated components: pad by repeating the last key,
    /// or truncate. Constant components are left alone.
    pub fn resize_frames(&mut self, num_keys: usize) {
        resize(&mut self.positions, num_keys);
        resize(&mut self.rotations, num_keys);
        resize(&mut self.scales, num_keys);
    }

    /// Every key of every component equals the identity within `tolerance`.
    pub fn is_identity_everywhere(&self, tolerance: f32) -> bool {
        (0..self.num_frames()).all(|i| self.key(i).is_identity(tolerance))
    }

    /// Raw payload size in bytes.
    pub fn raw_size_bytes(&self) -> usize {
        self.positions.len() * 12 + self.rotations.len() * 16 + self.scales.len() * 12
    }
}

#[inline]
fn pick<T: Copy>(keys: &[T], i: usize, default: T) -> T {
    match keys.len() {
        0 => default,
        1 => keys[0],
        n => keys[i.min(n - 1)],
    }
}

fn expand<T: Copy>(keys: &mut Vec<T>, num_keys: usize) {
    if keys.len() == 1 && num_keys > 1 {
        let v = keys[0];
        keys.resize(num_keys, v);
    }
}

fn resize<T: Copy>(keys: &mut Vec<T>, num_keys: usize) {
    if keys.len() <= 1 {
        return;
    }
    if let Some(&last) = keys.last() {
        keys.resize(num_keys, last);
    }
}

/// Raw animation for one bone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneTrack {
    pub name: String,
    #[serde(rename = "boneIndex")]
    pub bone_index: BoneIndex,
    pub keys: TrackKeys,
}

impl BoneTrack {
    pub fn new(name: impl Into<String>, bone_index: BoneIndex, keys: TrackKeys) -> Self {
        Self {
            name: name.into(),
            bone_index,
            keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_constant_and_full() {
        let keys = TrackKeys {
            positions: vec![Vec3::ZERO; 5],
            rotations: vec![Quat::IDENTITY],
            scales: vec![Vec3::ONE; 5],
        };
        assert!(keys.validate("t", 5).is_ok());
        assert!(matches!(
            keys.validate("t", 4),
            Err(ModelError::KeyCountMismatch { component: "positions", .. })
        ));
    }

    #[test]
    fn resize_pads_with_last_and_keeps_constants() {
        let mut keys = TrackKeys {
            positions: vec![Vec3::ZERO, Vec3::X],
            rotations: vec![Quat::IDENTITY],
            scales: vec![Vec3::ONE, Vec3::ONE],
        };
        keys.resize_frames(4);
        assert_eq!(keys.positions, vec![Vec3::ZERO, Vec3::X, Vec3::X, Vec3::X]);
        assert_eq!(keys.rotations.len(), 1);
        keys.expand_to(4);
        assert_eq!(keys.rotations.len(), 4);
    }
}
