//! Bone-space transform math on top of glam.
//!
//! - `Transform` is translation / rotation (unit quaternion) / non-uniform scale.
//! - `a.then(b)` applies `a` first and `b` second (child-local then parent).
//! - Quaternion blending is shortest-arc NLERP, matching the sampler.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Scale components smaller than this are treated as zero when inverting.
pub const SMALL_SCALE: f32 = 1.0e-8;

/// Default tolerance used when deciding whether a key carries any motion.
pub const IDENTITY_TOLERANCE: f32 = 1.0e-4;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[inline]
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    #[inline]
    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Apply `self`, then `parent`.
    #[inline]
    pub fn then(&self, parent: &Transform) -> Transform {
        Transform {
            translation: parent.rotation * (parent.scale * self.translation) + parent.translation,
            rotation: (parent.rotation * self.rotation).normalize(),
            scale: self.scale * parent.scale,
        }
    }

    /// Inverse using a safe scale reciprocal (near-zero scale axes invert to zero).
    #[inline]
    pub fn inverse(&self) -> Transform {
        let inv_rotation = self.rotation.inverse();
        let inv_scale = safe_scale_reciprocal(self.scale);
        Transform {
            translation: inv_rotation * (inv_scale * -self.translation),
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// `self` expressed relative to `other`, i.e. `self.then(other.inverse())`.
    #[inline]
    pub fn relative_to(&self, other: &Transform) -> Transform {
        self.then(&other.inverse())
    }

    /// Component-wise lerp with shortest-arc normalized quaternion lerp.
    #[inline]
    pub fn lerp(&self, other: &Transform, t: f32) -> Transform {
        Transform {
            translation: self.translation.lerp(other.translation, t),
            rotation: nlerp_quat(self.rotation, other.rotation, t),
            scale: self.scale.lerp(other.scale, t),
        }
    }

    pub fn is_identity(&self, tolerance: f32) -> bool {
        self.translation.abs_diff_eq(Vec3::ZERO, tolerance)
            && quat_is_identity(self.rotation, tolerance)
            && self.scale.abs_diff_eq(Vec3::ONE, tolerance)
    }

    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.is_finite() && self.scale.is_finite()
    }
}

/// Reciprocal of each scale axis, zero where the axis is (nearly) degenerate.
#[inline]
pub fn safe_scale_reciprocal(scale: Vec3) -> Vec3 {
    let recip = |v: f32| if v.abs() <= SMALL_SCALE { 0.0 } else { v.recip() };
    Vec3::new(recip(scale.x), recip(scale.y), recip(scale.z))
}

/// Quaternion NLERP with shortest-arc correction.
/// If dot < 0, negate the second quaternion to ensure the shortest path.
#[inline]
pub fn nlerp_quat(a: Quat, b: Quat, t: f32) -> Quat {
    let b = if a.dot(b) < 0.0 { -b } else { b };
    let q = a + (b - a) * t;
    let len2 = q.length_squared();
    if len2 > 0.0 {
        q * len2.sqrt().recip()
    } else {
        Quat::IDENTITY
    }
}

/// `q` and `-q` describe the same rotation, so both count as identity.
#[inline]
pub fn quat_is_identity(q: Quat, tolerance: f32) -> bool {
    q.abs_diff_eq(Quat::IDENTITY, tolerance) || q.abs_diff_eq(-Quat::IDENTITY, tolerance)
}

#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn then_inverse_round_trips() {
        let a = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(0.7),
            Vec3::splat(2.0),
        );
        let r = a.then(&a.inverse());
        assert!(r.is_identity(1e-5), "{r:?}");
    }

    #[test]
    fn relative_to_recovers_child() {
        let parent = Transform::new(Vec3::X, Quat::from_rotation_z(0.5), Vec3::ONE);
        let child = Transform::from_translation(Vec3::Y);
        let world = child.then(&parent);
        let back = world.relative_to(&parent);
        assert!(back.translation.abs_diff_eq(Vec3::Y, 1e-5));
        assert!(quat_is_identity(back.rotation, 1e-5));
    }

    #[test]
    fn nlerp_takes_short_arc() {
        let a = Quat::IDENTITY;
        let b = -Quat::from_rotation_x(0.2);
        let mid = nlerp_quat(a, b, 0.5);
        assert!((mid.length() - 1.0).abs() < 1e-6);
        assert!(mid.w > 0.0);
    }
}
