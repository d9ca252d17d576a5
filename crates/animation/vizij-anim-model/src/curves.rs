//! Animation curves: rich float keys and composite transform curves.
//!
//! Model:
//! - A `RichCurve` holds keys ordered by time (seconds). Each key chooses how the
//!   segment leaving it is interpolated: constant (hold), linear, or cubic Hermite
//!   using the key's leave tangent and the next key's arrive tangent.
//! - Outside the key range the curve holds the first/last value.
//! - A `TransformCurve` is nine float channels (translation xyz, rotation euler
//!   degrees xyz, scale xyz) evaluated into a `Transform`.

use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::ids::CurveId;
use crate::math::{lerp_f32, Transform};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyInterp {
    Constant,
    #[default]
    Linear,
    Cubic,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RichCurveKey {
    pub time: f32,
    pub value: f32,
    #[serde(default, rename = "arriveTangent")]
    pub arrive_tangent: f32,
    #[serde(default, rename = "leaveTangent")]
    pub leave_tangent: f32,
    #[serde(default)]
    pub interp: KeyInterp,
}

impl RichCurveKey {
    pub fn linear(time: f32, value: f32) -> Self {
        Self {
            time,
            value,
            arrive_tangent: 0.0,
            leave_tangent: 0.0,
            interp: KeyInterp::Linear,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RichCurve {
    pub keys: Vec<RichCurveKey>,
}

impl RichCurve {
    pub fn new(keys: Vec<RichCurveKey>) -> Self {
        Self { keys }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys must be finite and ordered by non-decreasing time.
    pub fn validate(&self, name: &str) -> Result<(), ModelError> {
        let mut last = f32::NEG_INFINITY;
        for key in &self.keys {
            if !key.time.is_finite()
                || !key.value.is_finite()
                || !key.arrive_tangent.is_finite()
                || !key.leave_tangent.is_finite()
            {
                return Err(ModelError::InvalidCurveKeys {
                    name: name.to_string(),
                    reason: "non-finite key data".into(),
                });
            }
            if key.time < last {
                return Err(ModelError::InvalidCurveKeys {
                    name: name.to_string(),
                    reason: format!("key time {} precedes {}", key.time, last),
                });
            }
            last = key.time;
        }
        Ok(())
    }

    /// Evaluate at `time` seconds; `default` when the curve has no keys.
    pub fn evaluate(&self, time: f32, default: f32) -> f32 {
        let keys = &self.keys;
        let n = keys.len();
        match n {
            0 => default,
            1 => keys[0].value,
            _ => {
                if time <= keys[0].time {
                    return keys[0].value;
                }
                if time >= keys[n - 1].time {
                    return keys[n - 1].value;
                }
                // first key strictly after `time`; keys[i - 1] <= time < keys[i]
                let i = keys.partition_point(|k| k.time <= time);
                let left = &keys[i - 1];
                let right = &keys[i];
                let dt = right.time - left.time;
                if dt <= f32::EPSILON {
                    return right.value;
                }
                let u = (time - left.time) / dt;
                match left.interp {
                    KeyInterp::Constant => left.value,
                    KeyInterp::Linear => lerp_f32(left.value, right.value, u),
                    KeyInterp::Cubic => hermite(
                        left.value,
                        left.leave_tangent * dt,
                        right.value,
                        right.arrive_tangent * dt,
                        u,
                    ),
                }
            }
        }
    }

    /// Rescale key times about `origin` by `factor`; tangents are adjusted so the
    /// curve keeps its shape.
    pub fn scale_time(&mut self, origin: f32, factor: f32) {
        for key in &mut self.keys {
            key.time = origin + (key.time - origin) * factor;
            key.arrive_tangent /= factor;
            key.leave_tangent /= factor;
        }
    }

    /// Drop keys after `length` seconds (used when a sequence shrinks).
    pub fn truncate_after(&mut self, length: f32) {
        self.keys.retain(|k| k.time <= length + 1.0e-4);
    }

    /// True when every key value is within `tolerance` of zero.
    pub fn is_zero(&self, tolerance: f32) -> bool {
        self.keys.iter().all(|k| k.value.abs() <= tolerance)
    }
}

#[inline]
fn hermite(p0: f32, m0: f32, p1: f32, m1: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    (2.0 * t3 - 3.0 * t2 + 1.0) * p0
        + (t3 - 2.0 * t2 + t) * m0
        + (-2.0 * t3 + 3.0 * t2) * p1
        + (t3 - t2) * m1
}

/// Nine float channels driving a bone transform. Rotation channels are euler degrees.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformCurve {
    #[serde(default)]
    pub translation: [RichCurve; 3],
    #[serde(default)]
    pub rotation: [RichCurve; 3],
    #[serde(default)]
    pub scale: [RichCurve; 3],
}

impl TransformCurve {
    pub fn channels(&self) -> impl Iterator<Item = &RichCurve> {
        self.translation
            .iter()
            .chain(self.rotation.iter())
            .chain(self.scale.iter())
    }

    fn channels_mut(&mut self) -> impl Iterator<Item = &mut RichCurve> {
        self.translation
            .iter_mut()
            .chain(self.rotation.iter_mut())
            .chain(self.scale.iter_mut())
    }

    pub fn evaluate(&self, time: f32) -> Transform {
        let t = Vec3::new(
            self.translation[0].evaluate(time, 0.0),
            self.translation[1].evaluate(time, 0.0),
            self.translation[2].evaluate(time, 0.0),
        );
        let r = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation[0].evaluate(time, 0.0).to_radians(),
            self.rotation[1].evaluate(time, 0.0).to_radians(),
            self.rotation[2].evaluate(time, 0.0).to_radians(),
        );
        let s = Vec3::new(
            self.scale[0].evaluate(time, 1.0),
            self.scale[1].evaluate(time, 1.0),
            self.scale[2].evaluate(time, 1.0),
        );
        Transform::new(t, r, s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveKind {
    Float,
    Transform,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum CurveData {
    Float(RichCurve),
    Transform(TransformCurve),
}

impl CurveData {
    pub fn kind(&self) -> CurveKind {
        match self {
            CurveData::Float(_) => CurveKind::Float,
            CurveData::Transform(_) => CurveKind::Transform,
        }
    }

    pub fn empty(kind: CurveKind) -> Self {
        match kind {
            CurveKind::Float => CurveData::Float(RichCurve::default()),
            CurveKind::Transform => CurveData::Transform(TransformCurve::default()),
        }
    }

    pub fn validate(&self, name: &str) -> Result<(), ModelError> {
        match self {
            CurveData::Float(c) => c.validate(name),
            CurveData::Transform(tc) => tc.channels().try_for_each(|c| c.validate(name)),
        }
    }

    pub fn scale_time(&mut self, origin: f32, factor: f32) {
        match self {
            CurveData::Float(c) => c.scale_time(origin, factor),
            CurveData::Transform(tc) => tc.channels_mut().for_each(|c| c.scale_time(origin, factor)),
        }
    }

    pub fn truncate_after(&mut self, length: f32) {
        match self {
            CurveData::Float(c) => c.truncate_after(length),
            CurveData::Transform(tc) => tc.channels_mut().for_each(|c| c.truncate_after(length)),
        }
    }
}

/// A named curve owned by the data model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimCurve {
    pub id: CurveId,
    pub name: String,
    /// Editor display color; cosmetic, never affects compressed output.
    pub color: [f32; 4],
    pub data: CurveData,
}

impl AnimCurve {
    pub const DEFAULT_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

    pub fn kind(&self) -> CurveKind {
        self.data.kind()
    }

    pub fn as_float(&self) -> Option<&RichCurve> {
        match &self.data {
            CurveData::Float(c) => Some(c),
            CurveData::Transform(_) => None,
        }
    }

    pub fn as_transform(&self) -> Option<&TransformCurve> {
        match &self.data {
            CurveData::Transform(tc) => Some(tc),
            CurveData::Float(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
    }

    #[test]
    fn evaluates_linear_constant_and_holds() {
        let mut curve = RichCurve::new(vec![
            RichCurveKey::linear(0.0, 0.0),
            RichCurveKey::linear(1.0, 2.0),
            RichCurveKey {
                interp: KeyInterp::Constant,
                ..RichCurveKey::linear(2.0, 4.0)
            },
            RichCurveKey::linear(3.0, 0.0),
        ]);
        approx(curve.evaluate(0.5, 0.0), 1.0, 1e-6);
        approx(curve.evaluate(2.5, 0.0), 4.0, 1e-6);
        approx(curve.evaluate(-1.0, 0.0), 0.0, 1e-6);
        approx(curve.evaluate(10.0, 0.0), 0.0, 1e-6);

        curve.scale_time(0.0, 2.0);
        approx(curve.evaluate(1.0, 0.0), 1.0, 1e-6);
    }

    #[test]
    fn cubic_with_flat_tangents_eases() {
        let curve = RichCurve::new(vec![
            RichCurveKey {
                interp: KeyInterp::Cubic,
                ..RichCurveKey::linear(0.0, 0.0)
            },
            RichCurveKey::linear(1.0, 1.0),
        ]);
        approx(curve.evaluate(0.5, 0.0), 0.5, 1e-6);
        assert!(curve.evaluate(0.25, 0.0) < 0.25);
    }

    #[test]
    fn rejects_unordered_keys() {
        let curve = RichCurve::new(vec![RichCurveKey::linear(1.0, 0.0), RichCurveKey::linear(0.5, 0.0)]);
        assert!(curve.validate("c").is_err());
    }

    #[test]
    fn empty_transform_curve_is_identity() {
        let tc = TransformCurve::default();
        assert!(tc.evaluate(0.3).is_identity(1e-6));
    }
}
