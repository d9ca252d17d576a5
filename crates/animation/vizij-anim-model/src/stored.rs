//! JSON import for skeletons and sequences.
//!
//! Sequence JSON shape:
//! ```json
//! {
//!   "name": "walk",
//!   "frameRate": 30,
//!   "numKeys": 31,
//!   "tracks": [{ "bone": "spine", "positions": [[0,1,0]], "rotations": [[0,0,0,1]], "scales": [] }],
//!   "curves": [{ "name": "blink", "type": "float", "keys": [{ "time": 0, "value": 0 }] }]
//! }
//! ```
//! Notes:
//! - Either `numKeys` or `playLength` (seconds) may be given; with neither the key count
//!   is taken from the longest track component.
//! - An empty track component falls back to the bone's reference pose (single key).
//! - Transform curves use `"type": "transform"` and a `transform` object with
//!   `translation`/`rotation`/`scale` arrays of three curves each.

use glam::{Quat, Vec3};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::curves::{AnimCurve, CurveData, CurveKind, RichCurve, RichCurveKey, TransformCurve};
use crate::error::ModelError;
use crate::skeleton::{Skeleton, SkeletonDesc};
use crate::timing::{validate_play_length, FrameRate, Timing};
use crate::track::{BoneTrack, TrackKeys};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrackDesc {
    pub bone: String,
    #[serde(default)]
    pub positions: Vec<Vec3>,
    #[serde(default)]
    pub rotations: Vec<Quat>,
    #[serde(default)]
    pub scales: Vec<Vec3>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CurveDesc {
    pub name: String,
    #[serde(rename = "type", default = "default_curve_kind")]
    pub kind: CurveKind,
    #[serde(default)]
    pub keys: Vec<RichCurveKey>,
    #[serde(default)]
    pub transform: Option<TransformCurve>,
    #[serde(default)]
    pub color: Option<[f32; 4]>,
}

fn default_curve_kind() -> CurveKind {
    CurveKind::Float
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SequenceDesc {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "frameRate")]
    pub frame_rate: f64,
    #[serde(default, rename = "numKeys")]
    pub num_keys: Option<usize>,
    #[serde(default, rename = "playLength")]
    pub play_length: Option<f64>,
    #[serde(default)]
    pub tracks: Vec<TrackDesc>,
    #[serde(default)]
    pub curves: Vec<CurveDesc>,
}

impl SequenceDesc {
    /// Validate against `skeleton` and convert into model content.
    /// Curve names are registered with the skeleton only once everything else validated.
    pub(crate) fn resolve(
        &self,
        skeleton: &Skeleton,
    ) -> Result<(Timing, Vec<BoneTrack>, Vec<AnimCurve>), ModelError> {
        let frame_rate = FrameRate::new(self.frame_rate)?;
        let timing = match (self.num_keys, self.play_length) {
            (Some(n), _) => Timing::new(frame_rate, n)?,
            (None, Some(len)) => {
                validate_play_length(len)?;
                Timing::from_play_length(frame_rate, len)?
            }
            (None, None) => {
                let longest = self
                    .tracks
                    .iter()
                    .map(|t| t.positions.len().max(t.rotations.len()).max(t.scales.len()))
                    .max()
                    .unwrap_or(1);
                Timing::new(frame_rate, longest.max(1))?
            }
        };

        let mut seen = HashSet::with_capacity(self.tracks.len());
        let mut tracks = Vec::with_capacity(self.tracks.len());
        for td in &self.tracks {
            let bone = skeleton
                .find_bone(&td.bone)
                .ok_or_else(|| ModelError::UnknownBone {
                    name: td.bone.clone(),
                    skeleton: skeleton.name().to_string(),
                })?;
            if !seen.insert(td.bone.as_str()) {
                return Err(ModelError::DuplicateTrack {
                    name: td.bone.clone(),
                });
            }
            let ref_pose = skeleton.ref_pose(bone).unwrap_or_default();
            let keys = TrackKeys {
                positions: or_constant(&td.positions, ref_pose.translation),
                rotations: or_constant(&td.rotations, ref_pose.rotation),
                scales: or_constant(&td.scales, ref_pose.scale),
            };
            keys.validate(&td.bone, timing.num_keys)?;
            tracks.push(BoneTrack::new(td.bone.clone(), bone, keys));
        }

        let mut curve_names = HashSet::with_capacity(self.curves.len());
        let mut curve_data = Vec::with_capacity(self.curves.len());
        for cd in &self.curves {
            if cd.name.is_empty() {
                return Err(ModelError::EmptyName);
            }
            if !curve_names.insert(cd.name.as_str()) {
                return Err(ModelError::DuplicateCurve {
                    name: cd.name.clone(),
                });
            }
            let data = match cd.kind {
                CurveKind::Float => CurveData::Float(RichCurve::new(cd.keys.clone())),
                CurveKind::Transform => {
                    CurveData::Transform(cd.transform.clone().unwrap_or_default())
                }
            };
            data.validate(&cd.name)?;
            curve_data.push((cd, data));
        }
        let curves = curve_data
            .into_iter()
            .map(|(cd, data)| AnimCurve {
                id: skeleton.resolve_curve(&cd.name),
                name: cd.name.clone(),
                color: cd.color.unwrap_or(AnimCurve::DEFAULT_COLOR),
                data,
            })
            .collect();

        Ok((timing, tracks, curves))
    }
}

fn or_constant<T: Copy>(keys: &[T], fallback: T) -> Vec<T> {
    if keys.is_empty() {
        vec![fallback]
    } else {
        keys.to_vec()
    }
}

/// Parse sequence JSON (shape documented at module level).
pub fn parse_sequence_json(s: &str) -> Result<SequenceDesc, ModelError> {
    serde_json::from_str(s).map_err(|e| ModelError::Parse {
        reason: e.to_string(),
    })
}

/// Parse and validate skeleton JSON.
pub fn parse_skeleton_json(s: &str) -> Result<Skeleton, ModelError> {
    let desc: SkeletonDesc = serde_json::from_str(s).map_err(|e| ModelError::Parse {
        reason: e.to_string(),
    })?;
    Skeleton::from_desc(desc)
}
