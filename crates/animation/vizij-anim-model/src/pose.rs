//! Pose evaluation interface used by consumers that sample a model at arbitrary times
//! (additive bases, previews).

use std::sync::Arc;

use crate::curves::CurveData;
use crate::ids::{BoneIndex, CurveId};
use crate::math::Transform;
use crate::model::DataModel;
use crate::sampling::{sample_keys, Interpolation};
use crate::skeleton::Skeleton;
use crate::timing::FrameRate;

pub trait PoseSource {
    fn skeleton(&self) -> &Arc<Skeleton>;

    fn frame_rate(&self) -> FrameRate;

    fn num_keys(&self) -> usize;

    fn play_length(&self) -> f64 {
        self.frame_rate().play_length_for(self.num_keys())
    }

    /// Local transform of every real bone at `time` seconds (clamped to the sequence).
    /// Bones without a track hold their reference pose.
    fn evaluate_local_pose(&self, time: f64, interp: Interpolation) -> Vec<Transform>;

    /// Value of float curve `id` at `time` seconds; `None` if the curve does not exist.
    fn evaluate_curve(&self, id: CurveId, time: f32) -> Option<f32>;
}

impl PoseSource for DataModel {
    fn skeleton(&self) -> &Arc<Skeleton> {
        DataModel::skeleton(self)
    }

    fn frame_rate(&self) -> FrameRate {
        DataModel::frame_rate(self)
    }

    fn num_keys(&self) -> usize {
        DataModel::num_keys(self)
    }

    fn evaluate_local_pose(&self, time: f64, interp: Interpolation) -> Vec<Transform> {
        let skeleton = DataModel::skeleton(self);
        let time = time.clamp(0.0, PoseSource::play_length(self));
        let position = DataModel::frame_rate(self).key_at_time(time);
        let mut locals = skeleton.ref_pose_locals();
        for (idx, local) in locals.iter_mut().enumerate() {
            if let Some(track) = self.track_for_bone(BoneIndex(idx as u32)) {
                *local = sample_keys(&track.keys, position, interp);
            }
        }
        // transform curves layer on top of the bone's local transform
        for curve in self.curves() {
            if let CurveData::Transform(tc) = &curve.data {
                if let Some(bone) = skeleton.find_bone(&curve.name) {
                    let local = &mut locals[bone.as_usize()];
                    *local = tc.evaluate(time as f32).then(local);
                }
            }
        }
        locals
    }

    fn evaluate_curve(&self, id: CurveId, time: f32) -> Option<f32> {
        self.curve(id)
            .and_then(|c| c.as_float())
            .map(|c| c.evaluate(time, 0.0))
    }
}
