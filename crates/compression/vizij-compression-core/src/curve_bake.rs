//! Bakes transform curves and virtual bones into bone tracks.
//!
//! A transform curve named after a bone layers on top of that bone's local
//! transform: at each key the curve is evaluated and composed as
//! `curve.then(local)`. Virtual bones get a synthesized track holding the target
//! bone's component-space transform relative to the source bone's.

use vizij_anim_model::{
    AnimCurve, BoneIndex, BoneTrack, CurveData, Skeleton, Timing, TrackKeys, Transform,
};

use crate::compressible::NamedCurve;

#[derive(Clone, Debug)]
pub struct BakedCurves {
    pub tracks: Vec<BoneTrack>,
    /// Float curves, passed through untouched.
    pub float_curves: Vec<NamedCurve>,
}

pub fn bake_curves(
    skeleton: &Skeleton,
    tracks: &[BoneTrack],
    curves: &[AnimCurve],
    timing: Timing,
) -> BakedCurves {
    let num_keys = timing.num_keys;
    let mut out = tracks.to_vec();
    let mut float_curves = Vec::new();

    for curve in curves {
        let tc = match &curve.data {
            CurveData::Float(rich) => {
                float_curves.push(NamedCurve {
                    id: curve.id,
                    name: curve.name.clone(),
                    curve: rich.clone(),
                });
                continue;
            }
            CurveData::Transform(tc) => tc,
        };
        let Some(bone) = skeleton.find_bone(&curve.name) else {
            log::warn!(
                "transform curve '{}' names no bone in skeleton '{}'; skipped",
                curve.name,
                skeleton.name()
            );
            continue;
        };
        let idx = match out.iter().position(|t| t.bone_index == bone) {
            Some(idx) => idx,
            None => {
                let ref_pose = skeleton.ref_pose(bone).unwrap_or_default();
                out.push(BoneTrack::new(
                    curve.name.clone(),
                    bone,
                    TrackKeys::constant(ref_pose),
                ));
                out.len() - 1
            }
        };
        let keys = &mut out[idx].keys;
        keys.expand_to(num_keys);
        let local: Vec<Transform> = (0..num_keys).map(|i| keys.key(i)).collect();
        let baked: Vec<Transform> = local
            .iter()
            .enumerate()
            .map(|(i, l)| {
                let time = timing.frame_rate.time_of_key(i) as f32;
                tc.evaluate(time).then(l)
            })
            .collect();
        *keys = TrackKeys::from_transforms(&baked);
    }

    if !skeleton.virtual_bones().is_empty() {
        bake_virtual_bones(skeleton, &mut out, num_keys);
    }

    BakedCurves {
        tracks: out,
        float_curves,
    }
}

fn bake_virtual_bones(skeleton: &Skeleton, tracks: &mut Vec<BoneTrack>, num_keys: usize) {
    let num_bones = skeleton.num_bones();
    let mut per_bone: Vec<Option<&TrackKeys>> = vec![None; num_bones];
    for track in tracks.iter() {
        if let Some(slot) = per_bone.get_mut(track.bone_index.as_usize()) {
            *slot = Some(&track.keys);
        }
    }

    let ref_locals = skeleton.ref_pose_locals();
    let mut frames: Vec<Vec<Transform>> = vec![Vec::with_capacity(num_keys); skeleton.virtual_bones().len()];
    for i in 0..num_keys {
        let locals: Vec<Transform> = ref_locals
            .iter()
            .zip(per_bone.iter())
            .map(|(r, keys)| keys.map(|k| k.key(i)).unwrap_or(*r))
            .collect();
        let cs = skeleton.component_space(&locals);
        for (vb, out) in skeleton.virtual_bones().iter().zip(frames.iter_mut()) {
            let source = cs[vb.source.as_usize()];
            let target = cs[vb.target.as_usize()];
            out.push(target.relative_to(&source));
        }
    }

    for (v, (vb, keys)) in skeleton.virtual_bones().iter().zip(frames).enumerate() {
        let index: BoneIndex = skeleton.virtual_bone_index(v);
        tracks.retain(|t| t.bone_index != index);
        tracks.push(BoneTrack::new(
            vb.name.clone(),
            index,
            TrackKeys::from_transforms(&keys),
        ));
    }
}
