//! Controller: the only way to mutate a [`DataModel`].
//!
//! Every operation validates first and returns an error without touching the model
//! when validation fails. A successful operation records one notification (two when
//! a frame-rate change also changes the key count) and runs inside its own bracket,
//! so outside any user bracket it flushes immediately.

use crate::curves::{AnimCurve, CurveData, CurveKind, RichCurve, RichCurveKey, TransformCurve};
use crate::error::ModelError;
use crate::ids::{BoneIndex, CurveId};
use crate::model::DataModel;
use crate::notify::ModelNotification;
use crate::sampling::{resample_keys, Interpolation};
use crate::stored::SequenceDesc;
use crate::timing::{validate_play_length, FrameRate, Timing};
use crate::track::{BoneTrack, TrackKeys};

pub struct Controller<'a> {
    model: &'a mut DataModel,
}

type Notes = Vec<ModelNotification>;

impl<'a> Controller<'a> {
    pub(crate) fn new(model: &'a mut DataModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &DataModel {
        self.model
    }

    // ----- brackets -----

    /// Open a bracket. Edits made until the matching close are delivered as one change set.
    pub fn open_bracket(&mut self, description: &str) {
        self.model.open_bracket(description);
    }

    pub fn close_bracket(&mut self) -> Result<(), ModelError> {
        self.model.close_bracket()
    }

    /// Run `f` inside a bracket, closing it whether or not `f` succeeds.
    pub fn bracket<R>(
        &mut self,
        description: &str,
        f: impl FnOnce(&mut Controller<'_>) -> Result<R, ModelError>,
    ) -> Result<R, ModelError> {
        self.open_bracket(description);
        let result = f(self);
        self.close_bracket()?;
        result
    }

    /// Validate and apply one edit inside an implicit bracket. `op` must not mutate the
    /// model before it has finished validating.
    fn edit<R>(
        &mut self,
        description: &str,
        op: impl FnOnce(&mut DataModel, &mut Notes) -> Result<R, ModelError>,
    ) -> Result<R, ModelError> {
        let mut notes = Notes::new();
        let out = op(self.model, &mut notes)?;
        self.model.open_bracket(description);
        for note in notes {
            self.model.record(note);
        }
        self.model.close_bracket()?;
        Ok(out)
    }

    // ----- bone tracks -----

    /// Add a track for the bone called `name`, initialised to the bone's reference pose.
    pub fn add_bone_track(&mut self, name: &str) -> Result<BoneIndex, ModelError> {
        self.edit("add bone track", |m, notes| {
            let bone = resolve_bone(m, name)?;
            if m.track_index(name).is_some() {
                return Err(ModelError::DuplicateTrack {
                    name: name.to_string(),
                });
            }
            let ref_pose = m.skeleton.ref_pose(bone).unwrap_or_default();
            m.tracks
                .push(BoneTrack::new(name, bone, TrackKeys::constant(ref_pose)));
            m.mark_dirty();
            notes.push(ModelNotification::TrackAdded {
                name: name.to_string(),
                bone,
            });
            Ok(bone)
        })
    }

    pub fn remove_bone_track(&mut self, name: &str) -> Result<(), ModelError> {
        self.edit("remove bone track", |m, notes| {
            let idx = existing_track(m, name)?;
            m.tracks.remove(idx);
            m.mark_dirty();
            notes.push(ModelNotification::TrackRemoved {
                name: name.to_string(),
            });
            Ok(())
        })
    }

    /// Retarget a track to another bone of the same skeleton.
    pub fn rename_bone_track(&mut self, old_name: &str, new_name: &str) -> Result<(), ModelError> {
        self.edit("rename bone track", |m, notes| {
            let idx = existing_track(m, old_name)?;
            let bone = resolve_bone(m, new_name)?;
            if old_name != new_name && m.track_index(new_name).is_some() {
                return Err(ModelError::DuplicateTrack {
                    name: new_name.to_string(),
                });
            }
            let track = &mut m.tracks[idx];
            track.name = new_name.to_string();
            track.bone_index = bone;
            m.mark_dirty();
            notes.push(ModelNotification::TrackRenamed {
                old_name: old_name.to_string(),
                new_name: new_name.to_string(),
            });
            Ok(())
        })
    }

    /// Replace a track's keys. Each component must hold 1 or `NumKeys` keys.
    pub fn set_bone_track_keys(&mut self, name: &str, keys: TrackKeys) -> Result<(), ModelError> {
        self.edit("set bone track keys", |m, notes| {
            let idx = existing_track(m, name)?;
            keys.validate(name, m.effective_timing().num_keys)?;
            m.tracks[idx].keys = keys;
            m.mark_dirty();
            notes.push(ModelNotification::TrackKeysChanged {
                name: name.to_string(),
            });
            Ok(())
        })
    }

    pub fn remove_all_bone_tracks(&mut self) -> Result<(), ModelError> {
        self.edit("remove all bone tracks", |m, notes| {
            let count = m.tracks.len();
            m.tracks.clear();
            m.mark_dirty();
            notes.push(ModelNotification::AllTracksRemoved { count });
            Ok(())
        })
    }

    // ----- curves -----

    /// Add an empty curve. Its id comes from the skeleton's curve-name registry.
    pub fn add_curve(&mut self, name: &str, kind: CurveKind) -> Result<CurveId, ModelError> {
        self.edit("add curve", |m, notes| {
            if name.is_empty() {
                return Err(ModelError::EmptyName);
            }
            if m.curve_by_name(name).is_some() {
                return Err(ModelError::DuplicateCurve {
                    name: name.to_string(),
                });
            }
            let id = m.skeleton.resolve_curve(name);
            if m.curve_index(id).is_some() {
                return Err(ModelError::DuplicateCurve {
                    name: name.to_string(),
                });
            }
            m.curves.push(AnimCurve {
                id,
                name: name.to_string(),
                color: AnimCurve::DEFAULT_COLOR,
                data: CurveData::empty(kind),
            });
            notes.push(ModelNotification::CurveAdded {
                id,
                name: name.to_string(),
                kind,
            });
            Ok(id)
        })
    }

    pub fn remove_curve(&mut self, id: CurveId) -> Result<(), ModelError> {
        self.edit("remove curve", |m, notes| {
            let idx = existing_curve(m, id)?;
            m.curves.remove(idx);
            notes.push(ModelNotification::CurveRemoved { id });
            Ok(())
        })
    }

    /// Rename a curve; the curve takes the id registered for `new_name`.
    pub fn rename_curve(&mut self, id: CurveId, new_name: &str) -> Result<CurveId, ModelError> {
        self.edit("rename curve", |m, notes| {
            let idx = existing_curve(m, id)?;
            if new_name.is_empty() {
                return Err(ModelError::EmptyName);
            }
            let registered = m.skeleton.find_curve(new_name);
            let taken = m
                .curves
                .iter()
                .enumerate()
                .any(|(i, c)| i != idx && (c.name == new_name || Some(c.id) == registered));
            if taken {
                return Err(ModelError::DuplicateCurve {
                    name: new_name.to_string(),
                });
            }
            let new_id = m.skeleton.resolve_curve(new_name);
            let curve = &mut m.curves[idx];
            curve.id = new_id;
            curve.name = new_name.to_string();
            notes.push(ModelNotification::CurveRenamed {
                old_id: id,
                new_id,
                new_name: new_name.to_string(),
            });
            Ok(new_id)
        })
    }

    /// Replace the keys of a float curve.
    pub fn set_curve_keys(&mut self, id: CurveId, keys: Vec<RichCurveKey>) -> Result<(), ModelError> {
        self.edit("set curve keys", |m, notes| {
            let idx = existing_curve(m, id)?;
            if m.curves[idx].kind() != CurveKind::Float {
                return Err(ModelError::WrongCurveKind {
                    id,
                    expected: "float",
                });
            }
            let curve = RichCurve::new(keys);
            curve.validate(&m.curves[idx].name)?;
            *m.curve_data_mut(idx) = CurveData::Float(curve);
            notes.push(ModelNotification::CurveKeysChanged { id });
            Ok(())
        })
    }

    /// Replace the channels of a transform curve.
    pub fn set_transform_curve_keys(
        &mut self,
        id: CurveId,
        curve: TransformCurve,
    ) -> Result<(), ModelError> {
        self.edit("set transform curve keys", |m, notes| {
            let idx = existing_curve(m, id)?;
            if m.curves[idx].kind() != CurveKind::Transform {
                return Err(ModelError::WrongCurveKind {
                    id,
                    expected: "transform",
                });
            }
            let data = CurveData::Transform(curve);
            data.validate(&m.curves[idx].name)?;
            *m.curve_data_mut(idx) = data;
            notes.push(ModelNotification::CurveKeysChanged { id });
            Ok(())
        })
    }

    /// Rescale a curve's key times about `origin`.
    pub fn scale_curve(&mut self, id: CurveId, origin: f32, factor: f32) -> Result<(), ModelError> {
        self.edit("scale curve", |m, notes| {
            let idx = existing_curve(m, id)?;
            if !factor.is_finite() || factor <= 0.0 || !origin.is_finite() {
                return Err(ModelError::InvalidScaleFactor { factor });
            }
            m.curve_data_mut(idx).scale_time(origin, factor);
            notes.push(ModelNotification::CurveScaled { id, origin, factor });
            Ok(())
        })
    }

    /// Editor display color. Does not require recompression.
    pub fn set_curve_color(&mut self, id: CurveId, color: [f32; 4]) -> Result<(), ModelError> {
        self.edit("set curve color", |m, notes| {
            let idx = existing_curve(m, id)?;
            m.curves[idx].color = color;
            notes.push(ModelNotification::CurveColorChanged { id });
            Ok(())
        })
    }

    // ----- timing -----

    /// Change the frame rate keeping the play length; animated track components are
    /// resampled to the new key count. Curves are time-keyed and stay as they are.
    pub fn set_frame_rate(&mut self, rate: f64) -> Result<(), ModelError> {
        self.edit("set frame rate", |m, notes| {
            let new_rate = FrameRate::new(rate)?;
            let current = m.effective_timing();
            let new_timing = Timing::new(new_rate, new_rate.num_keys_for(current.play_length()))?;
            for track in m.tracks.iter_mut() {
                track.keys = resample_keys(
                    &track.keys,
                    current.frame_rate.as_f64(),
                    new_rate.as_f64(),
                    new_timing.num_keys,
                    Interpolation::Linear,
                );
            }
            m.mark_dirty();
            m.pending_timing = Some(new_timing);
            notes.push(ModelNotification::FrameRateChanged {
                old_rate: current.frame_rate.as_f64(),
                new_rate: new_rate.as_f64(),
            });
            if new_timing.num_keys != current.num_keys {
                notes.push(ModelNotification::NumKeysChanged {
                    old_num_keys: current.num_keys,
                    new_num_keys: new_timing.num_keys,
                });
            }
            Ok(())
        })
    }

    /// Change the play length in seconds; equivalent to resizing the key count to
    /// `round(frame_rate * length) + 1`.
    pub fn resize_play_length(&mut self, length: f64) -> Result<(), ModelError> {
        validate_play_length(length)?;
        let num_keys = self
            .model
            .effective_timing()
            .frame_rate
            .num_keys_for(length);
        self.resize_number_of_keys(num_keys)
    }

    /// Change the key count. Animated components are padded with their last key or
    /// truncated; when shrinking, curve keys past the new end are dropped.
    pub fn resize_number_of_keys(&mut self, num_keys: usize) -> Result<(), ModelError> {
        self.edit("resize number of keys", |m, notes| {
            let current = m.effective_timing();
            let new_timing = Timing::new(current.frame_rate, num_keys)?;
            for track in m.tracks.iter_mut() {
                track.keys.resize_frames(num_keys);
            }
            if num_keys < current.num_keys {
                let length = new_timing.play_length() as f32;
                for idx in 0..m.curves.len() {
                    m.curve_data_mut(idx).truncate_after(length);
                }
            }
            m.mark_dirty();
            m.pending_timing = Some(new_timing);
            notes.push(ModelNotification::NumKeysChanged {
                old_num_keys: current.num_keys,
                new_num_keys: num_keys,
            });
            Ok(())
        })
    }

    // ----- bulk -----

    /// Replace all content with a sequence description.
    pub fn populate(&mut self, desc: &SequenceDesc) -> Result<(), ModelError> {
        self.edit("populate", |m, notes| {
            let (timing, tracks, curves) = desc.resolve(&m.skeleton)?;
            notes.push(ModelNotification::Populated {
                tracks: tracks.len(),
                curves: curves.len(),
            });
            m.pending_timing = Some(timing);
            m.tracks = tracks;
            m.curves = curves;
            m.mark_dirty();
            Ok(())
        })
    }
}

fn resolve_bone(m: &DataModel, name: &str) -> Result<BoneIndex, ModelError> {
    if name.is_empty() {
        return Err(ModelError::EmptyName);
    }
    m.skeleton
        .find_bone(name)
        .ok_or_else(|| ModelError::UnknownBone {
            name: name.to_string(),
            skeleton: m.skeleton.name().to_string(),
        })
}

fn existing_track(m: &DataModel, name: &str) -> Result<usize, ModelError> {
    m.track_index(name).ok_or_else(|| ModelError::TrackNotFound {
        name: name.to_string(),
    })
}

fn existing_curve(m: &DataModel, id: CurveId) -> Result<usize, ModelError> {
    m.curve_index(id).ok_or(ModelError::CurveNotFound { id })
}
