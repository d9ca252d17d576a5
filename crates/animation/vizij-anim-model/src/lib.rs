//! Vizij animation data model.
//!
//! Raw skeletal animation for one sequence: bone tracks (position / rotation / scale
//! keys on a uniform frame grid), float and transform curves, and the timing triple
//! (frame rate, key count, play length). Mutation goes through a [`Controller`];
//! edits are grouped into brackets and reported as coalesced change sets so
//! consumers know when compressed output must be rebuilt.

pub mod controller;
pub mod curves;
pub mod error;
pub mod ids;
pub mod math;
pub mod model;
pub mod notify;
pub mod pose;
pub mod sampling;
pub mod skeleton;
pub mod stored;
pub mod timing;
pub mod track;

pub use controller::Controller;
pub use curves::{AnimCurve, CurveData, CurveKind, KeyInterp, RichCurve, RichCurveKey, TransformCurve};
pub use error::ModelError;
pub use ids::{BoneIndex, CurveId};
pub use math::{Transform, IDENTITY_TOLERANCE};
pub use model::{DataModel, SubscriptionId};
pub use notify::{ChangeSet, ModelEvent, ModelNotification};
pub use pose::PoseSource;
pub use sampling::{resample_keys, resample_proportional, sample_keys, Interpolation};
pub use skeleton::{Bone, Skeleton, SkeletonDesc, VirtualBone, VirtualBoneDesc};
pub use stored::{parse_sequence_json, parse_skeleton_json, CurveDesc, SequenceDesc, TrackDesc};
pub use timing::{FrameRate, Timing};
pub use track::{BoneTrack, TrackKeys};
