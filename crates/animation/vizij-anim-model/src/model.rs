//! The animation data model: raw tracks and curves for one sequence.
//!
//! All mutation goes through [`Controller`](crate::controller::Controller). Mutations
//! run inside brackets; the model keeps a depth counter and the notifications
//! accumulated since the outermost bracket opened. When depth returns to zero the
//! pending frame rate / key count is committed, derived lookup views are rebuilt and
//! a single `ContentChanged` event is emitted.
//!
//! Queries (`frame_rate`, `num_keys`, `play_length`) report the committed timing;
//! changes made inside an open bracket become visible when it closes.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::controller::Controller;
use crate::curves::{AnimCurve, CurveData};
use crate::error::ModelError;
use crate::ids::{BoneIndex, CurveId};
use crate::notify::{ChangeSet, ModelEvent, ModelNotification};
use crate::skeleton::Skeleton;
use crate::stored::SequenceDesc;
use crate::timing::{FrameRate, Timing};
use crate::track::BoneTrack;

/// Handle returned by [`DataModel::subscribe`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&ModelEvent) + Send>;

pub struct DataModel {
    pub(crate) name: String,
    pub(crate) skeleton: Arc<Skeleton>,
    pub(crate) timing: Timing,
    pub(crate) pending_timing: Option<Timing>,
    pub(crate) tracks: Vec<BoneTrack>,
    pub(crate) curves: Vec<AnimCurve>,

    // derived views, rebuilt at each flush
    track_by_name: HashMap<String, usize>,
    track_by_bone: HashMap<BoneIndex, usize>,
    views_dirty: bool,

    bracket_depth: u32,
    pending: Vec<ModelNotification>,
    content_generation: u64,
    events: Vec<ModelEvent>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl fmt::Debug for DataModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataModel")
            .field("name", &self.name)
            .field("skeleton", &self.skeleton.name())
            .field("timing", &self.timing)
            .field("pending_timing", &self.pending_timing)
            .field("tracks", &self.tracks.len())
            .field("curves", &self.curves.len())
            .field("bracket_depth", &self.bracket_depth)
            .field("content_generation", &self.content_generation)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl DataModel {
    /// Empty model: no tracks, no curves, `play_length` seconds at `frame_rate`.
    pub fn new(
        name: impl Into<String>,
        skeleton: Arc<Skeleton>,
        frame_rate: FrameRate,
        play_length: f64,
    ) -> Result<Self, ModelError> {
        let timing = Timing::from_play_length(frame_rate, play_length)?;
        let mut model = Self {
            name: name.into(),
            skeleton,
            timing,
            pending_timing: None,
            tracks: Vec::new(),
            curves: Vec::new(),
            track_by_name: HashMap::new(),
            track_by_bone: HashMap::new(),
            views_dirty: true,
            bracket_depth: 0,
            pending: Vec::new(),
            content_generation: 0,
            events: Vec::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
        };
        model.regenerate_views();
        Ok(model)
    }

    /// Build a model from a sequence description. No events are emitted.
    pub fn from_sequence(skeleton: Arc<Skeleton>, desc: &SequenceDesc) -> Result<Self, ModelError> {
        let mut model = Self::new(desc.name.clone(), skeleton, FrameRate::default(), 0.0)?;
        let (timing, tracks, curves) = desc.resolve(&model.skeleton)?;
        model.timing = timing;
        model.tracks = tracks;
        model.curves = curves;
        model.regenerate_views();
        Ok(model)
    }

    pub fn controller(&mut self) -> Controller<'_> {
        Controller::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.timing.frame_rate
    }

    pub fn num_keys(&self) -> usize {
        self.timing.num_keys
    }

    pub fn play_length(&self) -> f64 {
        self.timing.play_length()
    }

    pub fn tracks(&self) -> &[BoneTrack] {
        &self.tracks
    }

    pub fn track(&self, name: &str) -> Option<&BoneTrack> {
        self.track_index(name).map(|i| &self.tracks[i])
    }

    pub fn track_for_bone(&self, bone: BoneIndex) -> Option<&BoneTrack> {
        if self.views_dirty {
            return self.tracks.iter().find(|t| t.bone_index == bone);
        }
        self.track_by_bone.get(&bone).map(|&i| &self.tracks[i])
    }

    pub fn curves(&self) -> &[AnimCurve] {
        &self.curves
    }

    pub fn curve(&self, id: CurveId) -> Option<&AnimCurve> {
        self.curves.iter().find(|c| c.id == id)
    }

    pub fn curve_by_name(&self, name: &str) -> Option<&AnimCurve> {
        self.curves.iter().find(|c| c.name == name)
    }

    #[inline]
    pub fn bracket_depth(&self) -> u32 {
        self.bracket_depth
    }

    #[inline]
    pub fn is_bracket_open(&self) -> bool {
        self.bracket_depth > 0
    }

    /// Incremented once per flush that carried a rebuild-requiring change.
    #[inline]
    pub fn content_generation(&self) -> u64 {
        self.content_generation
    }

    /// Total raw key payload in bytes (tracks only).
    pub fn raw_size_bytes(&self) -> usize {
        self.tracks.iter().map(|t| t.keys.raw_size_bytes()).sum()
    }

    /// Register a callback invoked for every emitted event.
    pub fn subscribe(&mut self, callback: impl FnMut(&ModelEvent) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Events queued since the last drain.
    pub fn events(&self) -> &[ModelEvent] {
        &self.events
    }

    /// Take every event queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.events)
    }

    // ----- crate-internal bracket machinery -----

    /// Timing that edits validate against: pending if a timing change is in flight.
    pub(crate) fn effective_timing(&self) -> Timing {
        self.pending_timing.unwrap_or(self.timing)
    }

    pub(crate) fn track_index(&self, name: &str) -> Option<usize> {
        if self.views_dirty {
            return self.tracks.iter().position(|t| t.name == name);
        }
        self.track_by_name.get(name).copied()
    }

    pub(crate) fn curve_index(&self, id: CurveId) -> Option<usize> {
        self.curves.iter().position(|c| c.id == id)
    }

    pub(crate) fn curve_data_mut(&mut self, idx: usize) -> &mut CurveData {
        self.views_dirty = true;
        &mut self.curves[idx].data
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.views_dirty = true;
    }

    pub(crate) fn open_bracket(&mut self, description: &str) {
        self.bracket_depth += 1;
        if self.bracket_depth == 1 {
            log::trace!("model '{}': bracket opened ({description})", self.name);
            self.emit(ModelEvent::BracketOpened {
                description: description.to_string(),
            });
        }
    }

    pub(crate) fn close_bracket(&mut self) -> Result<(), ModelError> {
        if self.bracket_depth == 0 {
            return Err(ModelError::BracketNotOpen);
        }
        self.bracket_depth -= 1;
        if self.bracket_depth == 0 {
            self.flush();
        }
        Ok(())
    }

    pub(crate) fn record(&mut self, notification: ModelNotification) {
        self.emit(ModelEvent::Notify(notification.clone()));
        self.pending.push(notification);
    }

    fn flush(&mut self) {
        if let Some(timing) = self.pending_timing.take() {
            self.timing = timing;
        }
        self.regenerate_views();
        self.emit(ModelEvent::BracketClosed);

        if self.pending.is_empty() {
            return;
        }
        let notifications = std::mem::take(&mut self.pending);
        let requires_rebuild = notifications.iter().any(ModelNotification::requires_rebuild);
        if requires_rebuild {
            self.content_generation += 1;
        }
        log::debug!(
            "model '{}': {} change(s) flushed, rebuild={} generation={}",
            self.name,
            notifications.len(),
            requires_rebuild,
            self.content_generation
        );
        self.emit(ModelEvent::ContentChanged(ChangeSet {
            notifications,
            requires_rebuild,
            generation: self.content_generation,
        }));
    }

    fn regenerate_views(&mut self) {
        self.track_by_name.clear();
        self.track_by_bone.clear();
        for (i, track) in self.tracks.iter().enumerate() {
            self.track_by_name.insert(track.name.clone(), i);
            self.track_by_bone.insert(track.bone_index, i);
        }
        self.views_dirty = false;
    }

    fn emit(&mut self, event: ModelEvent) {
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&event);
        }
        self.events.push(event);
    }
}
