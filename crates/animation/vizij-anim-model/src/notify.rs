//! Change notifications emitted by the data model.
//!
//! Each controller mutation produces one `ModelNotification`. Inside a bracket they
//! accumulate; when the outermost bracket closes the accumulated set is delivered
//! once as `ModelEvent::ContentChanged`.

use serde::{Deserialize, Serialize};

use crate::curves::CurveKind;
use crate::ids::{BoneIndex, CurveId};

/// One applied mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ModelNotification {
    TrackAdded {
        name: String,
        bone: BoneIndex,
    },
    TrackRemoved {
        name: String,
    },
    TrackRenamed {
        old_name: String,
        new_name: String,
    },
    TrackKeysChanged {
        name: String,
    },
    AllTracksRemoved {
        count: usize,
    },
    CurveAdded {
        id: CurveId,
        name: String,
        kind: CurveKind,
    },
    CurveRemoved {
        id: CurveId,
    },
    CurveRenamed {
        old_id: CurveId,
        new_id: CurveId,
        new_name: String,
    },
    CurveKeysChanged {
        id: CurveId,
    },
    CurveScaled {
        id: CurveId,
        origin: f32,
        factor: f32,
    },
    /// Display-only change; never requires recompression.
    CurveColorChanged {
        id: CurveId,
    },
    FrameRateChanged {
        old_rate: f64,
        new_rate: f64,
    },
    NumKeysChanged {
        old_num_keys: usize,
        new_num_keys: usize,
    },
    Populated {
        tracks: usize,
        curves: usize,
    },
}

impl ModelNotification {
    /// Whether this change invalidates compressed output.
    pub fn requires_rebuild(&self) -> bool {
        !matches!(self, ModelNotification::CurveColorChanged { .. })
    }
}

/// Coalesced result of one outermost bracket.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub notifications: Vec<ModelNotification>,
    pub requires_rebuild: bool,
    /// Content generation after this flush.
    pub generation: u64,
}

impl ChangeSet {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

/// Events observed by model subscribers, in emission order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ModelEvent {
    BracketOpened { description: String },
    Notify(ModelNotification),
    BracketClosed,
    ContentChanged(ChangeSet),
}
