//! Error types for model edits and skeleton construction.

use crate::ids::CurveId;

/// Every rejected edit maps to one of these; a rejected edit leaves the model untouched.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ModelError {
    #[error("invalid frame rate: {rate}")]
    InvalidFrameRate { rate: f64 },

    #[error("invalid play length: {length}")]
    InvalidPlayLength { length: f64 },

    #[error("invalid number of keys: {num_keys} (must be >= 1)")]
    InvalidNumKeys { num_keys: usize },

    #[error("track '{track}' {component} has {got} keys, expected 1 or {expected}")]
    KeyCountMismatch {
        track: String,
        component: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("track '{track}' contains non-finite key data")]
    NonFiniteKeys { track: String },

    #[error("bone '{name}' does not exist in skeleton '{skeleton}'")]
    UnknownBone { name: String, skeleton: String },

    #[error("bone track '{name}' already exists")]
    DuplicateTrack { name: String },

    #[error("bone track '{name}' not found")]
    TrackNotFound { name: String },

    #[error("curve {id:?} not found")]
    CurveNotFound { id: CurveId },

    #[error("curve '{name}' already exists")]
    DuplicateCurve { name: String },

    #[error("curve {id:?} is not a {expected} curve")]
    WrongCurveKind { id: CurveId, expected: &'static str },

    #[error("invalid curve keys for '{name}': {reason}")]
    InvalidCurveKeys { name: String, reason: String },

    #[error("invalid curve scale factor: {factor}")]
    InvalidScaleFactor { factor: f32 },

    #[error("identifier must not be empty")]
    EmptyName,

    #[error("close_bracket called with no open bracket")]
    BracketNotOpen,

    #[error("invalid skeleton: {reason}")]
    InvalidSkeleton { reason: String },

    #[error("parse error: {reason}")]
    Parse { reason: String },
}
