//! Frame rate / play length / key count.
//!
//! `num_keys == round(frame_rate * play_length) + 1`; play length is always
//! derived from the other two.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Frames per second, finite and strictly positive once constructed through `new`.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameRate(f64);

impl FrameRate {
    pub const FPS_30: FrameRate = FrameRate(30.0);

    pub fn new(fps: f64) -> Result<Self, ModelError> {
        if fps.is_finite() && fps > 0.0 {
            Ok(Self(fps))
        } else {
            Err(ModelError::InvalidFrameRate { rate: fps })
        }
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }

    /// Key count covering `play_length` seconds, inclusive of both ends.
    #[inline]
    pub fn num_keys_for(self, play_length: f64) -> usize {
        (self.0 * play_length).round() as usize + 1
    }

    /// Length in seconds spanned by `num_keys` keys.
    #[inline]
    pub fn play_length_for(self, num_keys: usize) -> f64 {
        num_keys.saturating_sub(1) as f64 / self.0
    }

    #[inline]
    pub fn time_of_key(self, key: usize) -> f64 {
        key as f64 / self.0
    }

    /// Fractional key position of `time` seconds.
    #[inline]
    pub fn key_at_time(self, time: f64) -> f64 {
        time * self.0
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_30
    }
}

/// Committed or pending frame rate / key count pair.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub frame_rate: FrameRate,
    pub num_keys: usize,
}

impl Timing {
    pub fn new(frame_rate: FrameRate, num_keys: usize) -> Result<Self, ModelError> {
        if num_keys == 0 {
            return Err(ModelError::InvalidNumKeys { num_keys });
        }
        Ok(Self {
            frame_rate,
            num_keys,
        })
    }

    pub fn from_play_length(frame_rate: FrameRate, play_length: f64) -> Result<Self, ModelError> {
        validate_play_length(play_length)?;
        Ok(Self {
            frame_rate,
            num_keys: frame_rate.num_keys_for(play_length),
        })
    }

    #[inline]
    pub fn play_length(&self) -> f64 {
        self.frame_rate.play_length_for(self.num_keys)
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.num_keys.saturating_sub(1)
    }
}

pub fn validate_play_length(length: f64) -> Result<(), ModelError> {
    if length.is_finite() && length >= 0.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidPlayLength { length })
    }
}
