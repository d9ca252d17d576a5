//! Track resampling and frame stripping.

use vizij_anim_model::{
    resample_keys, resample_proportional, BoneTrack, FrameRate, Interpolation, TrackKeys,
};

use crate::error::BuildError;

/// Resample every track from `source_rate` to `target_rate` over `play_length` seconds.
///
/// Produces `round(target_rate * play_length) + 1` keys per animated component. Equal
/// rates return an exact copy. Single-key components are never resampled.
pub fn resample_tracks(
    tracks: &[BoneTrack],
    source_rate: FrameRate,
    play_length: f64,
    target_rate: f64,
    interpolation: Interpolation,
) -> Result<Vec<BoneTrack>, BuildError> {
    let target = FrameRate::new(target_rate).map_err(|_| BuildError::InvalidConfiguration {
        reason: format!("target frame rate {target_rate} must be finite and positive"),
    })?;
    if target.as_f64() == source_rate.as_f64() {
        return Ok(tracks.to_vec());
    }
    let num_keys = target.num_keys_for(play_length);
    log::debug!(
        "resampling {} track(s) {} -> {} fps ({} keys)",
        tracks.len(),
        source_rate.as_f64(),
        target.as_f64(),
        num_keys
    );
    Ok(tracks
        .iter()
        .map(|t| BoneTrack {
            keys: resample_keys(
                &t.keys,
                source_rate.as_f64(),
                target.as_f64(),
                num_keys,
                interpolation,
            ),
            ..t.clone()
        })
        .collect())
}

#[derive(Clone, Debug, PartialEq)]
pub struct StrippedTracks {
    pub tracks: Vec<BoneTrack>,
    pub num_keys: usize,
}

/// Halve the frame count of a sequence of `num_keys` keys.
///
/// - fewer than 2 frames: not stripped;
/// - even frame count: every other key is kept (`frames / 2 + 1` keys);
/// - odd frame count: resampled to `frames / 2` frames when `strip_odd` is set,
///   otherwise not stripped.
pub fn strip_frames(
    tracks: &[BoneTrack],
    num_keys: usize,
    strip_odd: bool,
    interpolation: Interpolation,
) -> Option<StrippedTracks> {
    let frames = num_keys.saturating_sub(1);
    if frames < 2 {
        return None;
    }
    if frames % 2 == 0 {
        let stripped = tracks
            .iter()
            .map(|t| BoneTrack {
                keys: keep_every_other(&t.keys),
                ..t.clone()
            })
            .collect();
        return Some(StrippedTracks {
            tracks: stripped,
            num_keys: frames / 2 + 1,
        });
    }
    if !strip_odd {
        log::debug!("not stripping odd frame count {frames}");
        return None;
    }
    let new_num_keys = frames / 2 + 1;
    let stripped = tracks
        .iter()
        .map(|t| BoneTrack {
            keys: resample_proportional(&t.keys, new_num_keys, interpolation),
            ..t.clone()
        })
        .collect();
    Some(StrippedTracks {
        tracks: stripped,
        num_keys: new_num_keys,
    })
}

fn keep_every_other(keys: &TrackKeys) -> TrackKeys {
    fn halve<T: Copy>(v: &[T]) -> Vec<T> {
        if v.len() <= 1 {
            return v.to_vec();
        }
        v.iter().step_by(2).copied().collect()
    }
    TrackKeys {
        positions: halve(&keys.positions),
        rotations: halve(&keys.rotations),
        scales: halve(&keys.scales),
    }
}
