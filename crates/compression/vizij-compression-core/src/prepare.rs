//! Turns a live model into an immutable `CompressibleData` snapshot.
//!
//! Order: curve baking, resampling to the target rate, additive baking, frame
//! stripping. Curve baking comes first because it changes which tracks exist.

use vizij_anim_model::{DataModel, FrameRate, Timing};

use crate::additive::{bake_additive, identity_additive, ResolvedBase};
use crate::asset::AssetCompressionSettings;
use crate::compressible::{CompressibleData, CompressibleParts};
use crate::config::CompressionConfig;
use crate::curve_bake::bake_curves;
use crate::error::BuildError;
use crate::resample::{resample_tracks, strip_frames};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrepareOptions {
    pub frame_strip_enabled: bool,
    pub strip_odd: bool,
}

impl From<&CompressionConfig> for PrepareOptions {
    fn from(cfg: &CompressionConfig) -> Self {
        Self {
            frame_strip_enabled: cfg.frame_strip_enabled,
            strip_odd: cfg.strip_odd_framed_sequences,
        }
    }
}

fn invalid(reason: String) -> BuildError {
    BuildError::InvalidConfiguration { reason }
}

/// Prepare `model` for compression with `settings`.
///
/// `base` is only consulted for additive settings; `None` or a
/// `MissingAdditiveBase` error substitutes the identity additive.
pub fn prepare_compressible(
    model: &DataModel,
    settings: &AssetCompressionSettings,
    base: Option<Result<ResolvedBase<'_>, BuildError>>,
    opts: PrepareOptions,
) -> Result<CompressibleData, BuildError> {
    let scale = settings.error_threshold_scale;
    if !scale.is_finite() || scale <= 0.0 {
        return Err(invalid(format!(
            "error threshold scale {scale} must be finite and positive"
        )));
    }

    let skeleton = model.skeleton();
    let source = model.timing();
    let play_length = source.play_length();
    let interpolation = settings.interpolation;

    let baked = bake_curves(skeleton, model.tracks(), model.curves(), source);

    let target_rate = settings.target_frame_rate.unwrap_or(source.frame_rate.as_f64());
    let mut tracks = resample_tracks(
        &baked.tracks,
        source.frame_rate,
        play_length,
        target_rate,
        interpolation,
    )?;
    let rate = FrameRate::new(target_rate).map_err(|e| invalid(e.to_string()))?;
    let mut timing = if rate == source.frame_rate {
        source
    } else {
        Timing::new(rate, rate.num_keys_for(play_length))?
    };
    let mut curves = baked.float_curves;

    if let Some(additive) = &settings.additive {
        let output = match base {
            Some(Ok(resolved)) => bake_additive(
                skeleton,
                &tracks,
                &curves,
                timing,
                &resolved,
                additive.space,
                interpolation,
            ),
            Some(Err(e)) => Err(e),
            None => Err(BuildError::MissingAdditiveBase {
                reason: "no base supplied".into(),
            }),
        };
        let output = match output {
            Ok(o) => o,
            Err(BuildError::MissingAdditiveBase { reason }) => {
                log::warn!(
                    "'{}': additive base unavailable ({reason}); using identity additive",
                    model.name()
                );
                identity_additive()
            }
            Err(e) => return Err(e),
        };
        tracks = output.tracks;
        curves = output.curves;
    }

    let mut frames_stripped = false;
    if opts.frame_strip_enabled && settings.allow_frame_stripping {
        if let Some(stripped) = strip_frames(&tracks, timing.num_keys, opts.strip_odd, interpolation) {
            let rate = FrameRate::new((stripped.num_keys - 1) as f64 / play_length)
                .map_err(|e| invalid(e.to_string()))?;
            log::debug!(
                "'{}': stripped {} -> {} keys",
                model.name(),
                timing.num_keys,
                stripped.num_keys
            );
            timing = Timing::new(rate, stripped.num_keys)?;
            tracks = stripped.tracks;
            frames_stripped = true;
        }
    }

    Ok(CompressibleData::new(CompressibleParts {
        name: model.name().to_string(),
        skeleton: skeleton.clone(),
        tracks,
        curves,
        interpolation,
        frame_rate: timing.frame_rate,
        num_keys: timing.num_keys,
        play_length,
        error_threshold_scale: scale,
        is_additive: settings.additive.is_some(),
        frames_stripped,
    }))
}
