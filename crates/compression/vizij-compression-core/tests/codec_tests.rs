mod common;

use common::{biped, sample_parts};
use vizij_anim_model::{BoneIndex, TrackKeys, Transform};
use vizij_compression::{CompressibleData, CompressionError, Compressor, QuantizedCodec, RawCodec};

#[test]
fn raw_codec_is_lossless() {
    let skel = biped();
    let data = CompressibleData::new(sample_parts(&skel, 0.25));
    let blob = RawCodec.compress(&data).unwrap();
    let decoded = RawCodec.decompress(&blob.bytes).unwrap();

    assert_eq!(decoded.codec, "raw");
    assert_eq!(decoded.num_keys, 5);
    assert_eq!(decoded.tracks.len(), 1);
    assert_eq!(decoded.tracks[0].keys, data.tracks()[0].keys);
    // deterministic output
    assert_eq!(RawCodec.compress(&data).unwrap(), blob);
}

#[test]
fn quantized_codec_stays_close_and_shrinks() {
    let skel = biped();
    let data = CompressibleData::new(sample_parts(&skel, 0.25));
    let codec = QuantizedCodec::default();
    let blob = codec.compress(&data).unwrap();
    let decoded = codec.decompress(&blob.bytes).unwrap();

    assert!(blob.len() < RawCodec.compress(&data).unwrap().len());
    for (a, b) in decoded.tracks[0].keys.positions.iter().zip(&data.tracks()[0].keys.positions) {
        assert!(a.abs_diff_eq(*b, 1e-3), "{a} vs {b}");
    }
    let sampled = decoded.sample(BoneIndex(1), 2.0 / 30.0).unwrap();
    assert!((sampled.translation.y - 2.0).abs() < 1e-3);
}

#[test]
fn larger_error_budget_means_fewer_bits() {
    let skel = biped();
    let fine = CompressibleData::new(sample_parts(&skel, 0.25));
    let mut coarse = sample_parts(&skel, 0.25);
    coarse.error_threshold_scale = 4.0;
    let coarse = CompressibleData::new(coarse);

    let codec = QuantizedCodec::default();
    let fine_blob = codec.compress(&fine).unwrap();
    let coarse_blob = codec.compress(&coarse).unwrap();
    assert_eq!(fine_blob.bytes.last(), Some(&16));
    assert_eq!(coarse_blob.bytes.last(), Some(&14));
}

#[test]
fn decoding_with_the_wrong_codec_fails() {
    let skel = biped();
    let data = CompressibleData::new(sample_parts(&skel, 0.25));
    let mut blob = RawCodec.compress(&data).unwrap().into_bytes();
    blob.push(16);
    assert!(matches!(
        QuantizedCodec::default().decompress(&blob),
        Err(CompressionError::CodecMismatch { .. })
    ));
    assert!(matches!(
        RawCodec.decompress(b"nope"),
        Err(CompressionError::Corrupt { .. })
    ));
}

#[test]
fn mismatched_component_lengths_are_rejected() {
    let skel = biped();
    let mut parts = sample_parts(&skel, 0.25);
    let mut keys = TrackKeys::constant(Transform::IDENTITY);
    keys.positions = vec![glam::Vec3::ZERO; 3];
    parts.tracks[0].keys = keys;
    let data = CompressibleData::new(parts);
    assert!(matches!(
        RawCodec.compress(&data),
        Err(CompressionError::InvalidInput { .. })
    ));
}
