use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vizij_anim_model::{parse_sequence_json, parse_skeleton_json, DataModel};
use vizij_compression::{
    prepare_compressible, AssetCompressionSettings, CacheKeyBuilder, Compressor, PrepareOptions,
    QuantizedCodec, RawCodec,
};

fn walk_model() -> DataModel {
    let skeleton = vizij_test_fixtures::skeletons::json("biped").expect("biped fixture");
    let skeleton = Arc::new(parse_skeleton_json(&skeleton).expect("parse biped"));
    let walk = vizij_test_fixtures::sequences::json("walk").expect("walk fixture");
    let desc = parse_sequence_json(&walk).expect("parse walk");
    DataModel::from_sequence(skeleton, &desc).expect("walk model")
}

fn bench_cache_key(c: &mut Criterion) {
    let model = walk_model();
    let settings = AssetCompressionSettings::default();
    let data = prepare_compressible(&model, &settings, None, PrepareOptions::default())
        .expect("prepare walk");
    let builder = CacheKeyBuilder::default();

    c.bench_function("prepare_walk", |b| {
        b.iter(|| {
            prepare_compressible(black_box(&model), &settings, None, PrepareOptions::default())
                .expect("prepare walk")
        })
    });
    c.bench_function("cache_key_walk", |b| {
        b.iter(|| builder.build(black_box(&data), &RawCodec))
    });
    c.bench_function("compress_walk_quantized", |b| {
        let codec = QuantizedCodec::default();
        b.iter(|| codec.compress(black_box(&data)).expect("compress"))
    });
}

criterion_group!(benches, bench_cache_key);
criterion_main!(benches);
