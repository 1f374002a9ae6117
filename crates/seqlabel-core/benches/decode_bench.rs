use candle_core::Device;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use seqlabel_core::{build_tagger, AttentionKind, DecodeStrategy, ModelConfig};

fn bench_decode(c: &mut Criterion) {
    let config = ModelConfig::new()
        .with_vocab(1000, 12)
        .with_dims(64, 64, 16)
        .with_attention(Some(AttentionKind::General));
    let (_varmap, tagger) = build_tagger(&config, &Device::Cpu).unwrap();

    let sentences: Vec<Vec<u32>> = (0..8)
        .map(|b| (0..20).map(|t| ((b * 31 + t * 7) % 1000) as u32).collect())
        .collect();
    let batch = tagger.encode_batch(&sentences).unwrap();

    c.bench_function("greedy_decode_8x20", |b| {
        b.iter(|| {
            tagger
                .decode_encoded(black_box(&batch), DecodeStrategy::Greedy)
                .unwrap()
        });
    });

    for beam_size in [2, 5] {
        c.bench_function(&format!("beam{beam_size}_decode_8x20"), |b| {
            b.iter(|| {
                tagger
                    .decode_encoded(black_box(&batch), DecodeStrategy::Beam(beam_size))
                    .unwrap()
            });
        });
    }
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
