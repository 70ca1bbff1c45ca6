//! Sample codec throughput benchmarks.

use cinta_core::{SoundSpec, codec};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

const FRAMES: usize = 4096;

fn spec(channels: usize, width: usize, big: bool) -> SoundSpec {
    let mut spec = SoundSpec::default();
    spec.set_layout(channels, width);
    spec.big_endian = big;
    spec
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for &(width, big, name) in &[
        (2usize, false, "16le"),
        (2, true, "16be"),
        (3, false, "24le"),
        (4, false, "f32le"),
    ] {
        let spec = spec(2, width, big);
        let buf = vec![0x5au8; FRAMES * spec.bytes_per_frame];
        let mut left = vec![0.0f32; FRAMES];
        let mut right = vec![0.0f32; FRAMES];
        group.bench_function(name, |b| {
            b.iter(|| {
                codec::decode_frames(
                    &spec,
                    &mut [&mut left[..], &mut right[..]],
                    0,
                    black_box(&buf),
                    FRAMES,
                );
            });
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let left: Vec<f32> = (0..FRAMES).map(|i| (i as f32 * 0.01).sin()).collect();
    let right: Vec<f32> = (0..FRAMES).map(|i| (i as f32 * 0.013).cos()).collect();
    for &(width, big, name) in &[
        (2usize, false, "16le"),
        (2, true, "16be"),
        (3, false, "24le"),
        (4, false, "f32le"),
    ] {
        let spec = spec(2, width, big);
        let mut buf = vec![0u8; FRAMES * spec.bytes_per_frame];
        group.bench_function(name, |b| {
            b.iter(|| {
                codec::encode_frames(
                    &spec,
                    black_box(&[&left, &right]),
                    &mut buf,
                    FRAMES,
                    0,
                    1.0,
                );
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
