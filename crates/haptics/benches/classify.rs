//! Zone classification throughput

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use haptics::classify;

fn bench_classify(c: &mut Criterion) {
    let distances: Vec<Option<f64>> = (0..400)
        .map(|d| if d % 50 == 0 { None } else { Some(d as f64 + 0.5) })
        .collect();

    c.bench_function("classify_sweep", |b| {
        b.iter(|| {
            for d in &distances {
                black_box(classify(black_box(*d)));
            }
        })
    });
}

criterion_group!(benches, bench_classify);
criterion_main!(benches);
