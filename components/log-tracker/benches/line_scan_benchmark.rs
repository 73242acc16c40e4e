use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use log_tracker::tracker::reader::{LineMode, collect_lines};
use std::hint::black_box;

fn synthetic_log(lines: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    for i in 0..lines {
        buf.extend_from_slice(format!("2024-01-01T00:00:00Z INFO request {i} served in 12ms\n").as_bytes());
        if i % 10 == 0 {
            buf.push(b'\n');
        }
    }
    buf
}

fn bench_collect_lines(c: &mut Criterion) {
    let input = synthetic_log(10_000);

    let mut group = c.benchmark_group("collect_lines");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("joined", |b| {
        b.iter(|| collect_lines(black_box(&input), LineMode::Joined))
    });
    group.bench_function("preserve_breaks", |b| {
        b.iter(|| collect_lines(black_box(&input), LineMode::PreserveBreaks))
    });
    group.finish();
}

criterion_group!(benches, bench_collect_lines);
criterion_main!(benches);
