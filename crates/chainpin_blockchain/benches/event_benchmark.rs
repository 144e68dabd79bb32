//! # Event Decoding Benchmark
//!
//! Decode cost per log and per poll-sized batch.
//!
//! Run with: `cargo bench --package chainpin_blockchain`

// Benchmarks don't need strict docs
#![allow(missing_docs)]

use alloy_primitives::U256;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chainpin_blockchain::{EventParser, RawLog};

/// Benchmark: single log decode.
fn bench_parse_single(c: &mut Criterion) {
    let log = RawLog::pin_status_changed(U256::from(7), 14, 1).at(1_000, 0);

    c.bench_function("parse_pin_status_changed", |b| {
        b.iter(|| black_box(EventParser::parse_pin_status_changed(black_box(&log))));
    });
}

/// Benchmark: decode a whole poll batch, mixed good and bad logs.
fn bench_parse_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_batch");

    for size in [1usize, 16, 256] {
        let logs: Vec<RawLog> = (0..size)
            .map(|i| {
                let mut log = RawLog::pin_status_changed(U256::from(7), (i % 30) as u8, (i % 2) as u8);
                if i % 10 == 9 {
                    log.data.clear();
                }
                log
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &logs, |b, logs| {
            b.iter(|| {
                let decoded = logs
                    .iter()
                    .filter_map(|log| EventParser::parse_pin_status_changed(log).ok())
                    .count();
                black_box(decoded)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_single, bench_parse_batch);
criterion_main!(benches);
