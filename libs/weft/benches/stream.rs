// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::hint::black_box;
use std::sync::Arc;
use std::thread;

use criterion::{Criterion, criterion_group, criterion_main};
use weft::Future;
use weft::stream;
use weft_spin::SpinLock;

const CHUNKS: usize = 1_000;

fn yield_then_drain_single_producer(c: &mut Criterion) {
    c.bench_function("yield_then_drain_1k_single_producer", |b| {
        b.iter(|| {
            let (generator, stream) = stream::channel();
            for i in 0..CHUNKS {
                generator.yield_value(i, i == CHUNKS - 1);
            }
            let sum: usize = stream.iter().map(|chunk| *chunk.lock()).sum();
            black_box(sum);
        });
    });
}

fn yield_four_producers(c: &mut Criterion) {
    c.bench_function("yield_1k_four_producers", |b| {
        b.iter(|| {
            let (generator, stream) = stream::channel();
            let joins: Vec<_> = (0..4)
                .map(|_| {
                    let generator = generator.clone();
                    thread::spawn(move || {
                        for i in 0..CHUNKS / 4 {
                            generator.yield_value(i, false);
                        }
                    })
                })
                .collect();
            for join in joins {
                join.join().unwrap();
            }
            black_box(stream.len());
        });
    });
}

fn future_roundtrip(c: &mut Criterion) {
    c.bench_function("future_create_finish_take", |b| {
        b.iter(|| {
            let (mut future, promise) = Future::create();
            promise.finish(black_box(42_u64));
            black_box(future.take().unwrap());
        });
    });
}

fn spin_lock_uncontended(c: &mut Criterion) {
    let lock = SpinLock::new(0_u64);
    c.bench_function("spin_lock_uncontended", |b| {
        b.iter(|| {
            *lock.lock() += 1;
        });
    });
}

fn spin_lock_contended(c: &mut Criterion) {
    const ITERS: u64 = 10_000;

    c.bench_function("spin_lock_contended_4_threads", |b| {
        b.iter(|| {
            let lock = Arc::new(SpinLock::new(0_u64));
            let joins: Vec<_> = (0..4)
                .map(|_| {
                    let lock = lock.clone();
                    thread::spawn(move || {
                        for _ in 0..ITERS {
                            *lock.lock() += 1;
                        }
                    })
                })
                .collect();
            for join in joins {
                join.join().unwrap();
            }
            assert_eq!(*lock.lock(), 4 * ITERS);
        });
    });
}

criterion_group!(
    benches,
    yield_then_drain_single_producer,
    yield_four_producers,
    future_roundtrip,
    spin_lock_uncontended,
    spin_lock_contended
);
criterion_main!(benches);
