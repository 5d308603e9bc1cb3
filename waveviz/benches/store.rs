// Copyright 2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

#[cfg(feature = "benchmark")]
use criterion::{black_box, criterion_group, criterion_main, Criterion};
#[cfg(feature = "benchmark")]
use waveviz::viewport::{Viewport, ViewportOptions};
#[cfg(feature = "benchmark")]
use waveviz::ValueChangeStore;

#[cfg(feature = "benchmark")]
fn counter_store(len: u64) -> ValueChangeStore {
    let mut store = ValueChangeStore::new();
    for time in 0..len {
        store.append(time * 3, Some(format!("{:016b}", time & 0xffff).as_str()));
    }
    store.close(len * 3);
    store
}

#[cfg(feature = "benchmark")]
fn criterion_benchmark(c: &mut Criterion) {
    let store = counter_store(1_000_000);
    c.bench_function("query", |b| {
        b.iter(|| store.query(black_box(1_234_567)).unwrap().value)
    });
    c.bench_function("append", |b| b.iter(|| counter_store(black_box(10_000))));
    let mut viewport = Viewport::new(0, 3_000_000, ViewportOptions::default());
    viewport.fit().unwrap();
    c.bench_function("pixel_from_time", |b| {
        b.iter(|| viewport.pixel_from_time(black_box(2_999_999)))
    });
}

#[cfg(feature = "benchmark")]
criterion_group!(benches, criterion_benchmark);
#[cfg(feature = "benchmark")]
criterion_main!(benches);
