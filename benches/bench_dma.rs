// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Benchmarks of the engine's ring bookkeeping on the simulated backend.

use cfo_dma::{DmaEngine, RingKey, SimConfig};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn sim_config(slot_size: u32, loopback: bool) -> SimConfig {
    SimConfig {
        slot_count: 64,
        slot_size,
        loopback,
        ..SimConfig::default()
    }
}

/// Send, receive through loopback, and release one buffer.
fn bench_round_trip(c: &mut Criterion) {
    let sizes: Vec<usize> = vec![
        64,        // 64 B
        1024,      // 1 KB
        8 * 1024,  // 8 KB
        32 * 1024, // 32 KB
    ];

    let mut group = c.benchmark_group("round_trip");

    for size in sizes {
        let payload: Vec<u8> = (0..size).map(|i| (i & 0xFF) as u8).collect();
        let mut engine = DmaEngine::simulated(sim_config(32 * 1024, true)).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("sim", size), &payload, |b, payload| {
            b.iter(|| {
                engine.send_buffer(0, payload).unwrap();
                let buf = engine.acquire_buffer(0, 0).unwrap().unwrap();
                let len = engine.buffer(&buf).unwrap().len();
                engine.release_buffers(0, 1).unwrap();
                len
            });
        });
    }

    group.finish();
}

/// Transmit only: copy into the slot and commit.
fn bench_send(c: &mut Criterion) {
    let sizes: Vec<usize> = vec![
        64,        // 64 B
        4 * 1024,  // 4 KB
        32 * 1024, // 32 KB
    ];

    let mut group = c.benchmark_group("send");

    for size in sizes {
        let payload = vec![0xA5u8; size];
        let mut engine = DmaEngine::simulated(sim_config(32 * 1024, false)).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("sim", size), &payload, |b, payload| {
            b.iter(|| engine.send_buffer(1, payload).unwrap());
        });
    }

    group.finish();
}

/// Cached ready-delta lookup, the hot check of both paths.
fn bench_ready_delta(c: &mut Criterion) {
    let engine = DmaEngine::simulated(sim_config(1024, false)).unwrap();
    let key = RingKey::transmit(0);
    c.bench_function("ready_delta", |b| b.iter(|| engine.ready_delta(key)));
}

criterion_group!(benches, bench_round_trip, bench_send, bench_ready_delta);
criterion_main!(benches);
