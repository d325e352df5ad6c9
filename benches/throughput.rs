//! Throughput Benchmark for FlashGate
//!
//! This benchmark measures how fast requests can be decoded off a byte
//! stream and how fast replies can be encoded back to the wire.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flashgate::protocol::{Decoder, Reply};
use tokio::runtime::Runtime;

/// Builds `count` pipelined SET requests with values of `value_len` bytes.
fn pipelined_sets(count: usize, value_len: usize) -> Vec<u8> {
    let value = "x".repeat(value_len);
    let mut wire = Vec::new();
    for i in 0..count {
        Reply::array([
            "SET".to_string(),
            format!("key:{}", i),
            value.clone(),
        ])
        .serialize_into(&mut wire);
    }
    wire
}

/// Decodes every request in `wire`, returning how many were decoded.
async fn decode_all(wire: &[u8]) -> usize {
    let mut decoder = Decoder::new(wire);
    let mut decoded = 0;
    while let Some(Ok(reply)) = decoder.next().await {
        black_box(reply);
        decoded += 1;
    }
    decoded
}

/// Benchmark decoding of pipelined requests
fn bench_decode(c: &mut Criterion) {
    let rt = Runtime::new().expect("failed to build runtime");

    let mut group = c.benchmark_group("decode");

    for (name, value_len) in [("small", 16), ("medium", 1024), ("large", 64 * 1024)] {
        let wire = pipelined_sets(1_000, value_len);
        group.throughput(Throughput::Bytes(wire.len() as u64));

        group.bench_function(format!("set_{}", name), |b| {
            b.iter(|| rt.block_on(decode_all(&wire)));
        });
    }

    group.finish();
}

/// Benchmark encoding of replies
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    let status = Reply::ok();
    let bulk = Reply::bulk(Bytes::from("x".repeat(1024)));
    let array = Reply::array((0..100).map(|i| format!("element:{}", i)));

    group.bench_function("status", |b| {
        let mut buf = Vec::with_capacity(64);
        b.iter(|| {
            buf.clear();
            status.serialize_into(&mut buf);
            black_box(&buf);
        });
    });

    group.bench_function("bulk_1k", |b| {
        let mut buf = Vec::with_capacity(2048);
        b.iter(|| {
            buf.clear();
            bulk.serialize_into(&mut buf);
            black_box(&buf);
        });
    });

    group.bench_function("array_100", |b| {
        let mut buf = Vec::with_capacity(4096);
        b.iter(|| {
            buf.clear();
            array.serialize_into(&mut buf);
            black_box(&buf);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
