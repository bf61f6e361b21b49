//! Criterion benchmarks for the wsock frame codec.
//!
//! Run with:
//! ```bash
//! cargo bench --package wsock-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use wsock_core::{compute_accept_key, decode_frame, encode_frame, Frame, FrameParser, Opcode};

const SIZES: [usize; 4] = [16, 125, 4096, 65536];

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    for size in SIZES {
        let payload = vec![b'x'; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, p| {
            b.iter(|| encode_frame(Opcode::Text, black_box(p)));
        });
    }
    group.finish();
}

fn bench_decode_masked(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame_masked");
    for size in SIZES {
        let wire = Frame::new(Opcode::Binary, vec![b'x'; size])
            .with_mask([0x37, 0xfa, 0x21, 0x3d])
            .to_bytes();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &wire, |b, w| {
            b.iter(|| decode_frame(black_box(w)));
        });
    }
    group.finish();
}

fn bench_parser_small_reads(c: &mut Criterion) {
    let wire = Frame::new(Opcode::Text, vec![b'y'; 4096])
        .with_mask([1, 2, 3, 4])
        .to_bytes();
    c.bench_function("parser_4k_frame_in_512b_reads", |b| {
        b.iter(|| {
            let mut parser = FrameParser::new();
            let mut frames = 0;
            for chunk in wire.chunks(512) {
                parser.push(black_box(chunk));
                while let Ok(Some(_)) = parser.next_frame() {
                    frames += 1;
                }
            }
            frames
        });
    });
}

fn bench_accept_key(c: &mut Criterion) {
    c.bench_function("compute_accept_key", |b| {
        b.iter(|| compute_accept_key(black_box("dGhlIHNhbXBsZSBub25jZQ==")));
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode_masked,
    bench_parser_small_reads,
    bench_accept_key
);
criterion_main!(benches);
