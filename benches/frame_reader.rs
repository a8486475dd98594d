use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mcp_relay::mcp::{FrameLimits, FrameReader};
use std::hint::black_box;

// 1,000 tools/call requests, roughly 120 KiB of host input
fn host_input() -> Vec<u8> {
    let mut input = Vec::new();
    for id in 0..1_000 {
        let line = format!(
            "{{\"jsonrpc\":\"2.0\",\"id\":{id},\"method\":\"tools/call\",\"params\":{{\"name\":\"search\",\"arguments\":{{\"query\":\"frame reader throughput\"}}}}}}\n"
        );
        input.extend_from_slice(line.as_bytes());
    }
    input
}

fn bench_frame_reader(c: &mut Criterion) {
    let input = host_input();
    let mut group = c.benchmark_group("frame_reader");
    group.throughput(Throughput::Bytes(input.len() as u64));

    // Small chunks model a slow pipe, 64 KiB matches the serve loop's read size
    for chunk_size in [64usize, 4 * 1024, 64 * 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let mut reader = FrameReader::new(FrameLimits::default());
                    let mut messages = 0usize;
                    for chunk in input.chunks(chunk_size) {
                        messages += reader.push(black_box(chunk)).unwrap().len();
                    }
                    black_box(messages)
                });
            },
        );
    }
    group.finish();
}

fn bench_long_partial_line(c: &mut Criterion) {
    // One 512 KiB message trickling in; only new bytes should be scanned
    let mut line = vec![b'a'; 512 * 1024];
    line.push(b'\n');

    c.bench_function("frame_reader_long_partial_line", |b| {
        b.iter(|| {
            let mut reader = FrameReader::new(FrameLimits::default());
            let mut emitted = 0usize;
            for chunk in line.chunks(1024) {
                emitted += reader.push(black_box(chunk)).unwrap().len();
            }
            black_box(emitted)
        });
    });
}

criterion_group!(benches, bench_frame_reader, bench_long_partial_line);
criterion_main!(benches);
