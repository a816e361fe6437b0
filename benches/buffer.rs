//! Buffer throughput benchmarks

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use ptyrelay::buffer::{ByteBuffer, DEFAULT_CAPACITY};

fn bench_fill_drain(c: &mut Criterion) {
    let (src, mut feed) = UnixStream::pair().unwrap();
    let (dst, mut sink) = UnixStream::pair().unwrap();
    let chunk = vec![b'x'; DEFAULT_CAPACITY];
    let mut scratch = vec![0u8; DEFAULT_CAPACITY];
    let mut buffer = ByteBuffer::new(DEFAULT_CAPACITY);

    let mut group = c.benchmark_group("buffer");
    group.throughput(Throughput::Bytes(DEFAULT_CAPACITY as u64));
    group.bench_function("fill_flip_drain", |b| {
        b.iter(|| {
            feed.write_all(&chunk).unwrap();
            while buffer.remaining() > 0 {
                buffer.fill(&src).unwrap();
            }
            buffer.flip();
            while buffer.remaining() > 0 {
                buffer.drain(&dst).unwrap();
            }
            buffer.clear();
            sink.read_exact(&mut scratch).unwrap();
            black_box(&scratch);
        })
    });
    group.finish();
}

criterion_group!(benches, bench_fill_drain);
criterion_main!(benches);
