//! Throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use termdrive_core::core::capture::{CaptureReader, CaptureRing};
use termdrive_core::{AppConfig, CommPort, IdleCore, TransportError, TransportType, Yielder};

/// Port that always has the same chunk ready and swallows everything sent
struct EchoPort {
    chunk: Vec<u8>,
}

impl CommPort for EchoPort {
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(data.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = buf.len().min(self.chunk.len());
        buf[..n].copy_from_slice(&self.chunk[..n]);
        Ok(n)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Tcp
    }

    fn connection_info(&self) -> String {
        "bench".to_string()
    }
}

struct NoYield;

impl Yielder for NoYield {
    fn yield_for(&mut self, _delay: std::time::Duration) {}
}

fn idle_cycle_benchmark(c: &mut Criterion) {
    let chunk: Vec<u8> = (0..1024).map(|i| b' ' + (i % 95) as u8).collect();

    let mut config = AppConfig::default();
    config.capture.file_log = true;
    config.capture.binary_log = true;

    let mut core = IdleCore::builder(Box::new(EchoPort {
        chunk: chunk.clone(),
    }))
    .config(config)
    .yielder(Box::new(NoYield))
    .build();

    let mut group = c.benchmark_group("idle");
    group.throughput(Throughput::Bytes(chunk.len() as u64));

    let mut budget = 0u32;
    group.bench_function("on_idle_1k", |b| {
        b.iter(|| {
            budget = budget.wrapping_add(1);
            black_box(core.on_idle(black_box(budget)))
        })
    });

    group.finish();
}

fn capture_ring_benchmark(c: &mut Criterion) {
    let data: Vec<u8> = (0..512).map(|i| (i % 256) as u8).collect();

    let mut group = c.benchmark_group("capture");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("ring_put_drain", |b| {
        let mut ring = CaptureRing::new(4096);
        b.iter(|| {
            ring.put(black_box(&data), true, true);
            let pending = ring.pending(CaptureReader::File);
            ring.consume(CaptureReader::File, pending);
            ring.consume(CaptureReader::Publish, pending);
            black_box(ring.written())
        })
    });

    group.finish();
}

criterion_group!(benches, idle_cycle_benchmark, capture_ring_benchmark);
criterion_main!(benches);
