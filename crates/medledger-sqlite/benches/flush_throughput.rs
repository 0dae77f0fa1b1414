//! Benchmarks for buffered flush throughput
//!
//! Run with: cargo bench --bench flush_throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use medledger_core::{ContainerConfig, InteractionRecord, SynchronousMode, WriterConfig};
use medledger_sqlite::{BufferedWriter, RecordContainer};
use std::sync::Arc;

fn bench_flush_batch_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush_batch");

    for batch in [1usize, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            let temp_dir = tempfile::tempdir().unwrap();
            let config = ContainerConfig::new(temp_dir.path().join("ledger.db"))
                .with_synchronous(SynchronousMode::Normal);
            let container = Arc::new(RecordContainer::initialize(config, "bench", false).unwrap());
            let writer = BufferedWriter::new(container, WriterConfig::new(usize::MAX));

            b.iter(|| {
                for i in 0..batch {
                    writer
                        .append(InteractionRecord::new("bench", format!("transcript {}", i)))
                        .unwrap();
                }
                black_box(writer.flush().unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_flush_batch_sizes);
criterion_main!(benches);
