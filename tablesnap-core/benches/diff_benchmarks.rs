//! Diff and snapshot benchmarks
//!
//! ```bash
//! cargo bench -p tablesnap-core --bench diff_benchmarks
//! cargo bench -p tablesnap-core --bench diff_benchmarks -- "diff/"
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tablesnap_core::{read_snapshot, DiffEngine, Record, SnapshotWriter};
use tempfile::TempDir;

/// Fixed seed so every run mutates the same records
const BENCH_SEED: u64 = 0x7AB1E5AA;

const TABLE_SIZES: &[usize] = &[1_000, 10_000, 100_000];

fn table(size: usize) -> Vec<Record> {
    (0..size)
        .map(|id| {
            json!({
                "id": id,
                "number": size - id,
                "name": format!("user-{id}"),
                "profile": {"active": id % 3 == 0, "tags": ["a", "b", "c"]}
            })
            .as_object()
            .cloned()
            .unwrap()
        })
        .collect()
}

/// Copy of `previous` with roughly `ratio` of the records changed and a few appended
fn mutate(previous: &[Record], ratio: f64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(BENCH_SEED);
    let mut current: Vec<Record> = previous
        .iter()
        .map(|record| {
            let mut record = record.clone();
            if rng.gen_bool(ratio) {
                record.insert("name".to_string(), json!("changed"));
            }
            record
        })
        .collect();
    let appended = previous.len() / 100;
    current.extend(table(previous.len() + appended).into_iter().skip(previous.len()));
    current
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    for &size in TABLE_SIZES {
        let previous = table(size);
        let current = mutate(&previous, 0.05);
        let engine = DiffEngine::new("id");

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("five_percent_changed", size), &size, |b, _| {
            b.iter(|| {
                let mut report = engine
                    .diff(Some(black_box(previous.as_slice())), black_box(current.as_slice()))
                    .unwrap();
                report.sort_by_field("number").unwrap();
                black_box(report)
            })
        });
    }

    group.finish();
}

fn bench_snapshot_io(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    group.sample_size(20);

    for &size in &TABLE_SIZES[..2] {
        let records = table(size);
        let temp_dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(temp_dir.path()).with_timestamp(false);
        let path = writer.write(&records, "bench", None).unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("write", size), &size, |b, _| {
            b.iter(|| writer.write(black_box(&records), "bench", None).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("read", size), &size, |b, _| {
            b.iter(|| black_box(read_snapshot(&path).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_diff, bench_snapshot_io);
criterion_main!(benches);
