use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fs;
use sweep::id_space::IndividualId;
use sweep::ledger::{self, IdSet};
use sweep::planner::RangePlanner;
use tempfile::TempDir;

const N: u64 = 1 << 21;

fn started_set(count: u64) -> IdSet {
    (0..count).map(|i| IndividualId::new(N, 1 + 2 * i)).collect()
}

fn bench_scan_log(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("started_ids.txt");
    let mut text = String::new();
    for id in started_set(200_000) {
        text.push_str(&id.to_string());
        text.push('\n');
    }
    fs::write(&path, text).unwrap();

    c.bench_function("scan_log_200k", |b| {
        b.iter(|| ledger::scan_log(black_box(&path)).unwrap())
    });
}

fn bench_append(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("completed_ids.txt");
    let ids: Vec<IndividualId> = (0..256).map(|i| IndividualId::new(N, 1 + 2 * i)).collect();

    c.bench_function("append_256_ids", |b| {
        b.iter(|| ledger::append_ids(black_box(&path), black_box(&ids)).unwrap())
    });
}

fn bench_plan(c: &mut Criterion) {
    let started = started_set(200_000);
    let planner = RangePlanner::new(N, 1024, 2, 128);

    c.bench_function("plan_past_200k_started", |b| {
        b.iter(|| planner.plan(black_box(&started)))
    });
}

criterion_group!(benches, bench_scan_log, bench_append, bench_plan);
criterion_main!(benches);
