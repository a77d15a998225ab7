//! Benchmarks for Argon storage components.
//!
//! Run with: cargo bench --package argon-store
//!
//! ## Benchmark Categories
//!
//! - **Record Codec**: Encode/decode performance
//! - **Time-Series Store**: Insert, search, delete
//! - **Datastore Recovery**: Log replay on reopen

use argon_store::{Criteria, Db, OpenFlags, Record, TsConfig, TsStore, Value};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

const SYMBOL: u32 = 55;
const TIMESTAMP: u32 = 52;
const QUANTITY: u32 = 56;

/// Generate typical trade records spread over many buckets.
fn generate_trades(count: usize) -> Vec<Record> {
    let symbols = ["AAPL", "FB", "MSFT", "TSLA"];
    (0..count)
        .map(|i| {
            let mut r = Record::new();
            r.set(SYMBOL, symbols[i % symbols.len()])
                .set(TIMESTAMP, (i as i64) * 17)
                .set(QUANTITY, (i % 500) as i64);
            r
        })
        .collect()
}

fn open_store(dir: &TempDir) -> TsStore {
    TsStore::open(
        dir.path().to_str().unwrap(),
        "bench",
        OpenFlags::CREATE | OpenFlags::CREATE_VOLUME,
        TsConfig::new(TIMESTAMP).with_bucket_width(1000),
    )
    .unwrap()
}

// ============================================================================
// Record Codec Benchmarks
// ============================================================================

fn bench_record_encode(c: &mut Criterion) {
    let records = generate_trades(1);
    let record = &records[0];

    c.bench_function("record_encode", |b| b.iter(|| black_box(record).encode()));
}

fn bench_record_decode(c: &mut Criterion) {
    let records = generate_trades(1);
    let bytes = records[0].encode();

    c.bench_function("record_decode", |b| {
        b.iter(|| Record::decode(black_box(&bytes)).unwrap())
    });
}

// ============================================================================
// Time-Series Store Benchmarks
// ============================================================================

fn bench_ts_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("ts_insert");

    for size in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let store = open_store(&dir);
                    (dir, store, generate_trades(size))
                },
                |(_dir, mut store, trades)| {
                    store.insert_many(&trades).unwrap();
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_ts_find(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.insert_many(&generate_trades(10_000)).unwrap();

    let mut criteria = Criteria::new();
    criteria.insert(SYMBOL, Value::from("AAPL"));

    c.bench_function("ts_find_10k", |b| {
        b.iter(|| {
            let results = store.find(black_box(&criteria)).unwrap();
            black_box(results)
        })
    });
}

fn bench_ts_delete(c: &mut Criterion) {
    let mut criteria = Criteria::new();
    criteria.insert(SYMBOL, Value::from("AAPL"));

    c.bench_function("ts_delete_1k", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let mut store = open_store(&dir);
                store.insert_many(&generate_trades(1_000)).unwrap();
                (dir, store)
            },
            |(_dir, mut store)| {
                store.delete(black_box(&criteria)).unwrap();
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

// ============================================================================
// Recovery Benchmarks
// ============================================================================

fn bench_reopen_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("reopen_replay");

    for size in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let mut store = open_store(&dir);
                    store.insert_many(&generate_trades(size)).unwrap();
                    drop(store);
                    dir
                },
                |dir| {
                    let store = TsStore::open(
                        dir.path().to_str().unwrap(),
                        "bench",
                        OpenFlags::new(),
                        TsConfig::new(TIMESTAMP).with_bucket_width(1000),
                    )
                    .unwrap();
                    black_box(store.keys().unwrap())
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// Key-Value Store Benchmarks
// ============================================================================

fn bench_kv_set_get(c: &mut Criterion) {
    c.bench_function("kv_set_1k", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let db = Db::open(
                    dir.path().to_str().unwrap(),
                    "kv",
                    OpenFlags::CREATE | OpenFlags::CREATE_VOLUME,
                )
                .unwrap();
                (dir, db)
            },
            |(_dir, mut db)| {
                for i in 0..1_000i64 {
                    db.set(i, i * 2).unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    // Record codec
    bench_record_encode,
    bench_record_decode,
    // Time-series store
    bench_ts_insert,
    bench_ts_find,
    bench_ts_delete,
    // Recovery
    bench_reopen_replay,
    // Key-value store
    bench_kv_set_get,
);
criterion_main!(benches);
