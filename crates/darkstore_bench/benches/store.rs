//! Data store benchmarks, comparing the locking and null coordinators.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use darkstore_bench::{bind_all, open_store, populate, random_data, random_names};
use darkstore_core::CoordinatorKind;

const COORDINATORS: [(&str, CoordinatorKind); 2] = [
    ("locking", CoordinatorKind::Locking),
    ("null", CoordinatorKind::Null),
];

/// Benchmark creating and writing one object per transaction.
fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");

    for size in [64, 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        for (label, kind) in COORDINATORS {
            group.bench_with_input(BenchmarkId::new(label, size), size, |b, &size| {
                let store = open_store(kind);
                let data = random_data(size);
                b.iter(|| {
                    store
                        .transaction(|txn| {
                            let oid = store.create_object(txn)?;
                            store.set_object(txn, oid, black_box(&data))
                        })
                        .unwrap();
                });
            });
        }
    }
    group.finish();
}

/// Benchmark reading many objects in one transaction.
fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    for count in [10, 100].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        for (label, kind) in COORDINATORS {
            group.bench_with_input(BenchmarkId::new(label, count), count, |b, &count| {
                let store = open_store(kind);
                let oids = populate(&store, count, 256);
                b.iter(|| {
                    store
                        .transaction(|txn| {
                            for oid in &oids {
                                black_box(store.get_object(txn, *oid, false)?);
                            }
                            Ok(())
                        })
                        .unwrap();
                });
            });
        }
    }
    group.finish();
}

/// Benchmark binding lookups and a full namespace scan.
fn bench_bindings(c: &mut Criterion) {
    let mut group = c.benchmark_group("bindings");

    for (label, kind) in COORDINATORS {
        let store = open_store(kind);
        let names = random_names(200, 12);
        bind_all(&store, &names);

        group.bench_function(BenchmarkId::new("lookup", label), |b| {
            b.iter(|| {
                store
                    .transaction(|txn| {
                        for name in names.iter().take(20) {
                            black_box(store.get_binding(txn, name)?);
                        }
                        Ok(())
                    })
                    .unwrap();
            });
        });

        group.bench_function(BenchmarkId::new("scan", label), |b| {
            b.iter(|| {
                store
                    .transaction(|txn| {
                        let mut name = store.next_bound_name(txn, None)?;
                        while let Some(current) = name {
                            name = store.next_bound_name(txn, Some(black_box(&current)))?;
                        }
                        Ok(())
                    })
                    .unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_create, bench_read, bench_bindings);
criterion_main!(benches);
