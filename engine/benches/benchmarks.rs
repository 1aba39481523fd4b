//! Performance benchmarks for stockpile-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use stockpile_engine::{
    CacheSnapshot, Catalog, EntityDescriptor, FieldDef, FieldType, KeyKind, LocalStore,
    MemoryStore, Record, Reconciler, StalenessTracker,
};

fn products() -> EntityDescriptor {
    EntityDescriptor::keyed("products", "id", KeyKind::Int).with_fields([
        FieldDef::required("name", FieldType::String),
        FieldDef::optional("location_id", FieldType::Int),
        FieldDef::optional("min_stock_amount", FieldType::Double),
        FieldDef::optional("active", FieldType::Bool),
    ])
}

fn raw_products(size: usize) -> Vec<serde_json::Value> {
    (0..size)
        .map(|i| {
            json!({
                "id": i.to_string(),
                "name": format!("Product {i}"),
                "location_id": "1",
                "min_stock_amount": "0",
                "active": "1",
            })
        })
        .collect()
}

fn populated(descriptor: &EntityDescriptor, size: usize) -> (MemoryStore, Vec<Record>) {
    let remote = descriptor.normalize_all(raw_products(size)).unwrap();
    let mut store = MemoryStore::new();
    let plan = Reconciler::new(descriptor)
        .plan(Vec::new(), remote.clone())
        .unwrap();
    store.apply(&plan.changes).unwrap();
    (store, remote)
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    let descriptor = products();

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("snapshot", size), size, |b, &size| {
            let raw = raw_products(size);
            b.iter(|| descriptor.normalize_all(black_box(raw.clone())))
        });
    }

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");
    let descriptor = products();

    for size in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("unchanged", size), size, |b, &size| {
            let (store, remote) = populated(&descriptor, size);
            b.iter(|| {
                let local = store.query(&descriptor.entity);
                Reconciler::new(&descriptor).plan(black_box(local), black_box(remote.clone()))
            })
        });

        group.bench_with_input(BenchmarkId::new("one_changed", size), size, |b, &size| {
            let (store, mut remote) = populated(&descriptor, size);
            remote[size / 2].payload["name"] = json!("Renamed");
            b.iter(|| {
                let local = store.query(&descriptor.entity);
                Reconciler::new(&descriptor).plan(black_box(local), black_box(remote.clone()))
            })
        });

        group.bench_with_input(BenchmarkId::new("half_replaced", size), size, |b, &size| {
            let (store, _) = populated(&descriptor, size);
            // Identities size/2..size/2+size: half overlap, half new
            let shifted = descriptor
                .normalize_all(raw_products(size + size / 2))
                .unwrap()
                .split_off(size / 2);
            b.iter(|| {
                let local = store.query(&descriptor.entity);
                Reconciler::new(&descriptor).plan(black_box(local), black_box(shifted.clone()))
            })
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    let descriptor = products();
    let catalog = Catalog::new().with(descriptor.clone());

    for size in [100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::new("capture", size), size, |b, &size| {
            let (store, _) = populated(&descriptor, size);
            let tracker = StalenessTracker::new();
            b.iter(|| CacheSnapshot::capture(&store, &catalog, &tracker))
        });

        group.bench_with_input(BenchmarkId::new("to_json", size), size, |b, &size| {
            let (store, _) = populated(&descriptor, size);
            let snapshot = CacheSnapshot::capture(&store, &catalog, &StalenessTracker::new());
            b.iter(|| black_box(&snapshot).to_json())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_normalize,
    bench_reconciliation,
    bench_snapshot,
);
criterion_main!(benches);
