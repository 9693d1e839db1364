use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rmaledger::{derive_key, Dispatcher, EngineConfig, MemoryLedger};

fn seeded(records: usize) -> Dispatcher {
    let dispatcher =
        Dispatcher::new(Arc::new(MemoryLedger::new()), EngineConfig::default()).unwrap();
    for i in 0..records {
        let rmano = format!("RMA-{i:06}");
        assert!(dispatcher.invoke("create", &[rmano.as_str()]).is_ok());
        assert!(dispatcher
            .invoke("update3b11", &[rmano.as_str(), "PO-1", "1", "SKU-1", "2"])
            .is_ok());
    }
    dispatcher
}

fn bench_derive_key(c: &mut Criterion) {
    c.bench_function("key/derive", |b| {
        b.iter(|| derive_key("RMANO", std::hint::black_box("RMA-000123")).unwrap());
    });
    c.bench_function("key/derive_escaped", |b| {
        b.iter(|| derive_key("RMANO", std::hint::black_box("RMA\u{0}\u{1}000123")).unwrap());
    });
}

fn bench_update(c: &mut Criterion) {
    let dispatcher = seeded(1_000);
    c.bench_function("engine/update3b3ETA", |b| {
        b.iter(|| {
            let resp = dispatcher.invoke("update3b3ETA", &["RMA-000500", "2024-01-01"]);
            assert!(resp.is_ok());
        });
    });
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/query");
    for records in [10usize, 1_000, 10_000] {
        let dispatcher = seeded(records);
        group.throughput(Throughput::Elements(records as u64));
        group.bench_with_input(BenchmarkId::from_parameter(records), &records, |b, _| {
            b.iter(|| {
                let resp = dispatcher.invoke::<&str>("query", &[]);
                assert!(resp.is_ok());
                resp.payload
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_derive_key, bench_update, bench_query);
criterion_main!(benches);
