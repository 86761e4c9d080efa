use std::fs;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use prebid_config::{resolve, RequestContext, ResolverConfig, Snapshot};

fn criterion_benchmark(c: &mut Criterion) {
    let snapshot = Snapshot::from_json(&fs::read("tests/data/snapshot.json").unwrap()).unwrap();
    let now = Utc::now();
    let max_depth = ResolverConfig::DEFAULT_MAX_EXPERIMENT_DEPTH;

    {
        let mut group = c.benchmark_group("targeted");
        group.throughput(Throughput::Elements(1));
        let context = RequestContext::new("visitor-1")
            .geo("DE")
            .device("mobile")
            .browser_version("120.0.1");
        group.bench_function("resolve", |b| {
            b.iter(|| {
                resolve(
                    black_box(Some(&snapshot)),
                    black_box("p1"),
                    black_box(Some("news")),
                    black_box(&context),
                    black_box(now),
                    max_depth,
                )
            })
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("nested-experiments");
        group.throughput(Throughput::Elements(1));
        let context = RequestContext::new("visitor-1").geo("US");
        group.bench_function("resolve", |b| {
            b.iter(|| {
                resolve(
                    black_box(Some(&snapshot)),
                    black_box("p1"),
                    black_box(Some("sports")),
                    black_box(&context),
                    black_box(now),
                    max_depth,
                )
            })
        });
        group.finish();
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
