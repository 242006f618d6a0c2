//! Resolution benchmarks for the service manager.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use svcmgr::ServiceManager;

#[derive(Clone)]
struct SimpleService {
    value: i32,
}

fn bench_cached_resolution(c: &mut Criterion) {
    let manager = ServiceManager::new();
    manager
        .register("simple", |_, _| Ok(SimpleService { value: 42 }))
        .unwrap();
    // Warm the cache so the loop measures the hit path.
    manager.get("simple").unwrap();

    c.bench_function("cached_resolution", |b| {
        b.iter(|| {
            let service = manager.get_as::<SimpleService>(black_box("simple")).unwrap();
            black_box(service.value)
        })
    });
}

fn bench_first_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("first_resolution");

    for service_count in [1usize, 10, 100].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(service_count),
            service_count,
            |b, &service_count| {
                b.iter(|| {
                    let manager = ServiceManager::new();
                    for i in 0..service_count {
                        manager
                            .register(format!("service-{}", i), move |_, _| {
                                Ok(SimpleService { value: i as i32 })
                            })
                            .unwrap();
                    }
                    for i in 0..service_count {
                        let service = manager
                            .get_as::<SimpleService>(&format!("service-{}", i))
                            .unwrap();
                        black_box(service.value);
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_cached_resolution, bench_first_resolution);
criterion_main!(benches);
