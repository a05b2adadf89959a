use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ferrous_beans::*;

// ===== Micro Benchmarks =====

fn bench_singleton_hit(c: &mut Criterion) {
    let container = ContainerBuilder::new()
        .bean(BeanBuilder::new("Counter").scope(ScopeKind::Singleton).constructor(vec![], |_| Ok(42u64)))
        .build()
        .unwrap();

    // Prime the singleton
    let _ = container.get::<u64>("Counter", &[]).unwrap();

    c.bench_function("singleton_hit", |b| {
        b.iter(|| {
            let v = container.get::<u64>("Counter", &[]).unwrap();
            black_box(v);
        })
    });
}

fn bench_qualified_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("qualified_resolution");
    let fast = Qualifier::new("Fast");

    let container = ContainerBuilder::new()
        .bean(BeanBuilder::new("Plain").types(&["Store"]).constructor(vec![], |_| Ok(1u32)))
        .bean(
            BeanBuilder::new("Cached")
                .types(&["Store"])
                .qualifier(fast.clone())
                .constructor(vec![], |_| Ok(2u32)),
        )
        .build()
        .unwrap();

    group.bench_function("default", |b| {
        b.iter(|| black_box(container.resolve("Store", &[]).unwrap()))
    });
    group.bench_function("qualified", |b| {
        b.iter(|| black_box(container.resolve("Store", std::slice::from_ref(&fast)).unwrap()))
    });
    group.finish();
}

fn bench_dependent_graph(c: &mut Criterion) {
    struct Node;

    let mut group = c.benchmark_group("dependent_graph");
    for &depth in &[1usize, 4, 16] {
        let mut builder = ContainerBuilder::new().bean(BeanBuilder::new("Node0").constructor(vec![], |_| Ok(Node)));
        for i in 1..depth {
            builder = builder.bean(
                BeanBuilder::new(format!("Node{}", i))
                    .constructor(vec![InjectionPoint::of(&*format!("Node{}", i - 1))], |_| Ok(Node)),
            );
        }
        let container = builder.build().unwrap();
        let top = format!("Node{}", depth - 1);

        group.bench_with_input(BenchmarkId::new("create_and_destroy", depth), &depth, |b, _| {
            b.iter(|| {
                let node = container.get::<Node>(&top, &[]).unwrap();
                container.destroy(&(node as AnyArc)).unwrap();
            })
        });
    }
    group.finish();
}

fn bench_request_scope(c: &mut Criterion) {
    let container = ContainerBuilder::new()
        .bean(
            BeanBuilder::new("RequestState")
                .scope(ScopeKind::Request)
                .constructor(vec![], |_| Ok(0u64)),
        )
        .build()
        .unwrap();

    c.bench_function("request_scope_lifecycle", |b| {
        b.iter(|| {
            let request = container.enter_scope(ScopeKind::Request).unwrap();
            black_box(request.get::<u64>("RequestState", &[]).unwrap());
            request.close().unwrap();
        })
    });
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");

    let container = ContainerBuilder::new()
        .bean(BeanBuilder::new("Counter").scope(ScopeKind::Application).constructor(vec![], |_| Ok(42u64)))
        .build()
        .unwrap();
    let _ = container.get::<u64>("Counter", &[]).unwrap();

    for &thread_count in &[1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("application_threads", thread_count),
            &thread_count,
            |b, &threads| {
                b.iter_custom(|iters| {
                    let start = std::time::Instant::now();
                    crossbeam_utils::thread::scope(|s| {
                        for _ in 0..threads {
                            let container = &container;
                            s.spawn(move |_| {
                                for _ in 0..iters / threads as u64 {
                                    black_box(container.get::<u64>("Counter", &[]).unwrap());
                                }
                            });
                        }
                    })
                    .unwrap();
                    start.elapsed()
                })
            },
        );
    }
    group.finish();
}

// ===== Macro Benchmarks =====

fn bench_large_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("large_registry");

    for &bean_count in &[10usize, 100, 1000] {
        let mut builder = ContainerBuilder::new()
            .bean(BeanBuilder::new("Target").scope(ScopeKind::Singleton).constructor(vec![], |_| Ok(42u64)));
        for i in 0..bean_count {
            builder = builder.bean(
                BeanBuilder::new(format!("Filler{}", i))
                    .types(&["Filler"])
                    .qualifier(Qualifier::named(format!("filler{}", i)))
                    .constructor(vec![], move |_| Ok(i)),
            );
        }
        let container = builder.build().unwrap();

        group.bench_with_input(BenchmarkId::new("resolve_from_large_registry", bean_count), &bean_count, |b, _| {
            b.iter(|| black_box(container.get::<u64>("Target", &[]).unwrap()))
        });
    }
    group.finish();
}

fn bench_startup(c: &mut Criterion) {
    c.bench_function("build_100_beans", |b| {
        b.iter(|| {
            let mut builder = ContainerBuilder::new();
            for i in 0..100usize {
                builder = builder.bean(
                    BeanBuilder::new(format!("Bean{}", i))
                        .types(&["Service"])
                        .qualifier(Qualifier::named(format!("bean{}", i)))
                        .constructor(vec![], move |_| Ok(i)),
                );
            }
            black_box(builder.build().unwrap())
        })
    });
}

criterion_group!(
    micro_benches,
    bench_singleton_hit,
    bench_qualified_resolution,
    bench_dependent_graph,
    bench_request_scope,
    bench_contention
);

criterion_group!(macro_benches, bench_large_registry, bench_startup);

criterion_main!(micro_benches, macro_benches);
