//! 执行守卫与依赖图性能基准测试
//!
//! 使用 Criterion 框架进行性能测试，包括：
//! - 单次受保护执行的开销
//! - 并发执行基准
//! - 熔断快速拒绝路径
//! - 拓扑排序基准
//! - 事件总线分发基准

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use module_kernel::{
    DependencyGraph, Event, EventBus, EventBusConfig, EventSubscription, GuardConfig,
    HandlerGuard, LocalEventBus,
};
use serde_json::json;

fn runtime_guard() -> HandlerGuard {
    let guard = HandlerGuard::new(GuardConfig::default());
    guard.mark_initialization_complete();
    guard
}

// ============================================================================
// 执行守卫基准测试
// ============================================================================

/// 单次受保护执行
fn guard_execute_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let guard = runtime_guard();

    c.bench_function("guard_execute_ok", |b| {
        b.to_async(&rt).iter(|| async {
            guard
                .execute(|x: u64| async move { Ok(x * 2) }, black_box(21), "bench", None)
                .await
        });
    });
}

/// 不同数量处理器的并发执行
fn guard_concurrent_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let guard = runtime_guard();
    let mut group = c.benchmark_group("guard_execute_concurrent");

    for count in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.to_async(&rt).iter(|| async {
                let handlers: Vec<_> = (0..count)
                    .map(|i| {
                        (
                            format!("handler_{}", i),
                            |x: u64| async move { Ok::<_, anyhow::Error>(x + 1) },
                        )
                    })
                    .collect();
                guard.execute_concurrent(handlers, 1u64, None).await
            });
        });
    }
    group.finish();
}

/// 熔断状态下的快速拒绝
fn guard_rejection_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let guard = runtime_guard();
    rt.block_on(async {
        for _ in 0..3 {
            guard
                .execute(
                    |_: ()| async { Err::<(), _>(anyhow::anyhow!("down")) },
                    (),
                    "broken",
                    None,
                )
                .await;
        }
    });

    c.bench_function("guard_circuit_open_reject", |b| {
        b.to_async(&rt).iter(|| async {
            guard
                .execute(|_: ()| async { Ok(()) }, (), black_box("broken"), None)
                .await
        });
    });
}

// ============================================================================
// 依赖图基准测试
// ============================================================================

/// 链式与扇出依赖图的拓扑排序
fn topological_order_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("topological_order");

    for size in [10usize, 100, 500] {
        let mut graph = DependencyGraph::new();
        for i in 0..size {
            let deps: Vec<String> = if i == 0 {
                vec![]
            } else {
                vec![format!("m{}", i - 1), format!("m{}", i / 2)]
            };
            graph.upsert(&format!("m{}", i), &deps);
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), &graph, |b, graph| {
            b.iter(|| graph.topological_order().unwrap());
        });
    }
    group.finish();
}

// ============================================================================
// 事件总线基准测试
// ============================================================================

/// 经过守卫的事件分发
fn bus_publish_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = LocalEventBus::new(EventBusConfig::default(), runtime_guard());
    rt.block_on(async {
        for i in 0..10 {
            bus.subscribe(
                &format!("module_{}", i),
                EventSubscription::new("order.*", |_event| async { Ok(()) }),
            )
            .await
            .unwrap();
        }
    });

    c.bench_function("bus_publish_10_subscribers", |b| {
        b.to_async(&rt).iter(|| async {
            bus.publish(Event::new("order.created", "bench", json!({ "table": 1 })))
                .await
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    guard_execute_benchmark,
    guard_concurrent_benchmark,
    guard_rejection_benchmark,
    topological_order_benchmark,
    bus_publish_benchmark,
);
criterion_main!(benches);
