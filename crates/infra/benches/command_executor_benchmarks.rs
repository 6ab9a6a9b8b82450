use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use flowable_core::FlowableResult;
use flowable_engine_common::{CommandContext, CommandExecutor, Engine, EngineConfig, command_fn};
use flowable_infra::{
    EntityCache, InMemoryLockStore, InMemoryTransactionManager, LockManager, LockSession,
};
use std::sync::Arc;

fn setup_executor() -> CommandExecutor {
    let locks = Arc::new(InMemoryLockStore::new());
    let engine = Engine::builder(EngineConfig::named("bench"))
        .transaction_manager(Arc::new(InMemoryTransactionManager::new()))
        .session_factory(|| Ok(EntityCache::new()))
        .session_factory(LockSession::factory(locks))
        .build()
        .unwrap();
    engine.command_executor().clone()
}

fn nested(ctx: &mut CommandContext, depth: u32) -> FlowableResult<u32> {
    if depth == 0 {
        return Ok(0);
    }
    let executor = ctx.command_executor()?;
    let inner = executor.execute_nested(
        ctx,
        command_fn("nested", move |ctx: &mut CommandContext| {
            nested(ctx, depth - 1)
        }),
    )?;
    Ok(inner + 1)
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(1000);

    // Benchmark: command with no sessions and no agenda work
    group.bench_function("plain_command", |b| {
        let executor = setup_executor();
        b.iter(|| {
            let out = executor
                .execute(command_fn("plain", |_ctx: &mut CommandContext| Ok(black_box(42_u64))))
                .unwrap();
            black_box(out);
        });
    });

    // Benchmark: command that opens a session and caches an entity
    group.bench_function("command_with_session", |b| {
        let executor = setup_executor();
        b.iter(|| {
            executor
                .execute(command_fn("cached", |ctx: &mut CommandContext| {
                    ctx.session::<EntityCache>()?.put("1", black_box(7_u32));
                    Ok(())
                }))
                .unwrap();
        });
    });

    group.finish();
}

fn bench_agenda_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("agenda_fan_out");

    for operations in [1_u64, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*operations));
        group.bench_with_input(BenchmarkId::new("drain", operations), operations, |b, &count| {
            let executor = setup_executor();
            b.iter(|| {
                executor
                    .execute(command_fn("fan-out", move |ctx: &mut CommandContext| {
                        for i in 0..count {
                            ctx.agenda_mut().plan("step", move |_ctx: &mut CommandContext| {
                                black_box(i);
                                Ok(())
                            });
                        }
                        Ok(())
                    }))
                    .unwrap();
            });
        });
    }

    group.finish();
}

fn bench_nested_commands(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_commands");

    for depth in [1_u32, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::new("depth", depth), depth, |b, &depth| {
            let executor = setup_executor();
            b.iter(|| {
                let reached = executor
                    .execute(command_fn("outer", move |ctx: &mut CommandContext| {
                        nested(ctx, depth)
                    }))
                    .unwrap();
                black_box(reached);
            });
        });
    }

    group.finish();
}

fn bench_lock_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_round_trip");

    group.bench_function("acquire_release", |b| {
        let manager = LockManager::new(setup_executor(), "bench-lock", "node-a");
        b.iter(|| {
            assert!(manager.acquire().unwrap());
            assert!(manager.release().unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_agenda_fan_out,
    bench_nested_commands,
    bench_lock_round_trip
);
criterion_main!(benches);
