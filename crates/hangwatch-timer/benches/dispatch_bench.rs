//! Benchmarks for timer scheduling and cancellation paths

use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use hangwatch_timer::{TimerAction, TimerDispatcher};

fn bench_schedule_cancel(c: &mut Criterion) {
    let Ok(dispatcher) = TimerDispatcher::new() else {
        return;
    };
    let Ok(timer) = dispatcher.create_timer(|| TimerAction::Stop) else {
        return;
    };

    c.bench_function("schedule_then_cancel", |b| {
        b.iter(|| {
            let _ = timer.schedule(std::hint::black_box(Duration::from_millis(1)));
            timer.cancel()
        })
    });

    c.bench_function("cancel_sync_idle", |b| b.iter(|| timer.cancel_sync()));
}

criterion_group!(benches, bench_schedule_cancel);
criterion_main!(benches);
