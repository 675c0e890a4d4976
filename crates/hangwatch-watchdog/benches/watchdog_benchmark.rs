//! Benchmarks for the watchdog hot paths
//!
//! Section entry and exit run on every monitored operation and must stay
//! lock-free. Deadline start and stop take the object lock and touch the
//! timer dispatcher once each.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use hangwatch_report::{DeviceId, MemorySink};
use hangwatch_watchdog::{Subsystem, SubsystemConfig, TimeBasis};

fn bench_subsystem() -> Option<Subsystem> {
    Subsystem::builder(SubsystemConfig::default())
        .sink(Arc::new(MemorySink::new()))
        .build()
        .ok()
}

fn bench_monitored_section(c: &mut Criterion) {
    let Some(subsystem) = bench_subsystem() else {
        return;
    };
    let Ok(watchdog) = subsystem.allocate_progress(DeviceId::new(1), TimeBasis::Full, 0, false)
    else {
        return;
    };
    let _ = watchdog.start(Duration::from_secs(3600), |_| {});

    c.bench_function("enter_exit_section", |b| {
        b.iter(|| {
            let _ = black_box(watchdog.enter_monitored_section());
            let _ = black_box(watchdog.exit_monitored_section());
        })
    });

    let reentrant = subsystem.allocate_progress(DeviceId::new(2), TimeBasis::Full, 0, true);
    if let Ok(reentrant) = reentrant {
        c.bench_function("monitored_closure_reentrant", |b| {
            b.iter(|| reentrant.monitored(|| black_box(1u64 + 1)))
        });
        let _ = reentrant.free();
    }
    let _ = watchdog.free();
}

fn bench_deadline_cycle(c: &mut Criterion) {
    let Some(subsystem) = bench_subsystem() else {
        return;
    };
    let Ok(watchdog) = subsystem.allocate_deadline(DeviceId::new(3), TimeBasis::Full, 0) else {
        return;
    };

    c.bench_function("deadline_start_stop", |b| {
        b.iter(|| {
            let _ = watchdog.start(black_box(Duration::from_secs(3600)), |_| {});
            let _ = watchdog.stop(false);
        })
    });

    c.bench_function("deadline_suspend_resume", |b| {
        let _ = watchdog.start(Duration::from_secs(3600), |_| {});
        b.iter(|| {
            let _ = watchdog.suspend();
            let _ = watchdog.resume(false);
        });
        let _ = watchdog.stop(false);
    });
    let _ = watchdog.free();
}

criterion_group!(benches, bench_monitored_section, bench_deadline_cycle);
criterion_main!(benches);
