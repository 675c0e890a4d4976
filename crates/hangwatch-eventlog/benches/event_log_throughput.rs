//! Benchmarks for event log commit and query paths

use criterion::{Criterion, criterion_group, criterion_main};
use hangwatch_eventlog::{EventLog, LogLevel, RECORD_SIZE};

fn bench_commit(c: &mut Criterion) {
    let log = EventLog::default();

    c.bench_function("commit_warning", |b| {
        b.iter(|| log.commit(log.new_warning().with_parameters(std::hint::black_box(&[1u64, 2]))))
    });
}

fn bench_queries(c: &mut Criterion) {
    let log = EventLog::default();
    for _ in 0..log.capacity() {
        log.commit(log.new_error());
        log.commit(log.new_trace());
    }

    c.bench_function("recent_error_32", |b| {
        b.iter(|| log.recent(std::hint::black_box(LogLevel::Error), 32))
    });

    let mut buffer = vec![0u8; RECORD_SIZE * 32];
    c.bench_function("copy_recent_error_32", |b| {
        b.iter(|| log.copy_recent(LogLevel::Error, 32, &mut buffer))
    });
}

criterion_group!(benches, bench_commit, bench_queries);
criterion_main!(benches);
