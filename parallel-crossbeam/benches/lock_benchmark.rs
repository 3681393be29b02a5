//! Benchmark comparing the raw locks behind `Lock` and `RwLock`:
//! - SpinLock, TicketLock, ClhLock, McsLock vs std::sync::Mutex
//!
//! Run with: cargo bench --package parallel-crossbeam --bench lock_benchmark

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use mimalloc::MiMalloc;
use std::sync::{Arc, Mutex};
use std::thread;

use parallel_core::lock::{ClhLock, Lock, McsLock, RawLock, RwLock, SpinLock, TicketLock};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const OPS_PER_THREAD: usize = 10_000;

// ============================================================================
// Generic benchmark helpers
// ============================================================================

/// Every thread increments one shared counter under `Lock<L, _>`.
fn bench_counter<L: RawLock + 'static>(thread_count: usize, ops_per_thread: usize) {
    let counter = Arc::new(Lock::<L, u64>::new(0));
    let mut handles = vec![];

    for _ in 0..thread_count {
        let counter = Arc::clone(&counter);
        handles.push(thread::spawn(move || {
            for _ in 0..ops_per_thread {
                *counter.lock() += 1;
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

fn bench_std_mutex_counter(thread_count: usize, ops_per_thread: usize) {
    let counter = Arc::new(Mutex::new(0u64));
    let mut handles = vec![];

    for _ in 0..thread_count {
        let counter = Arc::clone(&counter);
        handles.push(thread::spawn(move || {
            for _ in 0..ops_per_thread {
                *counter.lock().unwrap() += 1;
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

/// Nine reads per write on `RwLock<L, _>`.
fn bench_read_mostly<L>(thread_count: usize, ops_per_thread: usize)
where
    L: RawLock + 'static,
    L::Token: Send,
{
    let table = Arc::new(RwLock::<L, Vec<u64>>::new(vec![0; 64]));
    let mut handles = vec![];

    for t in 0..thread_count {
        let table = Arc::clone(&table);
        handles.push(thread::spawn(move || {
            for i in 0..ops_per_thread {
                if i % 10 == t % 10 {
                    table.write()[i % 64] += 1;
                } else {
                    black_box(table.read()[i % 64]);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

// ============================================================================
// Criterion benchmark groups
// ============================================================================

fn counter_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_counter");

    for threads in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("spin", threads), &threads, |b, &threads| {
            b.iter(|| bench_counter::<SpinLock>(black_box(threads), black_box(OPS_PER_THREAD)))
        });

        group.bench_with_input(BenchmarkId::new("ticket", threads), &threads, |b, &threads| {
            b.iter(|| bench_counter::<TicketLock>(black_box(threads), black_box(OPS_PER_THREAD)))
        });

        group.bench_with_input(BenchmarkId::new("clh", threads), &threads, |b, &threads| {
            b.iter(|| bench_counter::<ClhLock>(black_box(threads), black_box(OPS_PER_THREAD)))
        });

        group.bench_with_input(BenchmarkId::new("mcs", threads), &threads, |b, &threads| {
            b.iter(|| bench_counter::<McsLock>(black_box(threads), black_box(OPS_PER_THREAD)))
        });

        group.bench_with_input(BenchmarkId::new("std_mutex", threads), &threads, |b, &threads| {
            b.iter(|| bench_std_mutex_counter(black_box(threads), black_box(OPS_PER_THREAD)))
        });
    }

    group.finish();
}

fn read_mostly_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("rw_lock_read_mostly");

    for threads in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("spin", threads), &threads, |b, &threads| {
            b.iter(|| bench_read_mostly::<SpinLock>(black_box(threads), black_box(OPS_PER_THREAD)))
        });

        group.bench_with_input(BenchmarkId::new("mcs", threads), &threads, |b, &threads| {
            b.iter(|| bench_read_mostly::<McsLock>(black_box(threads), black_box(OPS_PER_THREAD)))
        });
    }

    group.finish();
}

criterion_group!(benches, counter_benchmark, read_mostly_benchmark);
criterion_main!(benches);
