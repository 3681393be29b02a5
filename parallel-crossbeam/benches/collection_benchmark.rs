//! Benchmark comparing the lock-free collections and the tree:
//! - Stack, Queue vs crossbeam SegQueue
//! - ArrayList push / pop_back
//! - SortedDictionary insert / remove
//!
//! Run with: cargo bench --package parallel-crossbeam --bench collection_benchmark

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use crossbeam::queue::SegQueue;
use mimalloc::MiMalloc;
use std::sync::Arc;
use std::thread;

use parallel_core::data_structures::{ArrayList, Queue, SortedDictionary, Stack};
use parallel_crossbeam::EpochGuard;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const OPS_PER_THREAD: usize = 10_000;

type EpochStack = Stack<u64, EpochGuard>;
type EpochQueue = Queue<u64, EpochGuard>;
type EpochArrayList = ArrayList<u64, EpochGuard>;

// ============================================================================
// Helpers
// ============================================================================

// Runs `work(thread_index)` on `thread_count` threads sharing `shared`.
//
fn run_shared<C, F>(shared: Arc<C>, thread_count: usize, work: F)
where
    C: Send + Sync + 'static,
    F: Fn(&C, usize) + Send + Sync + Copy + 'static,
{
    let mut handles = vec![];

    for t in 0..thread_count {
        let shared = Arc::clone(&shared);
        handles.push(thread::spawn(move || work(&shared, t)));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

// ============================================================================
// Push / pop pairs (two pushes per pop, as in the stress tests)
// ============================================================================

fn bench_stack_pairs(thread_count: usize, ops_per_thread: usize) {
    run_shared(Arc::new(EpochStack::new()), thread_count, move |stack, t| {
        let base = (t * ops_per_thread) as u64;
        for i in 0..ops_per_thread as u64 {
            stack.push(base + i);
            stack.push(base + i);
            black_box(stack.pop());
        }
    });
}

fn bench_queue_pairs(thread_count: usize, ops_per_thread: usize) {
    run_shared(Arc::new(EpochQueue::new()), thread_count, move |queue, t| {
        let base = (t * ops_per_thread) as u64;
        for i in 0..ops_per_thread as u64 {
            queue.enqueue(base + i);
            queue.enqueue(base + i);
            black_box(queue.dequeue());
        }
    });
}

fn bench_seg_queue_pairs(thread_count: usize, ops_per_thread: usize) {
    run_shared(Arc::new(SegQueue::<u64>::new()), thread_count, move |queue, t| {
        let base = (t * ops_per_thread) as u64;
        for i in 0..ops_per_thread as u64 {
            queue.push(base + i);
            queue.push(base + i);
            black_box(queue.pop());
        }
    });
}

fn bench_array_list_pairs(thread_count: usize, ops_per_thread: usize) {
    run_shared(Arc::new(EpochArrayList::new()), thread_count, move |list, t| {
        let base = (t * ops_per_thread) as u64;
        for i in 0..ops_per_thread as u64 {
            list.push(base + i);
            list.push(base + i);
            black_box(list.pop_back());
        }
    });
}

// ============================================================================
// SortedDictionary
// ============================================================================

fn bench_dictionary_insert(thread_count: usize, ops_per_thread: usize) {
    run_shared(Arc::new(SortedDictionary::<u64, u64>::new()), thread_count, move |dict, t| {
        let base = (t * ops_per_thread) as u64;
        for i in 0..ops_per_thread as u64 {
            dict.insert(base + i, i);
        }
    });
}

/// Half inserts, half removes over a shared key range.
fn bench_dictionary_mixed(thread_count: usize, ops_per_thread: usize) {
    let dict = Arc::new(SortedDictionary::<u64, u64>::new());
    for k in 0..1_000u64 {
        dict.insert(k, k);
    }

    run_shared(dict, thread_count, move |dict, t| {
        for i in 0..ops_per_thread as u64 {
            let key = (i * 7 + t as u64 * 131) % 2_000;
            if i % 2 == 0 {
                dict.insert(key, i);
            } else {
                dict.remove(&key);
            }
        }
    });
}

// ============================================================================
// Criterion benchmark groups
// ============================================================================

fn pairs_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_pop_pairs");

    for threads in [1, 2, 4, 8, 12, 16] {
        group.bench_with_input(BenchmarkId::new("stack", threads), &threads, |b, &threads| {
            b.iter(|| bench_stack_pairs(black_box(threads), black_box(OPS_PER_THREAD)))
        });

        group.bench_with_input(BenchmarkId::new("queue", threads), &threads, |b, &threads| {
            b.iter(|| bench_queue_pairs(black_box(threads), black_box(OPS_PER_THREAD)))
        });

        group.bench_with_input(
            BenchmarkId::new("crossbeam_seg_queue", threads),
            &threads,
            |b, &threads| {
                b.iter(|| bench_seg_queue_pairs(black_box(threads), black_box(OPS_PER_THREAD)))
            },
        );

        group.bench_with_input(
            BenchmarkId::new("array_list", threads),
            &threads,
            |b, &threads| {
                b.iter(|| bench_array_list_pairs(black_box(threads), black_box(OPS_PER_THREAD)))
            },
        );
    }

    group.finish();
}

fn dictionary_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted_dictionary");
    group.sample_size(20);

    for threads in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("insert", threads), &threads, |b, &threads| {
            b.iter(|| bench_dictionary_insert(black_box(threads), black_box(OPS_PER_THREAD)))
        });

        group.bench_with_input(BenchmarkId::new("mixed", threads), &threads, |b, &threads| {
            b.iter(|| bench_dictionary_mixed(black_box(threads), black_box(OPS_PER_THREAD)))
        });
    }

    group.finish();
}

criterion_group!(benches, pairs_benchmark, dictionary_benchmark);
criterion_main!(benches);
