//! Benchmarks for the indexed priority queue under traversal-like churn.
//!
//! The workload mirrors a reprojection pass: a populated queue whose
//! priorities are all rewritten, interleaved with pops and pushes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pointcloud_stream::{IndexedPriorityQueue, QueueHandle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn populated(len: usize, rng: &mut StdRng) -> (IndexedPriorityQueue<u32, f64>, Vec<QueueHandle>) {
  let mut queue = IndexedPriorityQueue::new_max();
  let handles = (0..len as u32)
    .map(|i| queue.enqueue(i, rng.random_range(0.0..1.0)))
    .collect();
  (queue, handles)
}

/// Rewrite every priority, as a reprojection pass does.
fn bench_update_all(c: &mut Criterion) {
  let mut group = c.benchmark_group("pq_update_all");

  for len in [1_000usize, 10_000, 100_000] {
    group.throughput(Throughput::Elements(len as u64));
    let mut rng = StdRng::seed_from_u64(7);
    let (mut queue, handles) = populated(len, &mut rng);
    let priorities: Vec<f64> = (0..len).map(|_| rng.random_range(0.0..1.0)).collect();

    group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
      b.iter(|| {
        for (handle, &p) in handles.iter().zip(&priorities) {
          queue.update_priority(*handle, p);
        }
        black_box(queue.peek_priority().copied())
      })
    });
  }

  group.finish();
}

/// Pop the head and push a replacement, as budget swaps do.
fn bench_pop_push(c: &mut Criterion) {
  let mut group = c.benchmark_group("pq_pop_push");

  for len in [1_000usize, 100_000] {
    let mut rng = StdRng::seed_from_u64(11);
    let (mut queue, _) = populated(len, &mut rng);

    group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
      b.iter(|| {
        if let Some((id, p)) = queue.dequeue() {
          queue.enqueue(id, p * 0.5);
        }
        black_box(queue.len())
      })
    });
  }

  group.finish();
}

/// Remove arbitrary entries by handle and re-add them.
fn bench_remove_reinsert(c: &mut Criterion) {
  let len = 10_000usize;
  let mut rng = StdRng::seed_from_u64(13);
  let (mut queue, mut handles) = populated(len, &mut rng);

  c.bench_function("pq_remove_reinsert_10k", |b| {
    b.iter(|| {
      let slot = rng.random_range(0..len);
      if let Some((id, p)) = queue.remove(handles[slot]) {
        handles[slot] = queue.enqueue(id, p);
      }
      black_box(queue.peek().copied())
    })
  });
}

criterion_group!(benches, bench_update_all, bench_pop_push, bench_remove_reinsert);
criterion_main!(benches);
