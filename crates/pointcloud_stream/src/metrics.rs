//! Streaming statistics collected per tick.
//!
//! Feature-gated and runtime-toggled so collection costs nothing when off.
//!
//! # Usage
//!
//! ```ignore
//! use pointcloud_stream::metrics::{StreamMetrics, COLLECT_METRICS};
//!
//! // Compile with --features metrics
//! // Runtime toggle:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! let stats = context.step(None, None);
//! println!("avg tick {:.1}us", context.metrics().avg_tick_us());
//! ```

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;

use crate::context::TickStats;

/// Runtime toggle for metrics collection.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
  #[cfg(feature = "metrics")]
  {
    COLLECT_METRICS.load(Ordering::Relaxed)
  }
  #[cfg(not(feature = "metrics"))]
  {
    false
  }
}

/// Most recent `capacity` timing samples with a running total.
#[derive(Debug, Clone)]
pub struct RollingWindow {
  samples: VecDeque<u64>,
  capacity: usize,
  total: u64,
}

impl RollingWindow {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      samples: VecDeque::with_capacity(capacity),
      capacity,
      total: 0,
    }
  }

  /// Records a sample, dropping the oldest once full.
  pub fn record(&mut self, sample: u64) {
    if self.samples.len() == self.capacity {
      if let Some(oldest) = self.samples.pop_front() {
        self.total -= oldest;
      }
    }
    self.samples.push_back(sample);
    self.total += sample;
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  pub fn reset(&mut self) {
    self.samples.clear();
    self.total = 0;
  }

  /// Oldest first.
  pub fn samples(&self) -> impl Iterator<Item = u64> + '_ {
    self.samples.iter().copied()
  }

  pub fn latest(&self) -> Option<u64> {
    self.samples.back().copied()
  }

  #[inline]
  pub fn total(&self) -> u64 {
    self.total
  }

  /// Mean of the window, 0 when empty.
  pub fn mean(&self) -> f64 {
    match self.samples.len() {
      0 => 0.0,
      n => self.total as f64 / n as f64,
    }
  }

  /// Slowest sample in the window.
  pub fn peak(&self) -> Option<u64> {
    self.samples.iter().max().copied()
  }
}

impl Default for RollingWindow {
  fn default() -> Self {
    Self::new(128) // ~2 seconds at 60 ticks per second
  }
}

/// Session-level streaming statistics.
#[derive(Debug, Clone, Default)]
pub struct StreamMetrics {
  // Timing
  /// Coordinator time per tick in microseconds.
  pub tick_timings: RollingWindow,
  /// Worker time of the load stages drained per tick, in microseconds.
  pub worker_timings: RollingWindow,

  // Working set snapshot
  pub visible_nodes: usize,
  pub displayed_points: u64,

  // Cumulative
  pub ticks: u64,
  pub nodes_added: u64,
  pub nodes_removed: u64,
  pub pages_loaded: u64,
  pub pages_failed: u64,
  pub loads_completed: u64,
  pub loads_failed: u64,
}

impl StreamMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  /// Folds one tick's statistics in.
  pub fn record_tick(&mut self, stats: &TickStats, worker_us: u64) {
    if !is_enabled() {
      return;
    }
    self.tick_timings.record(stats.elapsed_us);
    self.worker_timings.record(worker_us);
    self.visible_nodes = stats.visible_nodes;
    self.displayed_points = stats.point_count;

    self.ticks += 1;
    self.nodes_added += stats.nodes_added as u64;
    self.nodes_removed += stats.nodes_removed as u64;
    self.pages_loaded += stats.pages_loaded as u64;
    self.pages_failed += stats.pages_failed as u64;
    self.loads_completed += stats.loads_completed as u64;
    self.loads_failed += stats.loads_failed as u64;
  }

  /// Clears the windows and snapshot. Cumulative counters survive.
  pub fn reset(&mut self) {
    self.tick_timings.reset();
    self.worker_timings.reset();
    self.visible_nodes = 0;
    self.displayed_points = 0;
  }

  pub fn avg_tick_us(&self) -> f64 {
    self.tick_timings.mean()
  }

  pub fn avg_worker_us(&self) -> f64 {
    self.worker_timings.mean()
  }
}
